//! The orchestrator. Log lines flow out to the chat sink while chat events
//! flow back in as console commands, with a periodic status refresh on the
//! side; everything shares one serialized RCON connection and the process
//! runs until told to terminate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chat::{ChatEvent, ChatSink};
use crate::config::Config;
use crate::filter::LineFilter;
use crate::rcon::{RconClient, RconHandle};
use crate::status::StatusParser;

/// Authenticate against the console, retrying on a fixed delay for as long
/// as it takes (the server may still be booting). `None` means shutdown was
/// requested while we were still trying.
pub async fn login_with_retry(config: &Config, shutdown: &CancellationToken) -> Option<RconClient> {
    let addr = config.rcon_addr();
    let mut client = RconClient::new(&addr, &config.password);
    loop {
        info!(%addr, "logging in to rcon");
        match client.login().await {
            Ok(()) => return Some(client),
            Err(err) => {
                warn!(%err, "login failed, retrying in {:?}", config.rcon_retry_delay);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(config.rcon_retry_delay) => {}
        }
    }
}

pub struct Bridge {
    config: Config,
    sink: Arc<dyn ChatSink>,
    rcon: RconHandle,
}

impl Bridge {
    pub fn new(config: Config, sink: Arc<dyn ChatSink>, rcon: RconHandle) -> Self {
        Self { config, sink, rcon }
    }

    /// Start the concurrent units and block until shutdown. The units are
    /// not individually cancelled; process exit reaps them. Per-message
    /// failures inside a unit are logged and never take down the others.
    pub async fn run(
        self,
        events: mpsc::UnboundedReceiver<ChatEvent>,
        lines: mpsc::UnboundedReceiver<String>,
        tailer: JoinHandle<Result<()>>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let filter =
            LineFilter::new(&self.config.noise_filters).context("compiling noise filters")?;
        let status_parser = StatusParser::new().context("compiling status pattern")?;

        info!("forwarding server log to discord");
        tokio::spawn(forward_logs(
            lines,
            filter,
            Arc::clone(&self.sink),
            self.config.chat_channel.clone(),
            self.config.admin_channel.clone(),
        ));

        info!("forwarding discord messages to the console");
        tokio::spawn(dispatch_events(
            events,
            self.rcon.clone(),
            Arc::clone(&self.sink),
            self.config.chat_channel.clone(),
            self.config.admin_channel.clone(),
        ));

        if let Some(interval) = self.config.status_interval {
            match self.config.chat_channel.clone() {
                Some(chat_id) => {
                    tokio::spawn(status_loop(
                        interval,
                        self.rcon.clone(),
                        Arc::clone(&self.sink),
                        chat_id,
                        status_parser,
                    ));
                }
                None => warn!("status sync needs a chat channel; disabled"),
            }
        }

        // Final blocking step: the termination signal. A tailer that dies
        // early is surfaced here rather than swallowed, but the rest of the
        // bridge keeps running until the signal arrives.
        tokio::select! {
            _ = shutdown.cancelled() => {}
            res = tailer => {
                match res {
                    Ok(Ok(())) => info!("log tailer stopped"),
                    Ok(Err(err)) => error!(%err, "log tailer failed"),
                    Err(err) => error!(%err, "log tailer panicked"),
                }
                shutdown.cancelled().await;
            }
        }
        info!("shutting down");
        Ok(())
    }
}

/// Unit 1: raw lines to the admin mirror, filtered lines to chat.
async fn forward_logs(
    mut lines: mpsc::UnboundedReceiver<String>,
    filter: LineFilter,
    sink: Arc<dyn ChatSink>,
    chat: Option<String>,
    admin: Option<String>,
) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(admin_id) = &admin {
            if let Err(err) = sink.send_message(admin_id, &line).await {
                warn!(%err, "failed to mirror log line");
            }
        }

        if let Some(chat_id) = &chat {
            if let Some(body) = filter.chat_line(&line) {
                if let Err(err) = sink.send_message(chat_id, &body).await {
                    warn!(%err, "failed to forward chat line");
                }
            }
        }
    }
}

/// Unit 2: inbound chat events. Chat-channel messages become fire-and-forget
/// `say` commands; admin-channel messages run verbatim and their output (or
/// a best-effort failure note) goes back to the admin channel.
async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<ChatEvent>,
    rcon: RconHandle,
    sink: Arc<dyn ChatSink>,
    chat: Option<String>,
    admin: Option<String>,
) {
    while let Some(event) = events.recv().await {
        if chat.as_deref() == Some(event.channel_id.as_str()) {
            let command = format!("say <{}>: {}", event.author_name, event.text);
            if let Err(err) = rcon.execute(command).await {
                warn!(author = %event.author_name, %err, "failed to relay chat message");
            }
        } else if admin.as_deref() == Some(event.channel_id.as_str()) {
            match rcon.execute(event.text.clone()).await {
                Ok(output) => {
                    let reply = if output.is_empty() {
                        "(no output)".to_string()
                    } else {
                        output
                    };
                    if let Err(err) = sink.send_message(&event.channel_id, &reply).await {
                        warn!(%err, "failed to post command output");
                    }
                }
                Err(err) => {
                    warn!(command = %event.text, %err, "console command failed");
                    let note = format!("command failed: {err}");
                    let _ = sink.send_message(&event.channel_id, &note).await;
                }
            }
        }
    }
}

/// Unit 3: republish the player list as the chat topic, immediately and
/// then on every tick. Failures skip the refresh, nothing more.
async fn status_loop(
    interval: Duration,
    rcon: RconHandle,
    sink: Arc<dyn ChatSink>,
    chat_id: String,
    parser: StatusParser,
) {
    info!("refreshing chat channel status every {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = refresh_status(&rcon, sink.as_ref(), &chat_id, &parser).await {
            warn!(%err, "failed to sync server status");
        }
    }
}

async fn refresh_status(
    rcon: &RconHandle,
    sink: &dyn ChatSink,
    chat_id: &str,
    parser: &StatusParser,
) -> Result<()> {
    let response = rcon.execute("list").await.context("running `list`")?;
    let status = parser
        .parse(&response)
        .with_context(|| format!("unexpected list response: {response}"))?;
    sink.edit_channel_topic(chat_id, &status.topic())
        .await
        .context("updating topic")
}

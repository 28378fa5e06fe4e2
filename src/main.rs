use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mcbridge::bridge::{Bridge, login_with_retry};
use mcbridge::chat::ChatSink;
use mcbridge::cli::Cli;
use mcbridge::config::Config;
use mcbridge::discord::{DiscordRest, spawn_gateway};
use mcbridge::rcon::RconHandle;
use mcbridge::tail::LogTailer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(cli)?;

    // One token covers every loop; SIGINT/SIGTERM trip it and the
    // orchestrator's final wait returns.
    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let sink: Arc<dyn ChatSink> = Arc::new(DiscordRest::new(&config.token));
    let events = spawn_gateway(config.token.clone());

    let Some(client) = login_with_retry(&config, &shutdown).await else {
        return Ok(());
    };
    let (rcon, _owner) = RconHandle::spawn(client);

    let tailer = LogTailer::new(&config.log_path, config.log_retry_delay);
    let (lines, tail_task) = tailer.spawn(shutdown.clone());

    Bridge::new(config, sink, rcon)
        .run(events, lines, tail_task, shutdown)
        .await
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(%err, "could not install SIGTERM handler");
                let _ = ctrl_c.await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("termination signal received");
    shutdown.cancel();
}

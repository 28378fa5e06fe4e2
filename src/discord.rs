//! Thin Discord adapter: a REST sink for sends and topic edits, and a
//! gateway reader that turns MESSAGE_CREATE dispatches into [`ChatEvent`]s.
//!
//! This is collaborator plumbing, not bridge logic: just enough of the
//! platform to run against. Sharding, session resume and rate-limit
//! bookkeeping are left out.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::chat::{ChatEvent, ChatSink};

const API_BASE: &str = "https://discord.com/api/v10";
const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILD_MESSAGES | MESSAGE_CONTENT.
const INTENTS: u64 = (1 << 9) | (1 << 15);

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// REST-side Discord client; implements the outbound half of the platform.
pub struct DiscordRest {
    http: reqwest::Client,
    auth: String,
}

impl DiscordRest {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth: format!("Bot {token}"),
        }
    }
}

#[async_trait]
impl ChatSink for DiscordRest {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        self.http
            .post(format!("{API_BASE}/channels/{channel_id}/messages"))
            .header("Authorization", &self.auth)
            .json(&json!({ "content": text }))
            .send()
            .await
            .context("sending message")?
            .error_for_status()
            .context("message rejected")?;
        Ok(())
    }

    async fn edit_channel_topic(&self, channel_id: &str, topic: &str) -> Result<()> {
        self.http
            .patch(format!("{API_BASE}/channels/{channel_id}"))
            .header("Authorization", &self.auth)
            .json(&json!({ "topic": topic }))
            .send()
            .await
            .context("editing channel")?
            .error_for_status()
            .context("topic edit rejected")?;
        Ok(())
    }
}

/// Start the gateway reader. Inbound messages (minus the bridge's own)
/// arrive as [`ChatEvent`]s on the returned channel for process lifetime;
/// a dropped connection is logged and redialed after a fixed delay.
pub fn spawn_gateway(token: String) -> mpsc::UnboundedReceiver<ChatEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(err) = run_gateway(&token, &tx).await {
                warn!(%err, "gateway connection lost");
            }
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    });
    rx
}

async fn run_gateway(token: &str, events: &mpsc::UnboundedSender<ChatEvent>) -> Result<()> {
    let (ws, _) = connect_async(GATEWAY_URL)
        .await
        .context("connecting to gateway")?;
    let (mut write, mut read) = ws.split();

    // The gateway leads with Hello, which carries the heartbeat cadence.
    let hello = loop {
        let value = next_json(&mut read).await?;
        if value["op"].as_u64() == Some(10) {
            break value;
        }
    };
    let heartbeat_ms = hello["d"]["heartbeat_interval"]
        .as_u64()
        .context("hello without heartbeat_interval")?;

    let identify = json!({
        "op": 2,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": { "os": "linux", "browser": "mcbridge", "device": "mcbridge" },
        }
    });
    write.send(Message::Text(identify.to_string())).await?;

    let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_ms));
    let mut own_id = String::new();
    let mut seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                write
                    .send(Message::Text(json!({ "op": 1, "d": seq }).to_string()))
                    .await
                    .context("sending heartbeat")?;
            }
            msg = read.next() => {
                let msg = msg.context("gateway closed")??;
                let Message::Text(text) = msg else { continue };
                let value: Value = serde_json::from_str(&text).context("bad gateway frame")?;

                if let Some(s) = value["s"].as_u64() {
                    seq = Some(s);
                }

                match value["op"].as_u64() {
                    // Dispatch
                    Some(0) => match value["t"].as_str() {
                        Some("READY") => {
                            own_id = value["d"]["user"]["id"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string();
                            info!("discord gateway ready");
                        }
                        Some("MESSAGE_CREATE") => {
                            if let Some(event) = parse_message_create(&value["d"]) {
                                if event.author_id == own_id {
                                    continue;
                                }
                                if events.send(event).is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        _ => {}
                    },
                    // Heartbeat request
                    Some(1) => {
                        write
                            .send(Message::Text(json!({ "op": 1, "d": seq }).to_string()))
                            .await
                            .context("answering heartbeat")?;
                    }
                    // Reconnect / invalid session: redial from scratch.
                    Some(7) | Some(9) => anyhow::bail!("gateway asked for a reconnect"),
                    _ => {
                        debug!(op = ?value["op"], "ignoring gateway frame");
                    }
                }
            }
        }
    }
}

async fn next_json<S>(read: &mut S) -> Result<Value>
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let msg = read.next().await.context("gateway closed")??;
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).context("bad gateway frame");
        }
    }
}

/// Pull the fields the bridge cares about out of a MESSAGE_CREATE dispatch.
fn parse_message_create(d: &Value) -> Option<ChatEvent> {
    Some(ChatEvent {
        channel_id: d["channel_id"].as_str()?.to_string(),
        author_id: d["author"]["id"].as_str()?.to_string(),
        author_name: d["author"]["username"].as_str()?.to_string(),
        text: d["content"].as_str()?.to_string(),
    })
}

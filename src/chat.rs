//! The seam between the bridge and whatever chat platform it talks to.
//!
//! Inbound traffic is a plain event stream: the platform adapter pushes
//! [`ChatEvent`]s onto an mpsc channel and the orchestrator consumes them in
//! one dispatch loop, which also makes synthetic events trivial in tests.
//! Events authored by the bridge's own user are filtered out by the adapter
//! before they reach the stream, so the orchestrator cannot echo itself.

use async_trait::async_trait;

/// One inbound message from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
}

/// Outbound capabilities the bridge consumes from the platform. Failures
/// are per-message: the caller logs them and drops that one send or edit.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> anyhow::Result<()>;

    async fn edit_channel_topic(&self, channel_id: &str, topic: &str) -> anyhow::Result<()>;
}

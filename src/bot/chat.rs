//! Gateway-side operations the command handlers need.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// An inbound text message, detached from the gateway's model types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub content: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message, returning its id.
    async fn send_message(&self, channel_id: u64, text: &str) -> Result<u64, String>;

    /// Reply to a message, returning the reply's id.
    async fn reply(&self, channel_id: u64, message_id: u64, text: &str) -> Result<u64, String>;

    async fn react(&self, channel_id: u64, message_id: u64, emoji: &str) -> Result<(), String>;

    /// Wait the full `window`, then return the raw reaction count for each of
    /// `emojis`. Counts include the client's own reactions; emojis nobody
    /// reacted with are absent.
    async fn await_reactions(
        &self,
        channel_id: u64,
        message_id: u64,
        emojis: &[&str],
        window: Duration,
    ) -> Result<HashMap<String, u64>, String>;
}

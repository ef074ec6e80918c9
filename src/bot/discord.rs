//! Discord client using serenity's HTTP handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::all::{ChannelId, CreateMessage, MessageId, ReactionType};
use serenity::http::Http;
use tracing::{debug, warn};

use crate::bot::chat::ChatClient;

pub struct DiscordClient {
    http: Arc<Http>,
}

impl DiscordClient {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn send_message(&self, channel_id: u64, text: &str) -> Result<u64, String> {
        debug!("Sending to channel {}: {}", channel_id, text);
        ChannelId::new(channel_id)
            .say(&self.http, text)
            .await
            .map(|msg| msg.id.get())
            .map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn reply(&self, channel_id: u64, message_id: u64, text: &str) -> Result<u64, String> {
        debug!("Replying to {} in channel {}: {}", message_id, channel_id, text);
        let channel = ChannelId::new(channel_id);
        let builder = CreateMessage::new()
            .content(text)
            .reference_message((channel, MessageId::new(message_id)));

        channel
            .send_message(&self.http, builder)
            .await
            .map(|msg| msg.id.get())
            .map_err(|e| {
                let msg = format!("Failed to reply: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn react(&self, channel_id: u64, message_id: u64, emoji: &str) -> Result<(), String> {
        debug!("Adding reaction {} to msg {} in channel {}", emoji, message_id, channel_id);
        let reaction = ReactionType::Unicode(emoji.to_string());

        self.http
            .create_reaction(ChannelId::new(channel_id), MessageId::new(message_id), &reaction)
            .await
            .map_err(|e| {
                let msg = format!("Failed to add reaction: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn await_reactions(
        &self,
        channel_id: u64,
        message_id: u64,
        emojis: &[&str],
        window: Duration,
    ) -> Result<HashMap<String, u64>, String> {
        tokio::time::sleep(window).await;

        let message = self
            .http
            .get_message(ChannelId::new(channel_id), MessageId::new(message_id))
            .await
            .map_err(|e| {
                let msg = format!("Failed to fetch reactions: {e}");
                warn!("{}", msg);
                msg
            })?;

        let counts = message
            .reactions
            .iter()
            .filter_map(|r| match &r.reaction_type {
                ReactionType::Unicode(name) if emojis.contains(&name.as_str()) => {
                    Some((name.clone(), r.count))
                }
                _ => None,
            })
            .collect();

        Ok(counts)
    }
}

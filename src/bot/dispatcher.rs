//! Command dispatcher - routes prefixed messages to their handlers.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::{ModerationApi, RELATIONSHIP_FRIEND};
use crate::bot::chat::{ChatClient, IncomingMessage};
use crate::bot::command::{self, CommandKind, Invocation};
use crate::config::Config;
use crate::restrictions::{RestrictionStore, Toggle};

/// Identities the dispatcher checks privileges against.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub bot_user_id: u64,
    pub owner_id: u64,
    pub protected_ids: HashSet<u64>,
    pub nuisance_user_id: Option<u64>,
}

impl From<&Config> for DispatcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            bot_user_id: config.bot_user_id,
            owner_id: config.owner_id,
            protected_ids: config.protected_ids.clone(),
            nuisance_user_id: config.nuisance_user_id,
        }
    }
}

impl DispatcherConfig {
    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_id == user_id
    }

    pub fn is_protected(&self, user_id: u64) -> bool {
        self.protected_ids.contains(&user_id)
    }
}

pub struct Dispatcher {
    pub(crate) config: DispatcherConfig,
    pub(crate) chat: Arc<dyn ChatClient>,
    pub(crate) api: Arc<dyn ModerationApi>,
    restrictions: Arc<RestrictionStore>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        chat: Arc<dyn ChatClient>,
        api: Arc<dyn ModerationApi>,
        restrictions: Arc<RestrictionStore>,
    ) -> Self {
        Self {
            config,
            chat,
            api,
            restrictions,
        }
    }

    /// Non-owners may not target protected accounts.
    pub(crate) fn may_target(&self, caller: u64, target: u64) -> bool {
        self.config.is_owner(caller) || !self.config.is_protected(target)
    }

    /// Entry point for every inbound message. Never fails: handler errors
    /// are logged and reported back to the channel.
    pub async fn handle_message(&self, msg: &IncomingMessage) {
        if !msg.content.starts_with(command::PREFIX) {
            return;
        }

        let invocation = command::parse(&msg.content);
        match &invocation {
            Some(inv) => debug!(
                "Command {:?} from {} in {}, args: {:?}",
                inv.kind, msg.author_id, msg.channel_id, inv.args
            ),
            None => debug!("Unknown command from {} in {}", msg.author_id, msg.channel_id),
        }

        if let Err(e) = self.run(msg, invocation.as_ref()).await {
            error!("Unhandled error handling {:?}: {}", msg.content, e);
            self.safe_reply(msg, &format!("❌ An unexpected error occurred: {e}"))
                .await;
        }
    }

    /// Restricted authors are told so for any prefixed message, known
    /// command or not; `restrictuser` itself is exempt.
    async fn run(
        &self,
        msg: &IncomingMessage,
        invocation: Option<&Invocation>,
    ) -> Result<(), String> {
        let kind = invocation.map(|inv| inv.kind);
        if kind != Some(CommandKind::RestrictUser)
            && let Some(reason) = self.restrictions.reason(msg.author_id)?
        {
            info!("Restricted user {} tried {:?}", msg.author_id, kind);
            self.safe_reply(
                msg,
                &format!("❌ You have been restricted from using this bot. Reason: {reason}"),
            )
            .await;
            return Ok(());
        }

        let Some(invocation) = invocation else {
            return Ok(());
        };

        if invocation.kind.operator_only() && !self.config.is_owner(msg.author_id) {
            info!("Denied {:?} for non-owner {}", invocation.kind, msg.author_id);
            self.safe_reply(msg, "❌ You do not have permission to use this command.")
                .await;
            return Ok(());
        }

        let args = &invocation.args;
        match invocation.kind {
            CommandKind::RestrictUser => self.restrict_user(msg, args).await,
            CommandKind::YesKing => self.yes_king(msg, args).await,
            CommandKind::RemoveUser => self.remove_user(msg, args).await,
            CommandKind::VoteRemove => self.vote_remove(msg, args).await,
            CommandKind::RemoveNuisance => self.remove_nuisance(msg).await,
            CommandKind::Debug => self.debug_relationships(msg).await,
            CommandKind::SelfDestruct => {
                if let Some(report) = self.self_destruct(msg).await {
                    info!(
                        "Self-destruct of {} done: {} removed, {} failed, left: {}, new group: {:?}, excluded: {:?}",
                        msg.channel_id,
                        report.removed.len(),
                        report.failed.len(),
                        report.left_group,
                        report.new_group,
                        report.excluded
                    );
                }
                Ok(())
            }
        }
    }

    /// Reply to `msg`; failures are logged and otherwise ignored.
    pub(crate) async fn safe_reply(&self, msg: &IncomingMessage, text: &str) {
        match self.chat.reply(msg.channel_id, msg.message_id, text).await {
            Ok(_) => debug!("Replied to message {}: {}", msg.message_id, text),
            Err(e) => error!("Could not reply in channel {}: {}", msg.channel_id, e),
        }
    }

    /// Post into a channel without replying; failures are logged.
    pub(crate) async fn announce(&self, channel_id: u64, text: &str) {
        if let Err(e) = self.chat.send_message(channel_id, text).await {
            error!("Could not post in channel {}: {}", channel_id, e);
        }
    }

    async fn restrict_user(&self, msg: &IncomingMessage, args: &[String]) -> Result<(), String> {
        let Some(first) = args.first() else {
            self.safe_reply(msg, "❌ Please provide a user ID to restrict.").await;
            return Ok(());
        };
        let Some(user_id) = command::parse_user(first) else {
            self.safe_reply(msg, "❌ Please provide a valid user ID.").await;
            return Ok(());
        };

        let reason = match args[1..].join(" ") {
            r if r.is_empty() => "No reason provided".to_string(),
            r => r,
        };

        match self.restrictions.toggle(user_id, &reason)? {
            Toggle::Restricted { reason } => {
                info!("Restricted {} ({})", user_id, reason);
                self.safe_reply(
                    msg,
                    &format!("✅ User <@{user_id}> has been restricted. Reason: {reason}"),
                )
                .await;
            }
            Toggle::Unrestricted => {
                info!("Unrestricted {}", user_id);
                self.safe_reply(msg, &format!("✅ User <@{user_id}> has been unrestricted."))
                    .await;
            }
        }
        Ok(())
    }

    async fn yes_king(&self, msg: &IncomingMessage, args: &[String]) -> Result<(), String> {
        let Some(user) = args.first().and_then(|a| command::parse_user(a)) else {
            self.safe_reply(msg, "❌ Please specify a user ID.").await;
            return Ok(());
        };
        if !self.may_target(msg.author_id, user) {
            self.safe_reply(msg, "❌ No permission to crown this user.").await;
            return Ok(());
        }

        match self.api.transfer_ownership(msg.channel_id, user).await {
            Ok(()) => {
                info!("Transferred ownership of {} to {}", msg.channel_id, user);
                self.safe_reply(msg, &format!("✅ <@{user}> `{user}` is now the king!"))
                    .await;
            }
            Err(e) => {
                warn!("Ownership transfer to {} failed: {}", user, e);
                self.safe_reply(
                    msg,
                    &format!("❌ Failed to make <@{user}> `{user}` the king: {}", e.detail()),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn remove_user(&self, msg: &IncomingMessage, args: &[String]) -> Result<(), String> {
        let Some(user) = args.first().and_then(|a| command::parse_user(a)) else {
            self.safe_reply(msg, "❌ Please specify a user ID.").await;
            return Ok(());
        };
        if !self.may_target(msg.author_id, user) {
            self.safe_reply(msg, "❌ You cannot remove that user.").await;
            return Ok(());
        }

        match self.api.remove_recipient(msg.channel_id, user).await {
            Ok(()) => {
                info!("Removed {} from {}", user, msg.channel_id);
                self.safe_reply(msg, &format!("✅ Removed <@{user}> `{user}` from the group chat."))
                    .await;
            }
            Err(e) => {
                warn!("Removing {} failed: {}", user, e);
                self.safe_reply(
                    msg,
                    &format!(
                        "❌ Could not remove <@{user}> `{user}` from the group chat: {}",
                        e.detail()
                    ),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn remove_nuisance(&self, msg: &IncomingMessage) -> Result<(), String> {
        let Some(target) = self.config.nuisance_user_id else {
            self.safe_reply(msg, "❌ No nuisance user is configured.").await;
            return Ok(());
        };

        match self.api.remove_recipient(msg.channel_id, target).await {
            Ok(()) => {
                info!("Removed nuisance user {} from {}", target, msg.channel_id);
                self.safe_reply(msg, &format!("✅ Removed <@{target}>")).await;
            }
            Err(e) => {
                self.safe_reply(
                    msg,
                    &format!("❌ Error while removing <@{target}>: {}", e.detail()),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn debug_relationships(&self, msg: &IncomingMessage) -> Result<(), String> {
        match self.api.get_relationships().await {
            Ok(relationships) => {
                let friends: Vec<String> = relationships
                    .iter()
                    .filter(|r| r.kind == RELATIONSHIP_FRIEND)
                    .map(|r| r.id.to_string())
                    .collect();
                self.safe_reply(
                    msg,
                    &format!(
                        "🔎 {} relationship(s), {} friend(s): {}",
                        relationships.len(),
                        friends.len(),
                        friends.join(", ")
                    ),
                )
                .await;
            }
            Err(e) => {
                self.safe_reply(
                    msg,
                    &format!("❌ Error fetching relationships: {}", e.detail()),
                )
                .await;
            }
        }
        Ok(())
    }
}

//! Tear down the current group and recreate it with confirmed contacts only.
//!
//! Every step after the membership fetch is best-effort; removals and the
//! leave are not rolled back if recreation fails.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::api::RELATIONSHIP_FRIEND;
use crate::bot::chat::IncomingMessage;
use crate::bot::dispatcher::Dispatcher;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfDestructReport {
    pub removed: Vec<u64>,
    pub failed: Vec<u64>,
    pub left_group: bool,
    pub new_group: Option<u64>,
    /// Former members that are not confirmed contacts.
    pub excluded: Vec<u64>,
}

/// Split `members` into (contacts, non-contacts), keeping order.
pub fn partition_members(members: &[u64], contacts: &HashSet<u64>) -> (Vec<u64>, Vec<u64>) {
    members.iter().copied().partition(|id| contacts.contains(id))
}

impl Dispatcher {
    /// Returns `None` when the flow aborted before touching the group.
    pub(crate) async fn self_destruct(&self, msg: &IncomingMessage) -> Option<SelfDestructReport> {
        let channel_id = msg.channel_id;
        let bot = self.config.bot_user_id;

        let members: Vec<u64> = match self.api.get_channel(channel_id).await {
            Ok(channel) if channel.recipients.is_some() => channel
                .member_ids()
                .into_iter()
                .filter(|id| *id != bot)
                .collect(),
            Ok(_) => {
                self.safe_reply(msg, "❌ Could not fetch channel recipients.").await;
                return None;
            }
            Err(e) => {
                warn!("Membership fetch for {} failed: {}", channel_id, e);
                self.safe_reply(
                    msg,
                    &format!("❌ Could not fetch channel recipients: {}", e.detail()),
                )
                .await;
                return None;
            }
        };
        info!("Self-destructing {} with {} member(s)", channel_id, members.len());

        let mut report = SelfDestructReport::default();

        for &member in &members {
            match self.api.remove_recipient(channel_id, member).await {
                Ok(()) => {
                    debug!("Removed member {}", member);
                    report.removed.push(member);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", member, e);
                    self.safe_reply(msg, &format!("❌ Error removing <@{member}>: {}", e.detail()))
                        .await;
                    report.failed.push(member);
                }
            }
        }

        match self.api.remove_recipient(channel_id, bot).await {
            Ok(()) => {
                debug!("Left channel {}", channel_id);
                report.left_group = true;
            }
            Err(e) => {
                warn!("Failed to leave {}: {}", channel_id, e);
                self.safe_reply(msg, &format!("❌ Error leaving group chat: {}", e.detail()))
                    .await;
            }
        }

        let contacts: HashSet<u64> = match self.api.get_relationships().await {
            Ok(relationships) => relationships
                .into_iter()
                .filter(|r| r.kind == RELATIONSHIP_FRIEND)
                .map(|r| r.id)
                .collect(),
            Err(e) => {
                error!("Failed to fetch relationships for recreate: {}", e);
                self.safe_reply(msg, &format!("❌ Error creating new group chat: {}", e.detail()))
                    .await;
                return Some(report);
            }
        };

        let (keep, excluded) = partition_members(&members, &contacts);
        report.excluded = excluded;

        match self.api.create_group(&keep).await {
            Ok(group) => {
                info!("Created a new group chat: {}", group.id);
                report.new_group = Some(group.id);
                self.safe_reply(msg, &format!("✅ Created a new group chat: {}", group.id))
                    .await;
                self.announce(group.id, "@everyone **KABOOM!** Welcome to the new group chat")
                    .await;
                if !report.excluded.is_empty() {
                    let mentions: Vec<String> =
                        report.excluded.iter().map(|id| format!("<@{id}>")).collect();
                    self.announce(
                        group.id,
                        &format!("❌ Could not add non-friend users: {}", mentions.join(", ")),
                    )
                    .await;
                }
            }
            Err(e) => {
                error!("Failed to create a new group chat: {}", e);
                self.safe_reply(msg, &format!("❌ Error creating new group chat: {}", e.detail()))
                    .await;
            }
        }

        Some(report)
    }
}

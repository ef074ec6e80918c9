//! Timed votes: post a poll, seed two reactions, wait, tally, act.

use std::time::Duration;

use tracing::{info, warn};

use crate::bot::chat::IncomingMessage;
use crate::bot::command::{self, VoteTarget};
use crate::bot::dispatcher::Dispatcher;

pub const YES: &str = "👍";
pub const NO: &str = "👎";

/// Participant votes after removing the bot's seed reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
}

impl Tally {
    /// Raw counts include exactly one seed reaction per symbol.
    pub fn from_raw(yes: Option<u64>, no: Option<u64>) -> Self {
        Self {
            yes: yes.unwrap_or(0).saturating_sub(1),
            no: no.unwrap_or(0).saturating_sub(1),
        }
    }

    /// Strict majority; ties fail.
    pub fn passed(&self) -> bool {
        self.yes > self.no
    }
}

fn poll_text(target: VoteTarget, seconds: u64) -> String {
    let subject = match target {
        VoteTarget::WholeGroup => "self-destruct the group chat".to_string(),
        VoteTarget::Member(id) => format!("remove <@{id}>"),
    };
    format!(
        "@everyone\n## **VOTE** to {subject} has started!\nReact with {YES} or {NO}.\n⌚ **{seconds} seconds**!"
    )
}

impl Dispatcher {
    pub(crate) async fn vote_remove(
        &self,
        msg: &IncomingMessage,
        args: &[String],
    ) -> Result<(), String> {
        let target = args.first().and_then(|a| command::parse_vote_target(a));
        let seconds = args
            .get(1)
            .and_then(|a| a.parse::<u64>().ok())
            .filter(|s| *s > 0);
        let (Some(target), Some(seconds)) = (target, seconds) else {
            self.safe_reply(msg, "❌ Please provide a user ID and a timer in seconds.")
                .await;
            return Ok(());
        };

        if let VoteTarget::Member(user) = target {
            if !self.may_target(msg.author_id, user) {
                self.safe_reply(msg, "❌ You cannot remove that user.").await;
                return Ok(());
            }
            let members = match self.api.get_channel(msg.channel_id).await {
                Ok(channel) => channel.member_ids(),
                Err(e) => {
                    self.safe_reply(
                        msg,
                        &format!("❌ Could not fetch group members: {}", e.detail()),
                    )
                    .await;
                    return Ok(());
                }
            };
            if !members.contains(&user) {
                self.safe_reply(msg, "❌ User not found.").await;
                return Ok(());
            }
        }

        // Open: post the poll and seed both options.
        let poll_id = match self.open_poll(msg.channel_id, target, seconds).await {
            Ok(id) => id,
            Err(e) => {
                self.safe_reply(msg, &format!("❌ Could not start the vote: {e}")).await;
                return Ok(());
            }
        };
        info!("Vote {:?} opened in {} for {}s", target, msg.channel_id, seconds);

        let counts = match self
            .chat
            .await_reactions(msg.channel_id, poll_id, &[YES, NO], Duration::from_secs(seconds))
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Vote {:?} lost its reactions: {}", target, e);
                self.announce(msg.channel_id, &format!("❌ Could not count the votes: {e}"))
                    .await;
                return Ok(());
            }
        };

        // Tallying.
        let tally = Tally::from_raw(counts.get(YES).copied(), counts.get(NO).copied());
        info!("Vote {:?} closed: {} yes, {} no", target, tally.yes, tally.no);

        // Resolved.
        if !tally.passed() {
            self.announce(
                msg.channel_id,
                &format!(
                    "❌ The vote failed ({} to {}). No action will be taken.",
                    tally.yes, tally.no
                ),
            )
            .await;
            return Ok(());
        }

        match target {
            VoteTarget::WholeGroup => {
                self.announce(
                    msg.channel_id,
                    &format!(
                        "✅ The vote passed ({} to {})! Self-destructing the group chat...",
                        tally.yes, tally.no
                    ),
                )
                .await;
                self.self_destruct(msg).await;
            }
            VoteTarget::Member(user) => match self.api.remove_recipient(msg.channel_id, user).await {
                Ok(()) => {
                    info!("Vote removed {} from {}", user, msg.channel_id);
                    self.announce(
                        msg.channel_id,
                        &format!("✅ <@{user}> has been removed from the group chat."),
                    )
                    .await;
                }
                Err(e) => {
                    self.announce(
                        msg.channel_id,
                        &format!("❌ Could not remove <@{user}>: {}", e.detail()),
                    )
                    .await;
                }
            },
        }
        Ok(())
    }

    async fn open_poll(&self, channel_id: u64, target: VoteTarget, seconds: u64) -> Result<u64, String> {
        let poll_id = self
            .chat
            .send_message(channel_id, &poll_text(target, seconds))
            .await?;
        self.chat.react(channel_id, poll_id, YES).await?;
        self.chat.react(channel_id, poll_id, NO).await?;
        Ok(poll_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_reactions_are_subtracted() {
        let tally = Tally::from_raw(Some(4), Some(2));
        assert_eq!(tally, Tally { yes: 3, no: 1 });
        assert!(tally.passed());
    }

    #[test]
    fn test_tie_fails() {
        let tally = Tally::from_raw(Some(3), Some(3));
        assert_eq!(tally, Tally { yes: 2, no: 2 });
        assert!(!tally.passed());
    }

    #[test]
    fn test_no_participants_fails() {
        assert!(!Tally::from_raw(Some(1), Some(1)).passed());
    }

    #[test]
    fn test_missing_symbol_counts_as_zero() {
        let tally = Tally::from_raw(None, Some(1));
        assert_eq!(tally, Tally { yes: 0, no: 0 });
        let tally = Tally::from_raw(Some(2), None);
        assert_eq!(tally, Tally { yes: 1, no: 0 });
        assert!(tally.passed());
    }

    #[test]
    fn test_poll_text() {
        let text = poll_text(VoteTarget::Member(42), 30);
        assert!(text.contains("remove <@42>"));
        assert!(text.contains("30 seconds"));
        assert!(poll_text(VoteTarget::WholeGroup, 5).contains("self-destruct"));
    }
}

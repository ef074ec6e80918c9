//! Forwards this crate's log events into a Discord channel.
//!
//! WARN and ERROR go out as soon as they arrive; INFO is batched and posted
//! every few seconds. Nothing here logs through `tracing`, a failed post
//! would otherwise feed itself back into the channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::all::ChannelId;
use serenity::http::Http;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Discord rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 2000;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BUFFERED_LINES: usize = 50;

const CRATE_TARGET: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Urgent(String),
    Info(String),
}

/// Where forwarded log text ends up.
#[async_trait]
trait LogSink: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), String>;
}

struct ChannelSink {
    http: Arc<Http>,
    channel: ChannelId,
}

#[async_trait]
impl LogSink for ChannelSink {
    async fn post(&self, text: &str) -> Result<(), String> {
        self.channel
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

pub struct DiscordLogLayer {
    tx: mpsc::UnboundedSender<Entry>,
}

impl DiscordLogLayer {
    pub fn new(http: Arc<Http>, channel_id: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink {
            http,
            channel: ChannelId::new(channel_id),
        };
        tokio::spawn(forward(rx, sink));
        Self { tx }
    }
}

/// Drains `rx` into `sink` until every sender is gone, then flushes what is
/// still buffered.
async fn forward<S: LogSink>(mut rx: mpsc::UnboundedReceiver<Entry>, sink: S) {
    let mut buffer: Vec<String> = Vec::new();
    let start = tokio::time::Instant::now() + FLUSH_INTERVAL;
    let mut interval = tokio::time::interval_at(start, FLUSH_INTERVAL);

    loop {
        tokio::select! {
            entry = rx.recv() => match entry {
                Some(Entry::Urgent(line)) => post(&sink, &line).await,
                Some(Entry::Info(line)) => {
                    buffer.push(line);
                    if buffer.len() >= MAX_BUFFERED_LINES {
                        flush(&sink, &mut buffer).await;
                    }
                }
                None => break,
            },
            _ = interval.tick() => flush(&sink, &mut buffer).await,
        }
    }

    flush(&sink, &mut buffer).await;
}

async fn flush<S: LogSink>(sink: &S, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    post(sink, &combined).await;
}

async fn post<S: LogSink>(sink: &S, text: &str) {
    for chunk in split_message(text, MAX_MESSAGE_CHARS) {
        if let Err(e) = sink.post(&chunk).await {
            eprintln!("Failed to send log to Discord: {e}");
        }
    }
}

/// Split `text` into pieces of at most `limit` chars, breaking between lines
/// where possible and inside a line only when the line alone is too long.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len += needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let mut chars = line.chars().peekable();
        while chars.peek().is_some() {
            let piece: String = chars.by_ref().take(limit).collect();
            current_len = piece.chars().count();
            if current_len == limit {
                chunks.push(piece);
                current_len = 0;
            } else {
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn is_own_target(target: &str) -> bool {
    target == CRATE_TARGET
        || target
            .strip_prefix(CRATE_TARGET)
            .is_some_and(|rest| rest.starts_with("::"))
}

/// Module path without the crate name, e.g. `bot::dispatcher`.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix(CRATE_TARGET)
        .and_then(|rest| rest.strip_prefix("::"))
        .unwrap_or(target)
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for DiscordLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if level > Level::INFO || !is_own_target(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!("[{}] {}", short_target(metadata.target()), visitor.message);

        let entry = match level {
            Level::ERROR => Entry::Urgent(format!("❌ {line}")),
            Level::WARN => Entry::Urgent(format!("⚠️ {line}")),
            _ => Entry::Info(line),
        };

        if self.tx.send(entry).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_subscriber::prelude::*;

    #[derive(Clone, Default)]
    struct SpySink {
        posts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LogSink for SpySink {
        async fn post(&self, text: &str) -> Result<(), String> {
            self.posts.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn capture(emit: impl FnOnce()) -> Vec<Entry> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(DiscordLogLayer { tx });
        tracing::subscriber::with_default(subscriber, emit);
        let mut entries = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn test_levels_map_to_priority() {
        let entries = capture(|| {
            tracing::error!("store gone");
            tracing::warn!(user = 7, "slow reply");
            tracing::info!("started");
            tracing::debug!("noise");
        });
        assert_eq!(
            entries,
            vec![
                Entry::Urgent("❌ [discord_log::tests] store gone".into()),
                Entry::Urgent("⚠️ [discord_log::tests] slow reply, user = 7".into()),
                Entry::Info("[discord_log::tests] started".into()),
            ]
        );
    }

    #[test]
    fn test_foreign_targets_are_dropped() {
        let entries = capture(|| {
            tracing::warn!(target: "serenity::gateway", "reconnecting");
            tracing::error!(target: "groupwardenish", "lookalike");
            tracing::error!(target: "groupwarden", "root");
        });
        assert_eq!(entries, vec![Entry::Urgent("❌ [groupwarden] root".into())]);
    }

    #[tokio::test]
    async fn test_forward_sends_urgent_and_flushes_on_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SpySink::default();
        let posts = sink.posts.clone();

        tx.send(Entry::Info("one".into())).unwrap();
        tx.send(Entry::Urgent("⚠️ two".into())).unwrap();
        tx.send(Entry::Info("three".into())).unwrap();
        drop(tx);
        forward(rx, sink).await;

        assert_eq!(*posts.lock().unwrap(), vec!["⚠️ two", "one\nthree"]);
    }

    #[tokio::test]
    async fn test_forward_flushes_full_buffer_early() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SpySink::default();
        let posts = sink.posts.clone();

        for i in 0..MAX_BUFFERED_LINES + 1 {
            tx.send(Entry::Info(format!("line {i}"))).unwrap();
        }
        drop(tx);
        forward(rx, sink).await;

        let posts = posts.lock().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].lines().count(), MAX_BUFFERED_LINES);
        assert_eq!(posts[1], format!("line {MAX_BUFFERED_LINES}"));
    }

    #[test]
    fn test_split_keeps_short_text_whole() {
        assert_eq!(split_message("a\nb", 10), vec!["a\nb"]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn test_split_breaks_between_lines() {
        assert_eq!(split_message("aaaa\nbbbb\ncc", 9), vec!["aaaa\nbbbb", "cc"]);
    }

    #[test]
    fn test_split_hard_splits_long_line() {
        let text = format!("{}\nok", "é".repeat(MAX_MESSAGE_CHARS * 2 + 5));
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks[2], format!("{}\nok", "é".repeat(5)));
    }
}

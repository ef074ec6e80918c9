//! Command layer - parses chat commands and runs the moderation flows.

pub mod chat;
pub mod command;
pub mod discord;
pub mod dispatcher;
pub mod friends;
pub mod selfdestruct;
pub mod vote;


pub use chat::IncomingMessage;
pub use discord::DiscordClient;
pub use dispatcher::{Dispatcher, DispatcherConfig};

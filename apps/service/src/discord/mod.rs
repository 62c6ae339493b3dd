/// Notification channel
///
/// The status message lives in a Discord text channel. This module holds:
/// - The channel traits the rest of the service talks to
/// - A REST implementation of them
/// - Message sync, which keeps exactly one current status message
/// - Watchers for restart announcements and status requests
pub mod announcements;
pub mod client;
pub mod commands;
mod cursor;
pub mod embed;
pub mod sync;

pub use announcements::{Announcement, AnnouncementRules, AnnouncementWatcher};
pub use client::{DiscordChannel, DiscordClient};
pub use commands::CommandWatcher;
pub use embed::Embed;
pub use sync::{EditDebounce, MessageHandle, MessageSync, SyncOutcome};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Discord snowflake of a message (or user, or channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Discord sends snowflakes as strings; accept plain numbers as well.
impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(MessageId(id)),
            Raw::Text(text) => text.parse().map(MessageId).map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// A message as seen when reading channel history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub author_id: MessageId,
    /// Authored by the account this service runs as
    pub from_self: bool,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("unknown channel or message")]
    NotFound,
    #[error("missing permissions")]
    Forbidden,
    #[error("invalid bot token")]
    Unauthorized,
    #[error("rate limited (retry after {0:?})")]
    RateLimited(Option<Duration>),
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The channel holding the status message
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn send(&self, body: &Embed) -> Result<MessageId, ChannelError>;

    async fn edit(&self, message_id: MessageId, body: &Embed) -> Result<(), ChannelError>;

    /// Up to `limit` most recent messages, newest first
    async fn recent_messages(&self, limit: u8) -> Result<Vec<ChannelMessage>, ChannelError>;

    /// Delete up to `limit` most recent messages, returning how many went
    async fn purge(&self, limit: u8) -> Result<usize, ChannelError>;
}

/// A channel read for new messages (announcements, status requests)
#[async_trait]
pub trait AnnouncementFeed: Send + Sync {
    /// Messages newer than `after` (or the most recent ones without it)
    async fn messages_after(
        &self,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_accepts_strings_and_numbers() {
        let from_text: MessageId = serde_json::from_str("\"1130123456789012345\"").unwrap();
        let from_number: MessageId = serde_json::from_str("42").unwrap();
        assert_eq!(from_text, MessageId(1_130_123_456_789_012_345));
        assert_eq!(from_number, MessageId(42));
        assert!(serde_json::from_str::<MessageId>("\"abc\"").is_err());
        assert_eq!(serde_json::to_string(&MessageId(7)).unwrap(), "\"7\"");
    }
}

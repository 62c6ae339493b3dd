use std::sync::Arc;

use super::cursor::FeedCursor;
use super::{AnnouncementFeed, ChannelError, ChannelMessage, Embed, MessageId, StatusChannel};

/// Answers on-demand status requests (`!fivem`) posted in a watched channel
pub struct CommandWatcher {
    cursor: FeedCursor,
    replies: Arc<dyn StatusChannel>,
    prefix: String,
}

impl CommandWatcher {
    pub fn new(
        feed: Arc<dyn AnnouncementFeed>,
        replies: Arc<dyn StatusChannel>,
        prefix: &str,
    ) -> Self {
        Self { cursor: FeedCursor::new(feed), replies, prefix: prefix.trim().to_lowercase() }
    }

    pub fn is_request(&self, message: &ChannelMessage) -> bool {
        !message.from_self && message.content.trim_start().to_lowercase().starts_with(&self.prefix)
    }

    /// Number of requests posted since the last poll
    pub async fn poll(&mut self) -> Result<usize, ChannelError> {
        let messages = self.cursor.advance().await?;
        Ok(messages.iter().filter(|message| self.is_request(message)).count())
    }

    pub async fn reply(&self, body: &Embed) -> Result<MessageId, ChannelError> {
        self.replies.send(body).await
    }
}

use std::sync::Arc;

use tracing::debug;

use super::{AnnouncementFeed, ChannelError, ChannelMessage, MessageId};

/// Messages fetched per poll
const POLL_BATCH: u8 = 50;

/// Follows a channel from its newest message onwards
pub struct FeedCursor {
    feed: Arc<dyn AnnouncementFeed>,
    last_seen: Option<MessageId>,
    primed: bool,
}

impl FeedCursor {
    pub fn new(feed: Arc<dyn AnnouncementFeed>) -> Self {
        Self { feed, last_seen: None, primed: false }
    }

    pub fn last_seen(&self) -> Option<MessageId> {
        self.last_seen
    }

    /// Messages posted since the previous call, oldest first.
    ///
    /// The first call only records where the channel currently ends.
    pub async fn advance(&mut self) -> Result<Vec<ChannelMessage>, ChannelError> {
        if !self.primed {
            let newest = self.feed.messages_after(None, 1).await?;
            self.last_seen = newest.iter().map(|message| message.id).max();
            self.primed = true;
            debug!("Watching channel after {:?}", self.last_seen);
            return Ok(Vec::new());
        }

        let mut messages = self.feed.messages_after(self.last_seen, POLL_BATCH).await?;
        messages.retain(|message| self.last_seen.is_none_or(|seen| message.id > seen));
        messages.sort_by_key(|message| message.id);

        if let Some(newest) = messages.last() {
            self.last_seen = Some(newest.id);
        }
        Ok(messages)
    }
}

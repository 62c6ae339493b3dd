use std::sync::Arc;

use chrono::Duration;

use super::cursor::FeedCursor;
use super::{AnnouncementFeed, ChannelError, ChannelMessage, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// The server is going down right now
    RestartingNow,
    /// A restart is coming in the configured lead time
    RestartSoon(Duration),
}

/// Which messages count as announcements
#[derive(Debug, Clone)]
pub struct AnnouncementRules {
    author_id: MessageId,
    restarting_phrase: String,
    restart_soon_phrase: String,
    restart_soon: Duration,
}

impl AnnouncementRules {
    pub fn new(
        author_id: MessageId,
        restarting_phrase: &str,
        restart_soon_phrase: &str,
        restart_soon_minutes: u32,
    ) -> Self {
        Self {
            author_id,
            restarting_phrase: restarting_phrase.to_lowercase(),
            restart_soon_phrase: restart_soon_phrase.to_lowercase(),
            restart_soon: Duration::minutes(restart_soon_minutes.into()),
        }
    }

    pub fn classify(&self, message: &ChannelMessage) -> Option<Announcement> {
        if message.author_id != self.author_id {
            return None;
        }

        let content = message.content.to_lowercase();
        // "restarting" wins when both phrases appear
        if !self.restarting_phrase.is_empty() && content.contains(&self.restarting_phrase) {
            Some(Announcement::RestartingNow)
        } else if !self.restart_soon_phrase.is_empty() && content.contains(&self.restart_soon_phrase)
        {
            Some(Announcement::RestartSoon(self.restart_soon))
        } else {
            None
        }
    }
}

/// Turns new messages in an announcement channel into restart events
pub struct AnnouncementWatcher {
    cursor: FeedCursor,
    rules: AnnouncementRules,
}

impl AnnouncementWatcher {
    pub fn new(feed: Arc<dyn AnnouncementFeed>, rules: AnnouncementRules) -> Self {
        Self { cursor: FeedCursor::new(feed), rules }
    }

    pub fn last_seen(&self) -> Option<MessageId> {
        self.cursor.last_seen()
    }

    /// Announcements posted since the last poll, oldest first
    pub async fn poll(&mut self) -> Result<Vec<Announcement>, ChannelError> {
        let messages = self.cursor.advance().await?;
        Ok(messages.iter().filter_map(|message| self.rules.classify(message)).collect())
    }
}

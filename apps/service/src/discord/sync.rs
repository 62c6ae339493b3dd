//! Message sync: keep exactly one status message showing the latest body.
//!
//! Edit debounce transitions:
//!
//! | debounce | edit    | next    | action                                   |
//! |----------|---------|---------|------------------------------------------|
//! | any      | ok      | Clear   | none                                     |
//! | Clear    | failed  | Skipped | skip this update                         |
//! | Skipped  | failed  | Clear   | adopt own message from history, else     |
//! |          |         |         | purge the channel and send a new one     |
//!
//! Without a known message the channel is purged and a new message sent.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{Embed, MessageId, StatusChannel};

/// Whether the previous edit attempt was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditDebounce {
    #[default]
    Clear,
    Skipped,
}

/// Reference to the current status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHandle {
    pub message_id: Option<MessageId>,
    pub edit: EditDebounce,
}

/// What a sync did to the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No message was known; channel purged and a message sent
    Sent,
    Edited,
    /// Edit failed once; update deferred to the next tick
    Skipped,
    /// Edit failed twice; an own message from history was edited instead
    Adopted(MessageId),
    /// Edit failed twice, nothing to adopt; channel purged and resent
    Resent,
    /// Purging or sending failed; retried next tick
    Failed,
}

pub struct MessageSync {
    channel: Arc<dyn StatusChannel>,
    purge_limit: u8,
    scan_limit: u8,
}

impl MessageSync {
    pub fn new(channel: Arc<dyn StatusChannel>, purge_limit: u8, scan_limit: u8) -> Self {
        Self { channel, purge_limit, scan_limit }
    }

    /// Converge the channel onto `body`, returning the updated handle.
    ///
    /// Never fails: delivery errors are logged and absorbed into the handle.
    pub async fn sync(&self, body: &Embed, handle: MessageHandle) -> (MessageHandle, SyncOutcome) {
        let Some(message_id) = handle.message_id else {
            return self.purge_and_send(body, SyncOutcome::Sent).await;
        };

        let error = match self.channel.edit(message_id, body).await {
            Ok(()) => {
                let handle = MessageHandle { message_id: Some(message_id), edit: EditDebounce::Clear };
                return (handle, SyncOutcome::Edited);
            }
            Err(error) => error,
        };

        match handle.edit {
            EditDebounce::Clear => {
                warn!("Skipped status-message edit: {error}");
                let handle =
                    MessageHandle { message_id: Some(message_id), edit: EditDebounce::Skipped };
                (handle, SyncOutcome::Skipped)
            }
            EditDebounce::Skipped => {
                warn!("Status-message edit failed again: {error}");
                if let Some(adopted) = self.adopt_from_history(body).await {
                    let handle = MessageHandle { message_id: Some(adopted), edit: EditDebounce::Clear };
                    return (handle, SyncOutcome::Adopted(adopted));
                }
                self.purge_and_send(body, SyncOutcome::Resent).await
            }
        }
    }

    /// Edit the newest own message among the last few in the channel.
    async fn adopt_from_history(&self, body: &Embed) -> Option<MessageId> {
        let history = match self.channel.recent_messages(self.scan_limit).await {
            Ok(history) => history,
            Err(error) => {
                error!("Failed to go through status-channel history: {error}");
                return None;
            }
        };

        let own = history.into_iter().find(|message| message.from_self)?;
        match self.channel.edit(own.id, body).await {
            Ok(()) => {
                info!("Reused status-message {} from channel history", own.id);
                Some(own.id)
            }
            Err(error) => {
                error!("Failed to edit status-message {} from channel history: {error}", own.id);
                None
            }
        }
    }

    async fn purge_and_send(&self, body: &Embed, success: SyncOutcome) -> (MessageHandle, SyncOutcome) {
        if let Err(error) = self.channel.purge(self.purge_limit).await {
            error!("Failed to clear status-channel: {error}");
            return (MessageHandle::default(), SyncOutcome::Failed);
        }

        match self.channel.send(body).await {
            Ok(message_id) => {
                info!("Sent status-message {message_id}");
                (MessageHandle { message_id: Some(message_id), edit: EditDebounce::Clear }, success)
            }
            Err(error) => {
                error!("Failed to send the status-message: {error}");
                (MessageHandle::default(), SyncOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::discord::{ChannelError, ChannelMessage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub(crate) const SELF_ID: MessageId = MessageId(1);
    const OTHER_ID: MessageId = MessageId(2);

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Send,
        Edit(MessageId),
        History,
        Purge,
    }

    #[derive(Default)]
    struct FakeState {
        /// (id, author, body), oldest first
        messages: Vec<(MessageId, MessageId, Embed)>,
        next_id: u64,
        failing_edits: usize,
        history_fails: bool,
        purge_fails: bool,
        calls: Vec<Call>,
    }

    /// In-memory channel that records every call
    #[derive(Default)]
    pub(crate) struct FakeChannel {
        state: Mutex<FakeState>,
    }

    impl FakeChannel {
        fn post(&self, author: MessageId, body: Embed) -> MessageId {
            let mut state = self.state.lock().unwrap();
            state.next_id += 100;
            let id = MessageId(state.next_id);
            state.messages.push((id, author, body));
            id
        }

        pub(crate) fn fail_next_edits(&self, count: usize) {
            self.state.lock().unwrap().failing_edits = count;
        }

        /// An existing status message from a previous run
        pub(crate) fn seed_own_message(&self) -> MessageId {
            self.post(SELF_ID, body("previous run"))
        }

        pub(crate) fn bodies(&self) -> Vec<Embed> {
            self.state.lock().unwrap().messages.iter().map(|(_, _, body)| body.clone()).collect()
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn delete(&self, id: MessageId) {
            self.state.lock().unwrap().messages.retain(|(message_id, _, _)| *message_id != id);
        }
    }

    #[async_trait]
    impl StatusChannel for FakeChannel {
        async fn send(&self, body: &Embed) -> Result<MessageId, ChannelError> {
            self.state.lock().unwrap().calls.push(Call::Send);
            Ok(self.post(SELF_ID, body.clone()))
        }

        async fn edit(&self, message_id: MessageId, body: &Embed) -> Result<(), ChannelError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Edit(message_id));
            if state.failing_edits > 0 {
                state.failing_edits -= 1;
                return Err(ChannelError::RateLimited(None));
            }
            match state.messages.iter_mut().find(|(id, author, _)| *id == message_id && *author == SELF_ID) {
                Some((_, _, existing)) => {
                    *existing = body.clone();
                    Ok(())
                }
                None => Err(ChannelError::NotFound),
            }
        }

        async fn recent_messages(&self, limit: u8) -> Result<Vec<ChannelMessage>, ChannelError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::History);
            if state.history_fails {
                return Err(ChannelError::Forbidden);
            }
            Ok(state
                .messages
                .iter()
                .rev()
                .take(limit as usize)
                .map(|(id, author, _)| ChannelMessage {
                    id: *id,
                    author_id: *author,
                    from_self: *author == SELF_ID,
                    content: String::new(),
                })
                .collect())
        }

        async fn purge(&self, limit: u8) -> Result<usize, ChannelError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Purge);
            if state.purge_fails {
                return Err(ChannelError::Forbidden);
            }
            let keep = state.messages.len().saturating_sub(limit as usize);
            let removed = state.messages.len() - keep;
            state.messages.truncate(keep);
            Ok(removed)
        }
    }

    pub(crate) fn body(title: &str) -> Embed {
        Embed { title: Some(title.into()), ..Embed::default() }
    }

    fn setup() -> (Arc<FakeChannel>, MessageSync) {
        let channel = Arc::new(FakeChannel::default());
        let sync = MessageSync::new(channel.clone(), 100, 11);
        (channel, sync)
    }

    #[tokio::test]
    async fn test_first_sync_purges_and_sends() {
        let (channel, sync) = setup();
        channel.post(OTHER_ID, body("stale"));

        let (handle, outcome) = sync.sync(&body("online"), MessageHandle::default()).await;

        assert_eq!(outcome, SyncOutcome::Sent);
        assert!(handle.message_id.is_some());
        assert_eq!(channel.calls(), vec![Call::Purge, Call::Send]);
        assert_eq!(channel.bodies(), vec![body("online")]);
    }

    #[tokio::test]
    async fn test_repeated_sync_keeps_one_message() {
        let (channel, sync) = setup();

        let (handle, _) = sync.sync(&body("online"), MessageHandle::default()).await;
        let (handle, first) = sync.sync(&body("online"), handle).await;
        let (_, second) = sync.sync(&body("online"), handle).await;

        assert_eq!(first, SyncOutcome::Edited);
        assert_eq!(second, SyncOutcome::Edited);
        assert_eq!(channel.bodies(), vec![body("online")]);
    }

    #[tokio::test]
    async fn test_first_edit_failure_skips_without_touching_channel() {
        let (channel, sync) = setup();
        let (handle, _) = sync.sync(&body("online"), MessageHandle::default()).await;
        channel.fail_next_edits(1);

        let (skipped, outcome) = sync.sync(&body("offline"), handle).await;

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(skipped.edit, EditDebounce::Skipped);
        assert_eq!(skipped.message_id, handle.message_id);
        assert_eq!(channel.calls().last(), Some(&Call::Edit(handle.message_id.unwrap())));
        assert_eq!(channel.bodies(), vec![body("online")]);

        let (recovered, outcome) = sync.sync(&body("offline"), skipped).await;
        assert_eq!(outcome, SyncOutcome::Edited);
        assert_eq!(recovered.edit, EditDebounce::Clear);
        assert_eq!(channel.bodies(), vec![body("offline")]);
    }

    #[tokio::test]
    async fn test_second_edit_failure_adopts_message_from_history() {
        let (channel, sync) = setup();
        let own = channel.post(SELF_ID, body("old"));
        channel.post(OTHER_ID, body("chatter"));
        let stale = MessageHandle { message_id: Some(MessageId(9_999)), edit: EditDebounce::Skipped };

        let (handle, outcome) = sync.sync(&body("online"), stale).await;

        assert_eq!(outcome, SyncOutcome::Adopted(own));
        assert_eq!(handle, MessageHandle { message_id: Some(own), edit: EditDebounce::Clear });
        assert_eq!(
            channel.calls(),
            vec![Call::Edit(MessageId(9_999)), Call::History, Call::Edit(own)]
        );
        assert!(!channel.calls().contains(&Call::Purge));
        assert_eq!(channel.bodies(), vec![body("online"), body("chatter")]);
    }

    #[tokio::test]
    async fn test_second_edit_failure_without_own_message_resends() {
        let (channel, sync) = setup();
        channel.post(OTHER_ID, body("chatter"));
        let stale = MessageHandle { message_id: Some(MessageId(9_999)), edit: EditDebounce::Skipped };

        let (handle, outcome) = sync.sync(&body("online"), stale).await;

        assert_eq!(outcome, SyncOutcome::Resent);
        assert_eq!(handle.edit, EditDebounce::Clear);
        assert_eq!(
            channel.calls(),
            vec![Call::Edit(MessageId(9_999)), Call::History, Call::Purge, Call::Send]
        );
        assert_eq!(channel.bodies(), vec![body("online")]);
    }

    #[tokio::test]
    async fn test_failed_history_scan_falls_back_to_resend() {
        let (channel, sync) = setup();
        let own = channel.post(SELF_ID, body("old"));
        channel.state.lock().unwrap().history_fails = true;
        channel.delete(own);
        let stale = MessageHandle { message_id: Some(own), edit: EditDebounce::Skipped };

        let (_, outcome) = sync.sync(&body("online"), stale).await;

        assert_eq!(outcome, SyncOutcome::Resent);
        assert_eq!(channel.bodies(), vec![body("online")]);
    }

    #[tokio::test]
    async fn test_two_failing_ticks_escalate_in_order() {
        let (channel, sync) = setup();
        let (handle, _) = sync.sync(&body("online"), MessageHandle::default()).await;
        let message_id = handle.message_id.unwrap();
        channel.fail_next_edits(3);

        let (handle, first) = sync.sync(&body("offline"), handle).await;
        let (handle, second) = sync.sync(&body("offline"), handle).await;

        assert_eq!(first, SyncOutcome::Skipped);
        // the failed handle edit and the history edit both hit the same message
        assert_eq!(second, SyncOutcome::Resent);
        assert_eq!(handle.edit, EditDebounce::Clear);
        assert_eq!(channel.bodies(), vec![body("offline")]);
        assert_ne!(handle.message_id, Some(message_id));
    }

    #[tokio::test]
    async fn test_purge_failure_leaves_handle_empty() {
        let (channel, sync) = setup();
        channel.state.lock().unwrap().purge_fails = true;

        let (handle, outcome) = sync.sync(&body("online"), MessageHandle::default()).await;

        assert_eq!(outcome, SyncOutcome::Failed);
        assert_eq!(handle, MessageHandle::default());
        assert!(channel.bodies().is_empty());
    }
}

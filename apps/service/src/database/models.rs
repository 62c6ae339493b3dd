use chrono::{DateTime, Duration, Utc};

use crate::discord::{EditDebounce, MessageHandle, MessageId};
use crate::monitoring::sources::SourceKind;
use crate::monitoring::state::{RestartGrace, ServerStatus};
use crate::monitoring::types::ServerState;

/// Longest custom message shown in the status message
pub const MAX_CUSTOM_MESSAGE_CHARS: usize = 1000;
/// Longest auxiliary status text persisted
pub const MAX_PERSISTED_STATUS_CHARS: usize = 100;
/// Auxiliary statuses older than this are treated as absent
pub const AUXILIARY_FRESHNESS_SECONDS: i64 = 120;

/// The persisted zone: one monitored server and its status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    pub id: i64,
    pub max_players: u32,
    pub custom_message: Option<String>,
    pub next_restart_at: Option<DateTime<Utc>>,
    pub max_players_last_updated: Option<DateTime<Utc>>,
    pub status_message_id: Option<MessageId>,
    pub last_status: ServerState,
    pub players: u32,
    pub last_offline: Option<DateTime<Utc>>,
    pub last_online: Option<DateTime<Utc>>,
    pub is_offline_twice: bool,
    pub skipped_message_edit: bool,
}

impl ZoneRecord {
    /// Rebuild the live state machine from the stored fields
    pub fn server_status(&self, grace: RestartGrace) -> ServerStatus {
        ServerStatus::restore(
            self.last_status,
            self.players,
            self.last_online,
            self.last_offline,
            self.next_restart_at,
            self.is_offline_twice.into(),
        )
        .with_grace(grace)
    }

    pub fn message_handle(&self) -> MessageHandle {
        MessageHandle {
            message_id: self.status_message_id,
            edit: if self.skipped_message_edit { EditDebounce::Skipped } else { EditDebounce::Clear },
        }
    }

    /// Convert SystemTime-style unix seconds to a UTC timestamp
    pub fn i64_to_timestamp(timestamp: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(timestamp, 0)
    }

    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp()
    }
}

/// Last status text reported by one auxiliary source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryStatus {
    pub kind: SourceKind,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

impl AuxiliaryStatus {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at < Duration::seconds(AUXILIARY_FRESHNESS_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ZoneRecord {
        ZoneRecord {
            id: 1,
            max_players: 64,
            custom_message: None,
            next_restart_at: None,
            max_players_last_updated: None,
            status_message_id: Some(MessageId(42)),
            last_status: ServerState::Offline,
            players: 3,
            last_offline: ZoneRecord::i64_to_timestamp(1_700_000_000),
            last_online: None,
            is_offline_twice: true,
            skipped_message_edit: true,
        }
    }

    #[test]
    fn test_record_restores_state_machine() {
        let status = record().server_status(RestartGrace::default());
        assert_eq!(status.state(), ServerState::Offline);
        assert_eq!(status.players(), 3);
        assert!(status.offline_debounce().is_armed());
        assert_eq!(status.last_offline_at(), ZoneRecord::i64_to_timestamp(1_700_000_000));
    }

    #[test]
    fn test_record_restores_message_handle() {
        let handle = record().message_handle();
        assert_eq!(handle.message_id, Some(MessageId(42)));
        assert_eq!(handle.edit, EditDebounce::Skipped);
    }

    #[test]
    fn test_auxiliary_freshness() {
        let now = Utc::now();
        let status = AuxiliaryStatus {
            kind: SourceKind::Official,
            text: "All Systems Operational".into(),
            updated_at: now - Duration::seconds(119),
        };
        assert!(status.is_fresh(now));
        assert!(!status.is_fresh(now + Duration::seconds(1)));
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};

use super::models::{
    AUXILIARY_FRESHNESS_SECONDS, AuxiliaryStatus, MAX_CUSTOM_MESSAGE_CHARS,
    MAX_PERSISTED_STATUS_CHARS, ZoneRecord,
};
use crate::discord::MessageId;
use crate::monitoring::sources::{SourceKind, truncate_chars};
use crate::monitoring::state::ServerStatus;
use crate::monitoring::types::ServerState;
use crate::pool::LibsqlPool;

const ZONE_COLUMNS: &str = "id, max_players, custom_message, next_restart_at, \
     max_players_last_updated, status_message_id, last_status, players, last_offline, \
     last_online, is_offline_twice, skipped_message_edit";

/// Zone store: one durable zone record plus the auxiliary statuses.
///
/// Every write touches a single logical concern, so callers never need a
/// transaction spanning several methods.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// Fetch the zone record, creating it with defaults if none exists
    async fn load_or_create_zone(&self) -> Result<ZoneRecord>;

    /// Persist the state machine fields
    async fn save_server_status(&self, zone_id: i64, status: &ServerStatus) -> Result<()>;

    async fn set_next_restart_at(&self, zone_id: i64, at: Option<DateTime<Utc>>) -> Result<()>;

    async fn set_status_message_id(&self, zone_id: i64, message_id: Option<MessageId>) -> Result<()>;

    async fn set_skipped_message_edit(&self, zone_id: i64, skipped: bool) -> Result<()>;

    async fn set_max_players(&self, zone_id: i64, max_players: u32, now: DateTime<Utc>) -> Result<()>;

    /// Truncated to 1000 characters; `None` removes the message
    async fn set_custom_message(&self, zone_id: i64, message: Option<&str>) -> Result<()>;

    /// Upsert a source's status, truncated to 100 characters
    async fn upsert_auxiliary_status(
        &self,
        kind: SourceKind,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// The source's status if it was updated within the freshness window
    async fn fresh_auxiliary_status(
        &self,
        kind: SourceKind,
        now: DateTime<Utc>,
    ) -> Result<Option<AuxiliaryStatus>>;
}

/// LibSQL zone store implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn select_zone(&self) -> Result<Option<ZoneRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {ZONE_COLUMNS} FROM status_zone ORDER BY id LIMIT 1"), ())
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(zone_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn optional_timestamp(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.and_then(ZoneRecord::i64_to_timestamp)
}

fn zone_from_row(row: &Row) -> Result<ZoneRecord> {
    Ok(ZoneRecord {
        id: row.get(0)?,
        max_players: row.get::<i64>(1)?.max(0) as u32,
        custom_message: row.get(2)?,
        next_restart_at: optional_timestamp(row.get(3)?),
        max_players_last_updated: optional_timestamp(row.get(4)?),
        status_message_id: row.get::<Option<i64>>(5)?.map(|id| MessageId(id as u64)),
        last_status: ServerState::from_ordinal(row.get(6)?),
        players: row.get::<i64>(7)?.max(0) as u32,
        last_offline: optional_timestamp(row.get(8)?),
        last_online: optional_timestamp(row.get(9)?),
        is_offline_twice: row.get::<i64>(10)? != 0,
        skipped_message_edit: row.get::<i64>(11)? != 0,
    })
}

#[async_trait]
impl ZoneStore for DatabaseImpl {
    async fn load_or_create_zone(&self) -> Result<ZoneRecord> {
        if let Some(zone) = self.select_zone().await? {
            return Ok(zone);
        }

        {
            let conn = self.get_conn().await?;
            conn.execute("INSERT INTO status_zone DEFAULT VALUES", ())
                .await
                .context("Failed to create status zone")?;
        }
        tracing::info!("Created a new status zone record");

        self.select_zone().await?.context("Status zone vanished right after creation")
    }

    async fn save_server_status(&self, zone_id: i64, status: &ServerStatus) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE status_zone SET last_status = ?, players = ?, last_online = ?, last_offline = ?, \
             is_offline_twice = ? WHERE id = ?",
            params![
                status.state().ordinal(),
                status.players() as i64,
                status.last_online_at().map(ZoneRecord::timestamp_to_i64),
                status.last_offline_at().map(ZoneRecord::timestamp_to_i64),
                if status.offline_debounce().is_armed() { 1 } else { 0 },
                zone_id
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_next_restart_at(&self, zone_id: i64, at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE status_zone SET next_restart_at = ? WHERE id = ?",
            params![at.map(ZoneRecord::timestamp_to_i64), zone_id],
        )
        .await?;
        Ok(())
    }

    async fn set_status_message_id(&self, zone_id: i64, message_id: Option<MessageId>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE status_zone SET status_message_id = ? WHERE id = ?",
            params![message_id.map(|id| id.0 as i64), zone_id],
        )
        .await?;
        Ok(())
    }

    async fn set_skipped_message_edit(&self, zone_id: i64, skipped: bool) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE status_zone SET skipped_message_edit = ? WHERE id = ?",
            params![if skipped { 1 } else { 0 }, zone_id],
        )
        .await?;
        Ok(())
    }

    async fn set_max_players(&self, zone_id: i64, max_players: u32, now: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE status_zone SET max_players = ?, max_players_last_updated = ? WHERE id = ?",
            params![max_players as i64, ZoneRecord::timestamp_to_i64(now), zone_id],
        )
        .await?;
        Ok(())
    }

    async fn set_custom_message(&self, zone_id: i64, message: Option<&str>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE status_zone SET custom_message = ? WHERE id = ?",
            params![message.map(|text| truncate_chars(text, MAX_CUSTOM_MESSAGE_CHARS)), zone_id],
        )
        .await?;
        Ok(())
    }

    async fn upsert_auxiliary_status(
        &self,
        kind: SourceKind,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO auxiliary_status (kind, status_message, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(kind) DO UPDATE SET status_message = excluded.status_message, \
             updated_at = excluded.updated_at",
            params![
                kind.ordinal(),
                truncate_chars(text, MAX_PERSISTED_STATUS_CHARS),
                ZoneRecord::timestamp_to_i64(now)
            ],
        )
        .await?;
        Ok(())
    }

    async fn fresh_auxiliary_status(
        &self,
        kind: SourceKind,
        now: DateTime<Utc>,
    ) -> Result<Option<AuxiliaryStatus>> {
        let conn = self.get_conn().await?;
        let cutoff = ZoneRecord::timestamp_to_i64(now) - AUXILIARY_FRESHNESS_SECONDS;
        let mut rows = conn
            .query(
                "SELECT status_message, updated_at FROM auxiliary_status WHERE kind = ? AND updated_at > ?",
                params![kind.ordinal(), cutoff],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let text: String = row.get(0)?;
        let updated_at: i64 = row.get(1)?;
        Ok(ZoneRecord::i64_to_timestamp(updated_at).map(|updated_at| AuxiliaryStatus {
            kind,
            text,
            updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::state::RestartGrace;
    use crate::monitoring::types::ProbeOutcome;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    async fn create_test_store() -> (DatabaseImpl, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let pool = crate::pool::open_pool(&temp_dir.path().join("zone.db")).await.unwrap();
        let conn = pool.get().await.unwrap();
        crate::database::initialize_database(&conn).await.unwrap();
        drop(conn);
        (DatabaseImpl::new_from_pool(pool), temp_dir)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_zone_is_created_lazily_with_defaults() {
        let (store, _dir) = create_test_store().await;

        let zone = store.load_or_create_zone().await.unwrap();
        assert_eq!(zone.max_players, 64);
        assert_eq!(zone.last_status, ServerState::Unknown);
        assert_eq!(zone.status_message_id, None);
        assert!(!zone.is_offline_twice);
        assert!(!zone.skipped_message_edit);

        let again = store.load_or_create_zone().await.unwrap();
        assert_eq!(again.id, zone.id);
    }

    #[tokio::test]
    async fn test_server_status_round_trips() {
        let (store, _dir) = create_test_store().await;
        let zone = store.load_or_create_zone().await.unwrap();

        let mut status = zone.server_status(RestartGrace::default());
        status.observe(ProbeOutcome::Success(17), at(0));
        status.observe(ProbeOutcome::Timeout, at(10));
        store.save_server_status(zone.id, &status).await.unwrap();

        let reloaded = store.load_or_create_zone().await.unwrap();
        assert_eq!(reloaded.last_status, ServerState::NotReachable);
        assert_eq!(reloaded.players, 17);
        assert_eq!(reloaded.last_online, Some(at(0)));
        assert_eq!(reloaded.last_offline, None);
        assert!(reloaded.is_offline_twice);
        assert_eq!(reloaded.server_status(RestartGrace::default()), status);
    }

    #[tokio::test]
    async fn test_field_writes() {
        let (store, _dir) = create_test_store().await;
        let zone = store.load_or_create_zone().await.unwrap();

        store.set_status_message_id(zone.id, Some(MessageId(1_234_567_890_123_456_789))).await.unwrap();
        store.set_skipped_message_edit(zone.id, true).await.unwrap();
        store.set_next_restart_at(zone.id, Some(at(300))).await.unwrap();
        store.set_max_players(zone.id, 128, at(5)).await.unwrap();
        store.set_custom_message(zone.id, Some(&"a".repeat(1500))).await.unwrap();

        let zone = store.load_or_create_zone().await.unwrap();
        assert_eq!(zone.status_message_id, Some(MessageId(1_234_567_890_123_456_789)));
        assert!(zone.skipped_message_edit);
        assert_eq!(zone.next_restart_at, Some(at(300)));
        assert_eq!(zone.max_players, 128);
        assert_eq!(zone.max_players_last_updated, Some(at(5)));
        assert_eq!(zone.custom_message.map(|m| m.len()), Some(MAX_CUSTOM_MESSAGE_CHARS));

        store.set_status_message_id(zone.id, None).await.unwrap();
        store.set_custom_message(zone.id, None).await.unwrap();
        let zone = store.load_or_create_zone().await.unwrap();
        assert_eq!(zone.status_message_id, None);
        assert_eq!(zone.custom_message, None);
    }

    #[tokio::test]
    async fn test_auxiliary_status_upsert_and_freshness() {
        let (store, _dir) = create_test_store().await;

        assert!(store.fresh_auxiliary_status(SourceKind::Official, at(0)).await.unwrap().is_none());

        store.upsert_auxiliary_status(SourceKind::Official, "Minor Service Outage", at(0)).await.unwrap();
        store.upsert_auxiliary_status(SourceKind::Official, &"y".repeat(300), at(10)).await.unwrap();
        store.upsert_auxiliary_status(SourceKind::Community, "no data", at(10)).await.unwrap();

        let official =
            store.fresh_auxiliary_status(SourceKind::Official, at(60)).await.unwrap().unwrap();
        assert_eq!(official.text.len(), MAX_PERSISTED_STATUS_CHARS);
        assert_eq!(official.updated_at, at(10));

        let community =
            store.fresh_auxiliary_status(SourceKind::Community, at(60)).await.unwrap().unwrap();
        assert_eq!(community.text, "no data");

        let stale = at(10) + Duration::seconds(AUXILIARY_FRESHNESS_SECONDS);
        assert!(store.fresh_auxiliary_status(SourceKind::Official, stale).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_fail() {
        let (store, _dir) = create_test_store().await;
        let store = std::sync::Arc::new(store);
        let zone_id = store.load_or_create_zone().await.unwrap().id;

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.set_skipped_message_edit(zone_id, i % 4 == 0).await
                } else {
                    store.upsert_auxiliary_status(SourceKind::Community, "no data", at(i)).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::checker::Checker;
use super::sources::SourceKind;
use super::state::{Effect, RestartGrace, ServerStatus, Transition};
use crate::config::PresentationConfig;
use crate::database::ZoneStore;
use crate::database::models::ZoneRecord;
use crate::discord::{MessageHandle, MessageSync, SyncOutcome};
use crate::render::{Snapshot, render};

/// In-memory zone shared by the loops
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: i64,
    pub status: ServerStatus,
    pub max_players: u32,
    pub custom_message: Option<String>,
}

impl Zone {
    pub fn from_record(record: &ZoneRecord, grace: RestartGrace) -> Self {
        Self {
            id: record.id,
            status: record.server_status(grace),
            max_players: record.max_players,
            custom_message: record.custom_message.clone(),
        }
    }
}

pub type SharedZone = Arc<Mutex<Zone>>;

/// Result of one reconciliation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub transition: Transition,
    pub sync: SyncOutcome,
}

/// Runs the primary loop body: probe, update the state machine, render and
/// sync the status message.
///
/// The executor is the only owner of the message handle.
pub struct StatusExecutor {
    checker: Arc<dyn Checker>,
    store: Arc<dyn ZoneStore>,
    sync: MessageSync,
    presentation: PresentationConfig,
    zone: SharedZone,
    handle: MessageHandle,
    probe_timeout_seconds: u64,
}

impl StatusExecutor {
    pub fn new(
        checker: Arc<dyn Checker>,
        store: Arc<dyn ZoneStore>,
        sync: MessageSync,
        presentation: PresentationConfig,
        zone: SharedZone,
        handle: MessageHandle,
    ) -> Self {
        Self { checker, store, sync, presentation, zone, handle, probe_timeout_seconds: 0 }
    }

    /// Mention the probe timeout when the server does not answer
    pub fn with_probe_timeout(mut self, seconds: u64) -> Self {
        self.probe_timeout_seconds = seconds;
        self
    }

    pub fn handle(&self) -> MessageHandle {
        self.handle
    }

    /// Probe the server and publish the resulting status
    pub async fn tick(&mut self) -> TickReport {
        let outcome = self.checker.check().await;
        let now = Utc::now();

        // Saved under the zone lock so a concurrent manual restart cannot be
        // overwritten by this older observation.
        let transition = {
            let mut zone = self.zone.lock().await;
            let transition = zone.status.observe(outcome, now);
            if transition.effect != Effect::Ignored {
                if let Err(e) = self.store.save_server_status(zone.id, &zone.status).await {
                    warn!("Failed to persist server status: {e:#}");
                }
            }
            transition
        };

        if transition.is_state_change() {
            info!("Server went {} -> {} ({outcome})", transition.from, transition.to);
        } else {
            debug!("Probe: {outcome}, state {} ({:?})", transition.to, transition.effect);
        }

        let sync = self.publish(now).await;
        TickReport { transition, sync }
    }

    /// Re-render and sync without probing, after a manual event
    pub async fn refresh(&mut self) -> SyncOutcome {
        self.publish(Utc::now()).await
    }

    async fn publish(&mut self, now: DateTime<Utc>) -> SyncOutcome {
        let snapshot = {
            let zone = self.zone.lock().await;
            Snapshot::capture(&zone.status, zone.max_players, zone.custom_message.clone(), now)
        };
        let snapshot = snapshot
            .with_auxiliary(
                fresh_status_text(self.store.as_ref(), SourceKind::Official, now).await,
                fresh_status_text(self.store.as_ref(), SourceKind::Community, now).await,
            )
            .with_probe_timeout(self.probe_timeout_seconds);

        let body = render(&snapshot, &self.presentation, now);
        let (handle, outcome) = self.sync.sync(&body, self.handle).await;
        self.persist_handle(handle).await;
        outcome
    }

    /// Write only the handle fields that changed
    async fn persist_handle(&mut self, handle: MessageHandle) {
        let previous = std::mem::replace(&mut self.handle, handle);
        let zone_id = self.zone.lock().await.id;

        if previous.message_id != handle.message_id {
            if let Err(e) = self.store.set_status_message_id(zone_id, handle.message_id).await {
                warn!("Failed to persist status message id: {e:#}");
            }
        }
        if previous.edit != handle.edit {
            let skipped = handle.edit == crate::discord::EditDebounce::Skipped;
            if let Err(e) = self.store.set_skipped_message_edit(zone_id, skipped).await {
                warn!("Failed to persist edit debounce: {e:#}");
            }
        }
    }
}

/// Text of a source's status if it is fresh; read failures count as absent
pub async fn fresh_status_text(
    store: &dyn ZoneStore,
    kind: SourceKind,
    now: DateTime<Utc>,
) -> Option<String> {
    match store.fresh_auxiliary_status(kind, now).await {
        Ok(status) => status.map(|status| status.text),
        Err(e) => {
            warn!("Failed to read {kind} status: {e:#}");
            None
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use super::checker::HttpChecker;
use super::executor::{SharedZone, StatusExecutor, fresh_status_text};
use super::sources::{SourceFetcher, SourceKind, StatusSource};
use crate::config::PresentationConfig;
use crate::database::ZoneStore;
use crate::discord::{Announcement, AnnouncementWatcher, CommandWatcher};
use crate::render::render_fivem_status;

/// Spawns and owns the periodic tasks of the service
pub struct MonitoringScheduler {
    store: Arc<dyn ZoneStore>,
    zone: SharedZone,
    /// Wakes the status loop for a render-only tick
    refresh: Arc<Notify>,
    handles: Vec<JoinHandle<()>>,
}

impl MonitoringScheduler {
    pub fn new(store: Arc<dyn ZoneStore>, zone: SharedZone) -> Self {
        Self { store, zone, refresh: Arc::new(Notify::new()), handles: Vec::new() }
    }

    /// Probe, reconcile and sync every `period`, and whenever a manual
    /// event requests a refresh.
    pub fn spawn_status_loop(&mut self, mut executor: StatusExecutor, period: Duration) {
        let refresh = self.refresh.clone();

        self.handles.push(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let report = executor.tick().await;
                        debug!("Status tick: {} -> {:?}", report.transition.to, report.sync);
                    }
                    _ = refresh.notified() => {
                        let outcome = executor.refresh().await;
                        debug!("Status refresh: {outcome:?}");
                    }
                }
            }
        }));
    }

    /// Poll the auxiliary sources every `base` plus up to `jitter` seconds
    pub fn spawn_source_loop(
        &mut self,
        fetcher: Arc<SourceFetcher>,
        sources: Vec<StatusSource>,
        base: Duration,
        jitter: Duration,
    ) {
        let store = self.store.clone();

        self.handles.push(tokio::spawn(async move {
            loop {
                for source in &sources {
                    let text = match fetcher.fetch(source).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to fetch {} from {}: {e}", source.kind, source.url());
                            e.canonical().to_string()
                        }
                    };
                    debug!("{}: {text}", source.kind);

                    if let Err(e) = store.upsert_auxiliary_status(source.kind, &text, Utc::now()).await {
                        warn!("Failed to persist {} status: {e:#}", source.kind);
                    }
                }

                sleep(jittered(base, jitter)).await;
            }
        }));
    }

    /// Refresh the player limit from `info.json` now and every `period`
    pub fn spawn_max_players_loop(&mut self, checker: Arc<HttpChecker>, period: Duration) {
        let store = self.store.clone();
        let zone = self.zone.clone();

        self.handles.push(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let max_players = match checker.fetch_max_players().await {
                    Ok(max_players) => max_players,
                    Err(e) => {
                        warn!("Failed to refresh max players: {e:#}");
                        continue;
                    }
                };

                let zone_id = {
                    let mut zone = zone.lock().await;
                    zone.max_players = max_players;
                    zone.id
                };
                info!("Max players is {max_players}");
                if let Err(e) = store.set_max_players(zone_id, max_players, Utc::now()).await {
                    warn!("Failed to persist max players: {e:#}");
                }
            }
        }));
    }

    /// Apply restart announcements from a watched channel
    pub fn spawn_announcement_loop(&mut self, mut watcher: AnnouncementWatcher, period: Duration) {
        let store = self.store.clone();
        let zone = self.zone.clone();
        let refresh = self.refresh.clone();

        self.handles.push(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let announcements = match watcher.poll().await {
                    Ok(announcements) => announcements,
                    Err(e) => {
                        warn!("Failed to read announcements: {e}");
                        continue;
                    }
                };

                for announcement in announcements {
                    apply_announcement(announcement, &zone, store.as_ref(), &refresh).await;
                }
            }
        }));
    }

    /// Answer status requests posted in a watched channel
    pub fn spawn_command_loop(
        &mut self,
        mut watcher: CommandWatcher,
        presentation: PresentationConfig,
        period: Duration,
    ) {
        let store = self.store.clone();

        self.handles.push(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let requests = match watcher.poll().await {
                    Ok(requests) => requests,
                    Err(e) => {
                        warn!("Failed to read status requests: {e}");
                        continue;
                    }
                };

                for _ in 0..requests {
                    answer_request(&watcher, store.as_ref(), &presentation).await;
                }
            }
        }));
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Abort every spawned task
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for MonitoringScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) async fn apply_announcement(
    announcement: Announcement,
    zone: &SharedZone,
    store: &dyn ZoneStore,
    refresh: &Notify,
) {
    let now = Utc::now();
    let mut zone = zone.lock().await;

    match announcement {
        Announcement::RestartingNow => {
            zone.status.set_restarting(now);
            info!("Restart announced, server is restarting");
            if let Err(e) = store.save_server_status(zone.id, &zone.status).await {
                warn!("Failed to persist restart: {e:#}");
            }
            refresh.notify_one();
        }
        Announcement::RestartSoon(lead) => {
            let at = now + lead;
            zone.status.announce_restart_at(at);
            info!("Restart announced for {at}");
            if let Err(e) = store.set_next_restart_at(zone.id, Some(at)).await {
                warn!("Failed to persist restart time: {e:#}");
            }
        }
    }
}

async fn answer_request(
    watcher: &CommandWatcher,
    store: &dyn ZoneStore,
    presentation: &PresentationConfig,
) {
    let now = Utc::now();
    let official = fresh_status_text(store, SourceKind::Official, now).await;
    let community = fresh_status_text(store, SourceKind::Community, now).await;
    let body = render_fivem_status(official.as_deref(), community.as_deref(), presentation, now);

    match watcher.reply(&body).await {
        Ok(id) => debug!("Answered status request with message {id}"),
        Err(e) => warn!("Failed to answer status request: {e}"),
    }
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
    base + Duration::from_millis(extra)
}

//! Server state machine.
//!
//! Turns noisy probe outcomes into a stable [`ServerState`] with debounced
//! uptime/downtime anchors. A single failed probe never resets the uptime
//! anchor; only a second consecutive failure commits `last_offline_at`.
//!
//! Offline debounce transitions:
//!
//! | current | probe     | next  | effect                          |
//! |---------|-----------|-------|---------------------------------|
//! | Clear   | success   | Clear | `last_online_at = now`          |
//! | Clear   | failure   | Armed | anchors untouched               |
//! | Armed   | failure   | Armed | `last_offline_at = now`         |
//! | Armed   | success   | Clear | `last_online_at = now`          |
//! | any     | restart   | Clear | both anchors `= now`            |

use chrono::{DateTime, Duration, Utc};

use super::types::{ProbeOutcome, ServerState};
use crate::clock::elapsed_seconds;

/// Whether one failure has already been seen since the last success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfflineDebounce {
    #[default]
    Clear,
    Armed,
}

impl OfflineDebounce {
    pub fn is_armed(self) -> bool {
        self == OfflineDebounce::Armed
    }
}

impl From<bool> for OfflineDebounce {
    fn from(armed: bool) -> Self {
        if armed { OfflineDebounce::Armed } else { OfflineDebounce::Clear }
    }
}

/// Window around an announced restart in which probes are ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartGrace {
    pub before: Duration,
    pub after: Duration,
}

impl RestartGrace {
    pub fn from_seconds(before: u64, after: u64) -> Self {
        Self { before: Duration::seconds(before as i64), after: Duration::seconds(after as i64) }
    }

    fn contains(&self, restart_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        restart_at - self.before <= now && now <= restart_at + self.after
    }
}

impl Default for RestartGrace {
    fn default() -> Self {
        Self::from_seconds(6, 16)
    }
}

/// What an `observe` or manual event did to the status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Inside the restart grace window, nothing changed
    Ignored,
    CameOnline,
    /// First failure, debounce armed and anchors left alone
    FailureDebounced,
    /// Consecutive failure, `last_offline_at` moved to now
    DowntimeCommitted,
    ManualRestart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ServerState,
    pub to: ServerState,
    pub effect: Effect,
}

impl Transition {
    pub fn is_state_change(&self) -> bool {
        self.from != self.to
    }
}

/// Live status of the monitored server
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerStatus {
    state: ServerState,
    players: u32,
    last_online_at: Option<DateTime<Utc>>,
    last_offline_at: Option<DateTime<Utc>>,
    next_restart_at: Option<DateTime<Utc>>,
    offline_debounce: OfflineDebounce,
    grace: RestartGrace,
}

impl ServerStatus {
    /// Rebuild a status from persisted fields
    pub fn restore(
        state: ServerState,
        players: u32,
        last_online_at: Option<DateTime<Utc>>,
        last_offline_at: Option<DateTime<Utc>>,
        next_restart_at: Option<DateTime<Utc>>,
        offline_debounce: OfflineDebounce,
    ) -> Self {
        Self {
            state,
            players,
            last_online_at,
            last_offline_at,
            next_restart_at,
            offline_debounce,
            grace: RestartGrace::default(),
        }
    }

    pub fn with_grace(mut self, grace: RestartGrace) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Last observed player count, stale outside `Online`
    pub fn players(&self) -> u32 {
        self.players
    }

    pub fn last_online_at(&self) -> Option<DateTime<Utc>> {
        self.last_online_at
    }

    pub fn last_offline_at(&self) -> Option<DateTime<Utc>> {
        self.last_offline_at
    }

    pub fn next_restart_at(&self) -> Option<DateTime<Utc>> {
        self.next_restart_at
    }

    pub fn offline_debounce(&self) -> OfflineDebounce {
        self.offline_debounce
    }

    /// Apply one probe outcome.
    pub fn observe(&mut self, outcome: ProbeOutcome, now: DateTime<Utc>) -> Transition {
        let from = self.state;

        if self.in_restart_grace(now) {
            return Transition { from, to: from, effect: Effect::Ignored };
        }

        let effect = match outcome {
            ProbeOutcome::Success(players) => {
                self.state = ServerState::Online;
                self.players = players;
                self.last_online_at = Some(now);
                self.offline_debounce = OfflineDebounce::Clear;
                Effect::CameOnline
            }
            ProbeOutcome::Timeout | ProbeOutcome::InvalidEndpoint => {
                self.fail(ServerState::NotReachable, now)
            }
            ProbeOutcome::MalformedResponse => self.fail(ServerState::Error, now),
            ProbeOutcome::OtherFailure => self.fail(ServerState::Offline, now),
        };

        Transition { from, to: self.state, effect }
    }

    fn fail(&mut self, state: ServerState, now: DateTime<Utc>) -> Effect {
        self.state = state;
        match self.offline_debounce {
            OfflineDebounce::Armed => {
                self.last_offline_at = Some(now);
                Effect::DowntimeCommitted
            }
            OfflineDebounce::Clear => {
                self.offline_debounce = OfflineDebounce::Armed;
                Effect::FailureDebounced
            }
        }
    }

    /// Manual override: the server announced that it is restarting right now.
    pub fn set_restarting(&mut self, now: DateTime<Utc>) -> Transition {
        let from = self.state;
        self.state = ServerState::Restarting;
        self.last_online_at = Some(now);
        self.last_offline_at = Some(now);
        self.offline_debounce = OfflineDebounce::Clear;
        Transition { from, to: self.state, effect: Effect::ManualRestart }
    }

    pub fn announce_restart_at(&mut self, at: DateTime<Utc>) {
        self.next_restart_at = Some(at);
    }

    /// True while a manual restart should win over probe results
    pub fn in_restart_grace(&self, now: DateTime<Utc>) -> bool {
        self.state == ServerState::Restarting
            && self.next_restart_at.is_some_and(|at| self.grace.contains(at, now))
    }

    /// Seconds since the server was last seen going offline.
    ///
    /// Uptime is anchored on `last_offline_at` and downtime on
    /// `last_online_at`; the pairing looks inverted but is what the status
    /// message has always shown.
    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> u64 {
        elapsed_seconds(self.last_offline_at, now)
    }

    /// Seconds since the server was last seen online
    pub fn downtime_seconds(&self, now: DateTime<Utc>) -> u64 {
        elapsed_seconds(self.last_online_at, now)
    }
}

/// Monitoring engine module - probes the game server and its status sources
///
/// This module is responsible for:
/// - Probing `players.json` and classifying the outcome
/// - The server state machine with its failure debounce
/// - Fetching the auxiliary status sources
/// - Scheduling the periodic loops
pub mod checker;
pub mod executor;
pub mod indicator;
pub mod scheduler;
pub mod sources;
pub mod state;
pub mod types;
pub mod useragent;

pub use executor::{SharedZone, StatusExecutor, Zone};
pub use scheduler::MonitoringScheduler;
pub use types::{ProbeOutcome, ServerState};

//! Process-wide tracing setup shared by the zonewatch binaries.

mod subscriber;

pub use subscriber::init_tracing;

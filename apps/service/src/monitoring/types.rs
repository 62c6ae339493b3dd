/// Observed state of the monitored game server
///
/// The discriminants are the ordinals persisted in `status_zone.last_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerState {
    #[default]
    Unknown = 1,
    Online = 2,
    Restarting = 3,
    Offline = 4,
    NotReachable = 5,
    Error = 6,
}

impl ServerState {
    pub const ALL: [ServerState; 6] = [
        ServerState::Unknown,
        ServerState::Online,
        ServerState::Restarting,
        ServerState::Offline,
        ServerState::NotReachable,
        ServerState::Error,
    ];

    pub fn ordinal(self) -> i64 {
        self as i64
    }

    /// Unrecognised ordinals decode as `Unknown`.
    pub fn from_ordinal(ordinal: i64) -> Self {
        Self::ALL.into_iter().find(|state| state.ordinal() == ordinal).unwrap_or_default()
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Unknown => write!(f, "unknown"),
            ServerState::Online => write!(f, "online"),
            ServerState::Restarting => write!(f, "restarting"),
            ServerState::Offline => write!(f, "offline"),
            ServerState::NotReachable => write!(f, "not reachable"),
            ServerState::Error => write!(f, "error"),
        }
    }
}

/// Result of one probe against the server's `players.json`
///
/// Every way a probe can go wrong has a variant here, so nothing below the
/// probe ever needs to inspect error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered with a JSON array of this many players
    Success(u32),
    /// No response within the probe timeout
    Timeout,
    /// The address could not be resolved or is not a valid URL
    InvalidEndpoint,
    /// 2xx response whose body is not a JSON array
    MalformedResponse,
    /// Anything else: non-2xx status, refused connection, broken transfer
    OtherFailure,
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Success(players) => write!(f, "success ({players} players)"),
            ProbeOutcome::Timeout => write!(f, "timeout"),
            ProbeOutcome::InvalidEndpoint => write!(f, "invalid endpoint"),
            ProbeOutcome::MalformedResponse => write!(f, "malformed response"),
            ProbeOutcome::OtherFailure => write!(f, "failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        assert_eq!(ServerState::Unknown.ordinal(), 1);
        assert_eq!(ServerState::Error.ordinal(), 6);
        for state in ServerState::ALL {
            assert_eq!(ServerState::from_ordinal(state.ordinal()), state);
        }
        assert_eq!(ServerState::from_ordinal(0), ServerState::Unknown);
        assert_eq!(ServerState::from_ordinal(42), ServerState::Unknown);
    }
}

//! Canonical third-party status phrases and their indicator classes.

/// Fetch failure text persisted when a source could not be reached
pub const NO_CONNECTION: &str = "no connection";
/// Fetch failure text persisted when a source answered without a status
pub const NO_DATA: &str = "no data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Operational,
    Degraded,
    Outage,
    NoConnection,
    NoData,
    Unknown,
}

const PHRASES: &[(&str, Indicator)] = &[
    (NO_CONNECTION, Indicator::NoConnection),
    (NO_DATA, Indicator::NoData),
    ("all systems operational", Indicator::Operational),
    ("partial system outage", Indicator::Outage),
    ("major system outage", Indicator::Outage),
    ("minor service outage", Indicator::Degraded),
    ("partially degraded service", Indicator::Degraded),
    ("nutzerberichte zeigen keine aktuellen probleme bei fivem", Indicator::Operational),
    ("nutzerberichte deuten auf mögliche probleme bei fivem hin", Indicator::Degraded),
    ("nutzerberichte deuten auf probleme bei fivem hin", Indicator::Outage),
];

impl Indicator {
    /// Classify a status text, case-insensitively.
    pub fn classify(text: &str) -> Self {
        let lowered = text.trim().to_lowercase();
        PHRASES
            .iter()
            .find(|(phrase, _)| *phrase == lowered)
            .map(|(_, indicator)| *indicator)
            .unwrap_or(Indicator::Unknown)
    }

    /// Discord emoji shortcode shown next to the status
    pub fn emoji(self) -> &'static str {
        match self {
            Indicator::Operational => ":green_circle:",
            Indicator::Degraded => ":orange_circle:",
            Indicator::Outage => ":red_circle:",
            Indicator::NoConnection | Indicator::NoData => ":grey_question:",
            Indicator::Unknown => ":black_circle:",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_phrase_maps_to_its_indicator() {
        for (phrase, indicator) in PHRASES {
            assert_eq!(Indicator::classify(phrase), *indicator, "{phrase}");
            assert_eq!(Indicator::classify(&phrase.to_uppercase()), *indicator, "{phrase}");
            assert_eq!(Indicator::classify(&format!("  {phrase}\n")), *indicator, "{phrase}");
        }
    }

    #[test]
    fn test_unrecognised_text_is_unknown() {
        for text in ["", "all systems", "Service Under Maintenance", "no connection!"] {
            assert_eq!(Indicator::classify(text), Indicator::Unknown, "{text}");
        }
    }

    #[test]
    fn test_emoji() {
        assert_eq!(Indicator::classify("All Systems Operational").emoji(), ":green_circle:");
        assert_eq!(Indicator::classify("no data").emoji(), ":grey_question:");
        assert_eq!(Indicator::Unknown.emoji(), ":black_circle:");
    }
}

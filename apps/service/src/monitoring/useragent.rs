use std::path::Path;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;

const FALLBACK_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

const BUILTIN_AGENTS: &[&str] = &[
    FALLBACK_AGENT,
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) \
     Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/125.0.0.0 Safari/537.36 Edg/125.0.0.0",
];

/// Pool of browser user-agents, one picked at random per request
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn builtin() -> Self {
        Self { agents: BUILTIN_AGENTS.iter().map(|agent| agent.to_string()).collect() }
    }

    /// One agent per non-empty line
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read user agents from {}", path.display()))?;
        Ok(Self::from_lines(&raw))
    }

    pub fn from_lines(raw: &str) -> Self {
        let agents: Vec<String> =
            raw.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect();
        if agents.is_empty() { Self::builtin() } else { Self { agents } }
    }

    pub fn random(&self) -> &str {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_AGENT)
    }
}

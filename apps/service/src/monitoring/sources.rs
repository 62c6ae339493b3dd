//! Third-party status sources: the official status API and a community
//! outage tracker page.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;

use super::indicator::{NO_CONNECTION, NO_DATA};
use super::useragent::UserAgentPool;

/// Longest status text kept from a fetch
pub const MAX_FETCHED_CHARS: usize = 500;

/// Which auxiliary source a status belongs to
///
/// The discriminants are the `kind` column of `auxiliary_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Official = 1,
    Community = 2,
}

impl SourceKind {
    pub fn ordinal(self) -> i64 {
        self as i64
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Official => write!(f, "official status"),
            SourceKind::Community => write!(f, "community tracker"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("source answered with HTTP {0}")]
    Status(StatusCode),
    #[error("response could not be parsed: {0}")]
    Parse(String),
    #[error("response contained no status")]
    Missing,
}

impl FetchError {
    /// The canonical text persisted in place of a status.
    ///
    /// Unreachable sources and error statuses read "no connection"; a
    /// source that answered without a usable status reads "no data".
    pub fn canonical(&self) -> &'static str {
        match self {
            FetchError::Transport(_) | FetchError::Status(_) => NO_CONNECTION,
            FetchError::Parse(_) | FetchError::Missing => NO_DATA,
        }
    }
}

#[derive(Debug, Clone)]
enum Extraction {
    /// JSON pointer to a string, e.g. `/status/description`
    Json(String),
    /// Text of the first element matching a CSS selector
    Html(Selector),
}

/// One configured source
#[derive(Debug, Clone)]
pub struct StatusSource {
    pub kind: SourceKind,
    url: String,
    timeout: Duration,
    extraction: Extraction,
}

impl StatusSource {
    /// A statuspage-style JSON API (`status.description`)
    pub fn official(url: impl Into<String>, timeout_seconds: u64) -> Self {
        Self {
            kind: SourceKind::Official,
            url: url.into(),
            timeout: Duration::from_secs(timeout_seconds),
            extraction: Extraction::Json("/status/description".into()),
        }
    }

    /// An HTML page with the status text under `selector`
    pub fn community(url: impl Into<String>, selector: &str, timeout_seconds: u64) -> Result<Self> {
        let selector = Selector::parse(selector)
            .map_err(|error| anyhow!("Invalid CSS selector {selector:?}: {error}"))?;
        Ok(Self {
            kind: SourceKind::Community,
            url: url.into(),
            timeout: Duration::from_secs(timeout_seconds),
            extraction: Extraction::Html(selector),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Fetches auxiliary statuses with a random user-agent per request
pub struct SourceFetcher {
    client: reqwest::Client,
    agents: Arc<UserAgentPool>,
}

impl SourceFetcher {
    pub fn new(agents: Arc<UserAgentPool>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, agents })
    }

    /// Fetch and extract the short status text of `source`.
    pub async fn fetch(&self, source: &StatusSource) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&source.url)
            .header(USER_AGENT, self.agents.random())
            .timeout(source.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;
        let status = match &source.extraction {
            Extraction::Json(pointer) => extract_json(&body, pointer)?,
            Extraction::Html(selector) => extract_html(&body, selector)?,
        };

        Ok(truncate_chars(&status, MAX_FETCHED_CHARS))
    }
}

fn extract_json(body: &str, pointer: &str) -> Result<String, FetchError> {
    let document: Value =
        serde_json::from_str(body).map_err(|error| FetchError::Parse(error.to_string()))?;
    let status = match document.pointer(pointer) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Null) | None => return Err(FetchError::Missing),
        Some(other) => other.to_string(),
    };
    if status.is_empty() { Err(FetchError::Missing) } else { Ok(status) }
}

fn extract_html(body: &str, selector: &Selector) -> Result<String, FetchError> {
    let document = Html::parse_document(body);
    let status = document
        .select(selector)
        .next()
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if status.is_empty() { Err(FetchError::Missing) } else { Ok(status) }
}

/// Cut `text` to at most `max` characters, respecting char boundaries
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

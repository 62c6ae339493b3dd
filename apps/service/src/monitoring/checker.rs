use std::error::Error as StdError;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::types::ProbeOutcome;

/// Something that can report how many players are on the server
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform one bounded probe. Never fails: every failure is an outcome.
    async fn check(&self) -> ProbeOutcome;
}

/// Probes `http://<address>/players.json`
pub struct HttpChecker {
    client: reqwest::Client,
    address: String,
}

impl HttpChecker {
    pub fn new(address: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, address: address.into() })
    }

    fn endpoint(&self, document: &str) -> Option<Url> {
        Url::parse(&format!("http://{}/{}", self.address, document)).ok()
    }

    /// Read `vars.sv_maxClients` from the server's `info.json`.
    pub async fn fetch_max_players(&self) -> Result<u32> {
        let url = self
            .endpoint("info.json")
            .ok_or_else(|| anyhow!("Invalid server address: {}", self.address))?;

        let body: Value = self
            .client
            .get(url)
            .send()
            .await
            .context("info.json request failed")?
            .error_for_status()
            .context("info.json returned an error status")?
            .json()
            .await
            .context("info.json is not valid JSON")?;

        parse_max_players(&body)
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self) -> ProbeOutcome {
        let Some(url) = self.endpoint("players.json") else {
            return ProbeOutcome::InvalidEndpoint;
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!("players.json request failed: {error}");
                return classify_request_error(&error);
            }
        };

        if !response.status().is_success() {
            debug!("players.json answered with HTTP {}", response.status());
            return ProbeOutcome::OtherFailure;
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(error) => {
                debug!("Reading players.json failed: {error}");
                return classify_request_error(&error);
            }
        };

        count_players(&body)
    }
}

/// Map a transport error onto a probe outcome.
///
/// Refused connections mean the host is up but nothing listens, which is
/// an offline server; every other connect failure (DNS, routing) means we
/// could not reach it at all.
fn classify_request_error(error: &reqwest::Error) -> ProbeOutcome {
    if error.is_timeout() {
        ProbeOutcome::Timeout
    } else if error.is_builder() {
        ProbeOutcome::InvalidEndpoint
    } else if error.is_connect() {
        if is_connection_refused(error) {
            ProbeOutcome::OtherFailure
        } else {
            ProbeOutcome::InvalidEndpoint
        }
    } else {
        ProbeOutcome::OtherFailure
    }
}

fn is_connection_refused(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = inner.source();
    }
    false
}

fn count_players(body: &[u8]) -> ProbeOutcome {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(players)) => ProbeOutcome::Success(players.len() as u32),
        _ => ProbeOutcome::MalformedResponse,
    }
}

fn parse_max_players(info: &Value) -> Result<u32> {
    let raw = info
        .get("vars")
        .and_then(|vars| vars.get("sv_maxClients"))
        .ok_or_else(|| anyhow!("info.json has no vars.sv_maxClients"))?;

    match raw {
        Value::Number(number) => number.as_u64().map(|n| n as u32),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("vars.sv_maxClients is not a player count: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker_for(server: &MockServer, timeout_seconds: u64) -> HttpChecker {
        let address = server.uri().trim_start_matches("http://").to_string();
        HttpChecker::new(address, timeout_seconds).unwrap()
    }

    async fn serve_players(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/players.json"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_player_list_counts_players() {
        let server = serve_players(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "id": 1, "name": "a" }, { "id": 2, "name": "b" }])),
        )
        .await;

        assert_eq!(checker_for(&server, 3).check().await, ProbeOutcome::Success(2));
    }

    #[tokio::test]
    async fn test_empty_player_list_is_success() {
        let server = serve_players(ResponseTemplate::new(200).set_body_json(json!([]))).await;

        assert_eq!(checker_for(&server, 3).check().await, ProbeOutcome::Success(0));
    }

    #[tokio::test]
    async fn test_null_or_garbage_body_is_malformed() {
        for body in ["null", "{}", "", "<html>restarting</html>"] {
            let server = serve_players(ResponseTemplate::new(200).set_body_string(body)).await;
            assert_eq!(
                checker_for(&server, 3).check().await,
                ProbeOutcome::MalformedResponse,
                "body {body:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_error_status_is_other_failure() {
        let server = serve_players(ResponseTemplate::new(503)).await;

        assert_eq!(checker_for(&server, 3).check().await, ProbeOutcome::OtherFailure);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = serve_players(
            ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(3)),
        )
        .await;

        assert_eq!(checker_for(&server, 1).check().await, ProbeOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_refused_connection_is_other_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let checker = HttpChecker::new(address, 2).unwrap();
        assert_eq!(checker.check().await, ProbeOutcome::OtherFailure);
    }

    #[tokio::test]
    async fn test_invalid_address_is_invalid_endpoint() {
        let checker = HttpChecker::new("not a host:port", 2).unwrap();
        assert_eq!(checker.check().await, ProbeOutcome::InvalidEndpoint);
    }

    #[tokio::test]
    async fn test_fetch_max_players() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "vars": { "sv_maxClients": "128" } })),
            )
            .mount(&server)
            .await;

        assert_eq!(checker_for(&server, 3).fetch_max_players().await.unwrap(), 128);
    }

    #[test]
    fn test_parse_max_players_shapes() {
        assert_eq!(parse_max_players(&json!({ "vars": { "sv_maxClients": 48 } })).unwrap(), 48);
        assert!(parse_max_players(&json!({ "vars": {} })).is_err());
        assert!(parse_max_players(&json!({ "vars": { "sv_maxClients": "lots" } })).is_err());
    }
}

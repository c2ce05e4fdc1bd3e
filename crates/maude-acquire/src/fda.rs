use anyhow::{Context, Result};
use maude_model::MdrId;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// openFDA device adverse-event endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.fda.gov/device/event.json";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Ceiling for the delay set after a 429, in seconds.
const MAX_BACKOFF_SECS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// What a single lookup produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// First element of `results`.
    Found(Value),
    /// 200 with an empty or missing `results` array.
    NotFound,
    /// 429 Too Many Requests.
    RateLimited,
    /// Any other non-200 status.
    HttpError(StatusCode),
    /// Transport failure or an undecodable body.
    Failed(String),
}

/// Sequential client for the device-event API with an adaptive request delay.
///
/// The delay starts at zero (or the user's fixed value) and is raised after
/// each 429; it is never lowered again during a run. A successful lookup only
/// resets the consecutive rate-limit counter.
pub struct FdaClient {
    http: reqwest::Client,
    config: ClientConfig,
    request_delay: f64,
    rate_limit_errors: u32,
}

impl FdaClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            config,
            request_delay: 0.0,
            rate_limit_errors: 0,
        })
    }

    /// Start from a fixed delay (seconds) between requests instead of zero.
    /// Negative and non-finite values leave the delay at zero.
    pub fn with_delay(mut self, secs: f64) -> Self {
        self.request_delay = if secs.is_finite() && secs > 0.0 { secs } else { 0.0 };
        self
    }

    /// Delays too large for a `Duration` saturate.
    pub fn request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_delay).unwrap_or(Duration::MAX)
    }

    pub fn rate_limit_errors(&self) -> u32 {
        self.rate_limit_errors
    }

    pub fn search_url(&self, id: &MdrId) -> String {
        format!(
            "{}?search=mdr_report_key:{}&limit=1",
            self.config.base_url, id
        )
    }

    /// Perform one lookup without touching the delay state.
    pub async fn lookup(&self, id: &MdrId) -> FetchOutcome {
        let url = self.search_url(id);
        tracing::debug!(url = %url, "Fetching record");

        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::Failed(format!("request error: {e}")),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => classify(status, &body),
            Err(e) => FetchOutcome::Failed(format!("failed to read response body: {e}")),
        }
    }

    /// Fetch the record for `id`, updating the adaptive delay.
    ///
    /// Returns `None` for every outcome other than a found record. A 429
    /// raises the delay and sleeps for it before returning; there is no retry.
    pub async fn fetch_record(&mut self, id: &MdrId) -> Option<Value> {
        match self.lookup(id).await {
            FetchOutcome::Found(record) => {
                self.rate_limit_errors = 0;
                Some(record)
            }
            FetchOutcome::NotFound => {
                tracing::debug!(mdrfoi_id = %id, "No results found");
                None
            }
            FetchOutcome::RateLimited => {
                self.rate_limit_errors += 1;
                self.request_delay = backoff_delay(self.rate_limit_errors);
                tracing::warn!(
                    mdrfoi_id = %id,
                    consecutive = self.rate_limit_errors,
                    delay_secs = self.request_delay,
                    "Rate limited, increasing delay"
                );
                tokio::time::sleep(self.request_delay()).await;
                None
            }
            FetchOutcome::HttpError(status) => {
                tracing::warn!(mdrfoi_id = %id, status = %status, "API error");
                None
            }
            FetchOutcome::Failed(reason) => {
                tracing::warn!(mdrfoi_id = %id, reason = %reason, "Request failed");
                None
            }
        }
    }
}

/// Interpret a device-event API response.
pub fn classify(status: StatusCode, body: &str) -> FetchOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return FetchOutcome::RateLimited;
    }
    if status != StatusCode::OK {
        return FetchOutcome::HttpError(status);
    }

    let mut payload: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return FetchOutcome::Failed(format!("invalid JSON body: {e}")),
    };

    match payload.get_mut("results").and_then(Value::as_array_mut) {
        Some(results) if !results.is_empty() => FetchOutcome::Found(results.swap_remove(0)),
        _ => FetchOutcome::NotFound,
    }
}

/// Delay in seconds after the `n`th consecutive 429: `0.5 * 2^n`, capped at 2s.
pub fn backoff_delay(consecutive: u32) -> f64 {
    let exp = consecutive.min(16) as i32;
    (0.5 * 2f64.powi(exp)).min(MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned HTTP response; the handle yields the raw request head.
    async fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{addr}/device/event.json"), handle)
    }

    fn client_for(base_url: String) -> FdaClient {
        FdaClient::new(ClientConfig {
            base_url,
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    fn id(s: &str) -> MdrId {
        MdrId::new(s).unwrap()
    }

    #[test]
    fn test_search_url() {
        let client = FdaClient::new(ClientConfig::default()).unwrap();
        assert_eq!(
            client.search_url(&id("18412097")),
            "https://api.fda.gov/device/event.json?search=mdr_report_key:18412097&limit=1"
        );
    }

    #[test]
    fn test_classify_found_takes_first() {
        let body = json!({
            "meta": { "results": { "total": 2 } },
            "results": [ { "mdr_report_key": "1" }, { "mdr_report_key": "2" } ]
        })
        .to_string();
        assert_eq!(
            classify(StatusCode::OK, &body),
            FetchOutcome::Found(json!({ "mdr_report_key": "1" }))
        );
    }

    #[test]
    fn test_classify_not_found() {
        assert_eq!(classify(StatusCode::OK, r#"{"results": []}"#), FetchOutcome::NotFound);
        assert_eq!(classify(StatusCode::OK, r#"{"meta": {}}"#), FetchOutcome::NotFound);
    }

    #[test]
    fn test_classify_errors() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS, ""), FetchOutcome::RateLimited);
        assert_eq!(
            classify(StatusCode::NOT_FOUND, r#"{"error": {"code": "NOT_FOUND"}}"#),
            FetchOutcome::HttpError(StatusCode::NOT_FOUND)
        );
        assert!(matches!(classify(StatusCode::OK, "<html>"), FetchOutcome::Failed(_)));
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), 1.0);
        assert_eq!(backoff_delay(2), 2.0);
        assert_eq!(backoff_delay(3), 2.0);
        assert_eq!(backoff_delay(100), 2.0);
    }

    #[test]
    fn test_with_delay() {
        let client = FdaClient::new(ClientConfig::default()).unwrap().with_delay(0.25);
        assert_eq!(client.request_delay(), Duration::from_millis(250));
        let client = FdaClient::new(ClientConfig::default()).unwrap().with_delay(-1.0);
        assert_eq!(client.request_delay(), Duration::ZERO);
    }

    #[test]
    fn test_with_delay_out_of_range() {
        for secs in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let client = FdaClient::new(ClientConfig::default()).unwrap().with_delay(secs);
            assert_eq!(client.request_delay(), Duration::ZERO, "delay {secs}");
        }
        let client = FdaClient::new(ClientConfig::default()).unwrap().with_delay(1e20);
        assert_eq!(client.request_delay(), Duration::MAX);
    }

    #[tokio::test]
    async fn test_fetch_record_found() {
        let body = json!({ "results": [ { "mdr_report_key": "18412097", "event_type": "Injury" } ] })
            .to_string();
        let (base, server) = serve_once("200 OK", body).await;
        let mut client = client_for(base);

        let record = client.fetch_record(&id("18412097")).await.unwrap();
        assert_eq!(record["event_type"], "Injury");

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(
            request_line.contains("search=mdr_report_key:18412097&limit=1"),
            "unexpected request line: {request_line}"
        );
        assert!(request.to_lowercase().contains("user-agent: mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_fetch_record_rate_limited_raises_delay() {
        let (base, server) = serve_once("429 Too Many Requests", "{}".to_string()).await;
        let mut client = client_for(base);

        assert!(client.fetch_record(&id("1")).await.is_none());
        assert_eq!(client.rate_limit_errors(), 1);
        assert_eq!(client.request_delay(), Duration::from_secs(1));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_success_resets_counter_but_keeps_delay() {
        let mut client = client_for(String::new());
        client.rate_limit_errors = 2;
        client.request_delay = 2.0;

        let body = json!({ "results": [ { "mdr_report_key": "7" } ] }).to_string();
        let (base, server) = serve_once("200 OK", body).await;
        client.config.base_url = base;

        assert!(client.fetch_record(&id("7")).await.is_some());
        assert_eq!(client.rate_limit_errors(), 0);
        assert_eq!(client.request_delay(), Duration::from_secs(2));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_record_server_error() {
        let (base, server) = serve_once("500 Internal Server Error", "oops".to_string()).await;
        let mut client = client_for(base);

        assert!(client.fetch_record(&id("1")).await.is_none());
        assert_eq!(client.rate_limit_errors(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{addr}/device/event.json"));
        assert!(matches!(client.lookup(&id("1")).await, FetchOutcome::Failed(_)));
    }
}

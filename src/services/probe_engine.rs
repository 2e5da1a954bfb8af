//! Probe engine: performs a single HTTP or TCP observation.
//!
//! Stateless aside from pooled transports. HTTP probing walks a ladder
//! of up to three request strategies to defeat naive bot filters; TCP
//! probing is a plain connect. TLS verification is off: the engine
//! measures liveness, not trust, so a target with a broken certificate
//! still counts as reachable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProbeOutcome, ProbeResult, ReliabilityCell, Target};
use crate::domain::ports::Prober;

/// Per-attempt timeout.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);
/// Capped-GET strategy shortens the timeout to this fraction of base.
const CAPPED_GET_TIMEOUT_FACTOR: f32 = 0.8;
/// The capped-GET strategy reads at most this much body.
const MAX_BODY_BYTES: usize = 5 * 1024;
/// Redirects are followed at most this many hops.
const MAX_REDIRECTS: usize = 3;
/// Keep-alive sockets retained per host.
const POOL_MAX_IDLE_PER_HOST: usize = 50;
/// Step between attempts: attempt_number x 500ms.
const INTER_ATTEMPT_STEP: Duration = Duration::from_millis(500);
/// Default TCP port when the address omits one.
const DEFAULT_TCP_PORT: u16 = 80;

/// Realistic desktop user agents rotated by the third HTTP strategy.
const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

#[derive(Debug, Clone)]
pub struct ProbeEngineConfig {
    pub attempt_timeout: Duration,
}

impl Default for ProbeEngineConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Stateless probe engine with process-wide pooled transports.
///
/// reqwest keys its keep-alive pool by origin, so http and https
/// traffic never share sockets and cannot head-of-line block each
/// other.
pub struct ProbeEngine {
    http: Client,
    config: ProbeEngineConfig,
    ua_cursor: AtomicUsize,
}

impl ProbeEngine {
    pub fn new(config: ProbeEngineConfig) -> DomainResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .timeout(config.attempt_timeout)
            .build()
            .map_err(|e| DomainError::Storage(format!("http client: {e}")))?;

        Ok(Self {
            http,
            config,
            ua_cursor: AtomicUsize::new(0),
        })
    }

    /// One attempt against an HTTP(S) target: walk the strategy ladder,
    /// stopping at the first success.
    async fn http_attempt(&self, url: &str, threshold_ms: i64) -> ProbeOutcome {
        let mut last_reason = String::from("no strategy succeeded");

        for strategy in [
            HttpStrategy::Head,
            HttpStrategy::CappedGet,
            HttpStrategy::BrowserGet,
        ] {
            match self.run_strategy(strategy, url).await {
                Ok((status, latency_ms)) => {
                    if classify_http_status(status) {
                        return ProbeOutcome::up(latency_ms, threshold_ms);
                    }
                    last_reason = format!("HTTP {}", status.as_u16());
                }
                Err(reason) => {
                    last_reason = reason;
                }
            }
        }

        ProbeOutcome::Down {
            reason: last_reason,
        }
    }

    /// Issue one request and return `(status, latency)`. Latency is
    /// measured from first byte sent to the status decision.
    async fn run_strategy(
        &self,
        strategy: HttpStrategy,
        url: &str,
    ) -> Result<(StatusCode, i64), String> {
        let (method, headers, timeout) = match strategy {
            HttpStrategy::Head => (Method::HEAD, minimal_headers(), self.config.attempt_timeout),
            HttpStrategy::CappedGet => (
                Method::GET,
                minimal_headers(),
                self.config.attempt_timeout.mul_f32(CAPPED_GET_TIMEOUT_FACTOR),
            ),
            HttpStrategy::BrowserGet => {
                let ua = USER_AGENTS[self.ua_cursor.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len()];
                (Method::GET, browser_headers(ua), self.config.attempt_timeout)
            }
        };

        let started = Instant::now();
        let response = self
            .http
            .request(method, url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| probe_error_reason(&e))?;

        let status = response.status();
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        if strategy != HttpStrategy::Head {
            drain_capped(response).await;
        }

        Ok((status, latency_ms))
    }

    /// One attempt against a TCP target: a three-way handshake.
    async fn tcp_attempt(&self, host: &str, port: u16, threshold_ms: i64) -> ProbeOutcome {
        let started = Instant::now();
        let connect = tokio::net::TcpStream::connect((host, port));
        match tokio::time::timeout(self.config.attempt_timeout, connect).await {
            Ok(Ok(stream)) => {
                let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
                drop(stream);
                ProbeOutcome::up(latency_ms, threshold_ms)
            }
            Ok(Err(e)) => ProbeOutcome::Down {
                reason: format!("connect failed: {e}"),
            },
            Err(_) => ProbeOutcome::Down {
                reason: format!(
                    "connect timed out after {}s",
                    self.config.attempt_timeout.as_secs()
                ),
            },
        }
    }
}

#[async_trait]
impl Prober for ProbeEngine {
    #[instrument(skip(self, target, reliability), fields(target_id = %target.id))]
    async fn probe(&self, target: &Target, reliability: &ReliabilityCell) -> ProbeResult {
        let threshold_ms = target.response_threshold_ms();

        // Malformed addresses short-circuit: no retries will fix them.
        let plan = match ProbePlan::for_target(target) {
            Ok(plan) => plan,
            Err(e) => {
                return ProbeResult::new(
                    ProbeOutcome::Down {
                        reason: e.to_string(),
                    },
                    1,
                );
            }
        };

        let budget: u32 = if reliability.high_failure() { 3 } else { 2 };

        let mut outcome = ProbeOutcome::Down {
            reason: "not attempted".into(),
        };
        for attempt in 1..=budget {
            outcome = match &plan {
                ProbePlan::Http { url } => self.http_attempt(url, threshold_ms).await,
                ProbePlan::Tcp { host, port } => self.tcp_attempt(host, *port, threshold_ms).await,
            };

            if outcome.status() == crate::domain::models::TargetStatus::Up {
                return ProbeResult::new(outcome, attempt);
            }

            debug!(attempt, budget, "probe attempt failed");
            if attempt < budget {
                tokio::time::sleep(INTER_ATTEMPT_STEP * attempt).await;
            }
        }

        ProbeResult::new(outcome, budget)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpStrategy {
    Head,
    CappedGet,
    BrowserGet,
}

/// Resolved probing plan for a target address.
enum ProbePlan {
    Http { url: String },
    Tcp { host: String, port: u16 },
}

impl ProbePlan {
    fn for_target(target: &Target) -> DomainResult<Self> {
        if target.kind.is_http() {
            Ok(Self::Http {
                url: ensure_scheme(&target.address),
            })
        } else {
            let (host, port) = parse_host_port(&target.address)?;
            Ok(Self::Tcp { host, port })
        }
    }
}

/// Prepend `https://` when the address carries no scheme.
pub fn ensure_scheme(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{address}")
    }
}

/// Parse `host[:port]`, defaulting the port to 80.
pub fn parse_host_port(address: &str) -> DomainResult<(String, u16)> {
    let mut parts = address.splitn(2, ':');
    let host = parts.next().unwrap_or("").trim();
    if host.is_empty() {
        return Err(DomainError::InvalidAddress(format!(
            "missing host in {address}"
        )));
    }

    let port = match parts.next() {
        None => DEFAULT_TCP_PORT,
        Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
            DomainError::InvalidAddress(format!("invalid port in {address}"))
        })?,
    };

    Ok((host.to_string(), port))
}

/// Response statuses that count as "up". A 401/403/405/429 target is
/// responding; it is merely refusing us.
pub fn classify_http_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    (200..400).contains(&code) || matches!(code, 401 | 403 | 405 | 429)
}

fn minimal_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
    );
    headers
}

/// Read at most [`MAX_BODY_BYTES`] of the response body, then drop it.
async fn drain_capped(mut response: reqwest::Response) {
    let mut read = 0usize;
    while read < MAX_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => read += chunk.len(),
            Ok(None) | Err(_) => break,
        }
    }
}

fn probe_error_reason(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        MonitoringConfig, NewTarget, OwnerPlan, OwnerRole, TargetKind, TargetStatus, UserPriority,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn target(address: &str, kind: TargetKind) -> Target {
        Target::new(
            NewTarget {
                name: "probe-test".into(),
                address: address.into(),
                kind,
                owner_id: Uuid::new_v4(),
                owner_plan: OwnerPlan::Premium,
                owner_role: OwnerRole::User,
                priority: UserPriority::Medium,
                monitoring: MonitoringConfig::default(),
                contact_emails: vec![],
                contact_phones: vec![],
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn engine() -> ProbeEngine {
        ProbeEngine::new(ProbeEngineConfig {
            attempt_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn scheme_is_prepended_when_missing() {
        assert_eq!(ensure_scheme("example.com"), "https://example.com");
        assert_eq!(ensure_scheme("http://example.com"), "http://example.com");
        assert_eq!(ensure_scheme("https://example.com"), "https://example.com");
    }

    #[test]
    fn host_port_parsing() {
        assert_eq!(
            parse_host_port("db.internal:5432").unwrap(),
            ("db.internal".into(), 5432)
        );
        assert_eq!(parse_host_port("example.com").unwrap(), ("example.com".into(), 80));
        assert!(parse_host_port(":9000").is_err());
        assert!(parse_host_port("host:notaport").is_err());
    }

    #[test]
    fn status_classification() {
        assert!(classify_http_status(StatusCode::OK));
        assert!(classify_http_status(StatusCode::MOVED_PERMANENTLY));
        assert!(classify_http_status(StatusCode::UNAUTHORIZED));
        assert!(classify_http_status(StatusCode::FORBIDDEN));
        assert!(classify_http_status(StatusCode::METHOD_NOT_ALLOWED));
        assert!(classify_http_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!classify_http_status(StatusCode::NOT_FOUND));
        assert!(!classify_http_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!classify_http_status(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn head_success_is_up() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/")
            .with_status(200)
            .create_async()
            .await;

        let engine = engine();
        let target = target(&server.url(), TargetKind::Website);
        let result = engine.probe(&target, &ReliabilityCell::zero(Utc::now())).await;

        assert_eq!(result.outcome.status(), TargetStatus::Up);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn ladder_falls_back_to_get_when_head_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body("ok")
            .expect_at_least(1)
            .create_async()
            .await;

        let engine = engine();
        let target = target(&server.url(), TargetKind::Api);
        let result = engine.probe(&target, &ReliabilityCell::zero(Utc::now())).await;

        assert_eq!(result.outcome.status(), TargetStatus::Up);
    }

    #[tokio::test]
    async fn rate_limited_target_counts_as_up() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/")
            .with_status(429)
            .create_async()
            .await;

        let engine = engine();
        let target = target(&server.url(), TargetKind::Website);
        let result = engine.probe(&target, &ReliabilityCell::zero(Utc::now())).await;

        assert_eq!(result.outcome.status(), TargetStatus::Up);
    }

    #[tokio::test]
    async fn persistent_server_error_is_down_with_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let engine = engine();
        let target = target(&server.url(), TargetKind::Website);
        let result = engine.probe(&target, &ReliabilityCell::zero(Utc::now())).await;

        assert_eq!(result.outcome.status(), TargetStatus::Down);
        assert_eq!(result.attempts, 2);
        match result.outcome {
            ProbeOutcome::Down { reason } => assert_eq!(reason, "HTTP 500"),
            other => panic!("expected down, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn high_failure_rate_grants_extra_attempt() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let engine = engine();
        let target = target(&server.url(), TargetKind::Website);
        let mut cell = ReliabilityCell::zero(Utc::now());
        for _ in 0..3 {
            cell.record(false, Utc::now());
        }
        assert!(cell.high_failure());

        let result = engine.probe(&target, &cell).await;
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn tcp_connect_is_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let engine = engine();
        let target = target(&format!("127.0.0.1:{}", addr.port()), TargetKind::Tcp);
        let result = engine.probe(&target, &ReliabilityCell::zero(Utc::now())).await;

        assert_eq!(result.outcome.status(), TargetStatus::Up);
        assert!(result.outcome.latency_ms().unwrap() >= 0);
    }

    #[tokio::test]
    async fn tcp_refused_is_down() {
        // Bind then drop to obtain a port that refuses connections.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let engine = engine();
        let target = target(&format!("127.0.0.1:{port}"), TargetKind::Tcp);
        let result = engine.probe(&target, &ReliabilityCell::zero(Utc::now())).await;

        assert_eq!(result.outcome.status(), TargetStatus::Down);
    }

    #[tokio::test]
    async fn malformed_tcp_address_short_circuits() {
        let engine = engine();
        let mut t = target("db.internal:5432", TargetKind::Database);
        t.address = ":5432".into();

        let result = engine.probe(&t, &ReliabilityCell::zero(Utc::now())).await;
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome.status(), TargetStatus::Down);
    }
}

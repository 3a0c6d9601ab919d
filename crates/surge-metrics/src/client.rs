//! Prometheus instant-query client.
//!
//! Issues a single `GET /api/v1/query` per call over a short-lived
//! HTTP/1 connection and reduces the response to one scalar, or to an
//! explicit "no data yet" outcome. The query expression is opaque
//! configuration data — this client never parses or interprets it.

use std::fmt::Write as _;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http_body_util::BodyExt;
use serde::Deserialize;
use tracing::debug;

use surge_core::QueryError;

/// Outcome of a single instant query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryOutcome {
    /// The backend produced a scalar.
    Value(f64),
    /// The backend has no data for this expression yet (NaN or an
    /// empty instant vector). Distinct from a failure.
    Indeterminate,
}

/// Seam between the evaluator and the metrics backend.
///
/// Production uses `PrometheusClient`; tests substitute scripted fakes.
pub trait MetricSource {
    /// Execute one instant query.
    fn query(
        &self,
        expr: &str,
    ) -> impl Future<Output = Result<QueryOutcome, QueryError>> + Send;
}

/// HTTP client for the Prometheus instant-query API.
pub struct PrometheusClient {
    /// Backend authority ("host:port").
    authority: String,
    /// Bound on the whole connect-request-read cycle, so a hung
    /// backend cannot stall the ramp loop.
    timeout: Duration,
}

impl PrometheusClient {
    pub fn new(authority: &str, timeout: Duration) -> Self {
        Self {
            authority: authority.to_string(),
            timeout,
        }
    }

    async fn get(&self, path: &str) -> Result<String, QueryError> {
        let request = async {
            let stream = tokio::net::TcpStream::connect(&self.authority)
                .await
                .map_err(|e| {
                    QueryError::BackendUnreachable(format!("connect {}: {e}", self.authority))
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| QueryError::BackendUnreachable(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("GET")
                .uri(path)
                .header("host", &self.authority)
                .header("user-agent", "surge-metrics/0.1")
                .body(http_body_util::Empty::<bytes::Bytes>::new())
                .map_err(|e| QueryError::BackendUnreachable(format!("build request: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| QueryError::BackendUnreachable(format!("request: {e}")))?;

            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| QueryError::BackendUnreachable(format!("read body: {e}")))?
                .to_bytes();

            if !status.is_success() {
                // A non-2xx here means the backend rejected the query:
                // configuration drift, not a transient fault.
                return Err(QueryError::MalformedResponse(format!(
                    "status {status}: {}",
                    String::from_utf8_lossy(&body)
                )));
            }

            String::from_utf8(body.to_vec())
                .map_err(|e| QueryError::MalformedResponse(format!("non-utf8 body: {e}")))
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::BackendUnreachable(format!(
                "query timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

impl MetricSource for PrometheusClient {
    async fn query(&self, expr: &str) -> Result<QueryOutcome, QueryError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = format!(
            "/api/v1/query?query={}&time={now}",
            percent_encode(expr)
        );
        debug!(authority = %self.authority, "issuing instant query");
        let body = self.get(&path).await?;
        parse_instant_response(&body)
    }
}

// ── Response envelope ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Series {
    /// `[unix_timestamp, "value"]` — the scalar arrives as a string.
    value: (f64, String),
}

/// Reduce an instant-query response body to a single scalar.
///
/// An empty instant vector and a `"NaN"` scalar both mean "no data
/// collected yet" and map to `Indeterminate`. Everything that does not
/// fit the single-series envelope is a schema violation.
fn parse_instant_response(body: &str) -> Result<QueryOutcome, QueryError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| QueryError::MalformedResponse(format!("invalid envelope: {e}")))?;

    if envelope.status != "success" {
        return Err(QueryError::MalformedResponse(format!(
            "status {:?}",
            envelope.status
        )));
    }
    let data = envelope
        .data
        .ok_or_else(|| QueryError::MalformedResponse("missing data field".to_string()))?;
    if data.result_type != "vector" {
        return Err(QueryError::MalformedResponse(format!(
            "unexpected result type {:?}",
            data.result_type
        )));
    }

    match data.result.as_slice() {
        [] => Ok(QueryOutcome::Indeterminate),
        [series] => {
            let raw = series.value.1.as_str();
            if raw == "NaN" {
                return Ok(QueryOutcome::Indeterminate);
            }
            raw.parse::<f64>()
                .map(QueryOutcome::Value)
                .map_err(|_| {
                    QueryError::MalformedResponse(format!("non-numeric value {raw:?}"))
                })
        }
        many => Err(QueryError::MalformedResponse(format!(
            "expected a single series, got {}",
            many.len()
        ))),
    }
}

/// Percent-encode an expression for use as a query-string value.
fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

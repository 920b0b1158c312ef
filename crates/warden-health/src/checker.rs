//! HTTP and TCP probe logic.

use std::time::{Duration, Instant};

use tracing::debug;

use warden_state::{HealthSample, HealthStatus, epoch_millis};

use crate::error::{HealthError, HealthResult};

/// A parsed probe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProbeTarget {
    /// `host:port` to connect to.
    authority: String,
    /// Host header value.
    host: String,
    /// Path and query sent in the request line.
    path: String,
}

impl ProbeTarget {
    pub(crate) fn parse(url: &str) -> HealthResult<Self> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            HealthError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(HealthError::UnsupportedScheme(other.to_string())),
            None => {
                return Err(HealthError::InvalidUrl {
                    url: url.to_string(),
                    reason: "missing scheme".to_string(),
                });
            }
        }

        let host = uri.host().ok_or_else(|| HealthError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = uri.port_u16().unwrap_or(80);
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            authority: format!("{host}:{port}"),
            host: host.to_string(),
            path,
        })
    }
}

/// Why a probe produced no status code.
#[derive(Debug)]
enum ProbeFailure {
    Connect,
    Handshake,
    Request,
}

/// Probe `url` with an HTTP/1.1 GET.
///
/// Returns `Err` only when the URL itself is unusable; every network
/// outcome is folded into the returned sample.
pub async fn check(url: &str, timeout: Duration) -> HealthResult<HealthSample> {
    let target = ProbeTarget::parse(url)?;
    Ok(probe_target(&target, url, timeout).await)
}

/// Probe an already-validated target.
pub(crate) async fn probe_target(target: &ProbeTarget, url: &str, timeout: Duration) -> HealthSample {
    let timestamp_ms = epoch_millis();
    let started = Instant::now();

    let result = tokio::time::timeout(timeout, send_probe(target)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (status, code) = match result {
        Ok(Ok(code)) if (200..300).contains(&code) => (HealthStatus::Up, Some(code)),
        Ok(Ok(code)) => {
            debug!(%url, code, "health probe non-2xx");
            (HealthStatus::Down, Some(code))
        }
        Ok(Err(failure)) => {
            debug!(%url, ?failure, "health probe failed");
            (HealthStatus::Down, None)
        }
        Err(_) => {
            debug!(%url, timeout_ms = timeout.as_millis() as u64, "health probe timed out");
            (HealthStatus::Timeout, None)
        }
    };

    HealthSample {
        timestamp_ms,
        endpoint: url.to_string(),
        status,
        code,
        latency_ms,
    }
}

async fn send_probe(target: &ProbeTarget) -> Result<u16, ProbeFailure> {
    let stream = tokio::net::TcpStream::connect(&target.authority)
        .await
        .map_err(|e| {
            debug!(error = %e, authority = %target.authority, "health probe connection failed");
            ProbeFailure::Connect
        })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| {
            debug!(error = %e, "health probe handshake failed");
            ProbeFailure::Handshake
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(target.path.as_str())
        .header("host", target.host.as_str())
        .header("user-agent", "warden/0.1")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| {
            debug!(error = %e, "health probe request build failed");
            ProbeFailure::Request
        })?;

    let resp = sender.send_request(req).await.map_err(|e| {
        debug!(error = %e, "health probe request failed");
        ProbeFailure::Request
    })?;
    Ok(resp.status().as_u16())
}

/// Whether a TCP connection to `address` succeeds within `timeout`.
pub async fn port_open(address: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(address)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(error = %e, %address, "port check failed");
            false
        }
        Err(_) => {
            debug!(%address, "port check timed out");
            false
        }
    }
}

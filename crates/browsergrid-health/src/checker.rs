//! Status probe logic.
//!
//! Performs one HTTP GET against a worker's status endpoint and decides
//! whether the body reports a successful status.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use tracing::debug;

/// Status endpoint every worker serves.
pub const STATUS_PATH: &str = "/wd/hub/status";

/// Result of a single status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The worker answered and reported success.
    Ready,
    /// The worker answered but is not up yet.
    NotReady,
    /// The probe could not be executed (connection error, timeout, bad response).
    Failed,
}

/// Whether a status body reports success.
///
/// Accepts both the legacy `"state": "success"` form and the newer
/// `"value": {"ready": true}` form. Bodies that are not JSON are scanned
/// for the word `success`.
pub fn status_reports_success(body: &[u8]) -> bool {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => {
            json.get("state").and_then(|s| s.as_str()) == Some("success")
                || json.pointer("/value/ready").and_then(|r| r.as_bool()) == Some(true)
        }
        Err(_) => String::from_utf8_lossy(body).contains("success"),
    }
}

/// Probe `http://{host}:{port}/wd/hub/status`.
pub async fn status_probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let authority = format!("{host}:{port}");
    let uri = format!("http://{authority}{STATUS_PATH}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(&authority).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "status probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "status probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", &authority)
            .header("user-agent", "browsergrid-health/0.1")
            .body(Empty::<Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "status probe request is malformed");
                return ProbeResult::Failed;
            }
        };

        let resp = match sender.send_request(req).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, %uri, "status probe request failed");
                return ProbeResult::Failed;
            }
        };

        let status = resp.status();
        let body = match resp.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(error = %e, %uri, "status probe body unreadable");
                return ProbeResult::Failed;
            }
        };

        if status.is_success() && status_reports_success(&body) {
            ProbeResult::Ready
        } else {
            debug!(%status, %uri, "worker not ready yet");
            ProbeResult::NotReady
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "status probe timed out");
            ProbeResult::Failed
        }
    }
}

//! Readiness prober — bounded polling of a freshly created worker.
//!
//! A container's address may be unknown right after creation, so the
//! address is re-resolved on every attempt until one is found.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::checker::{ProbeResult, status_probe};

/// Status polls before a worker is declared timed out.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Upper bound on a single status request.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long and how often to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    /// Sleep before every attempt. Zero in tests.
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl ReadinessPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Outcome of waiting on one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Status endpoint reported success on the given attempt (1-based).
    Healthy { attempts: u32 },
    /// Every attempt was used up.
    TimedOut,
}

impl Readiness {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Readiness::Healthy { .. })
    }
}

/// Poll a worker's status endpoint until it reports success.
///
/// `resolve` yields the container's address, or `None` while it is not
/// assigned yet. It is called again on each attempt until it succeeds.
/// Individual probe failures only count as "not yet".
pub async fn wait_until_ready<F, Fut>(
    container: &str,
    port: u16,
    policy: &ReadinessPolicy,
    mut resolve: F,
) -> Readiness
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let mut address = resolve().await.filter(|a| !a.trim().is_empty());

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        if address.is_none() {
            address = resolve().await.filter(|a| !a.trim().is_empty());
        }
        let Some(host) = address.as_deref() else {
            debug!(%container, attempt, "container address not assigned yet");
            continue;
        };

        match status_probe(host, port, policy.probe_timeout).await {
            ProbeResult::Ready => {
                info!(%container, attempts = attempt, "container is up");
                return Readiness::Healthy { attempts: attempt };
            }
            ProbeResult::NotReady | ProbeResult::Failed => {
                debug!(%container, attempt, "container not ready");
            }
        }
    }

    warn!(
        %container,
        attempts = policy.max_attempts,
        "container did not become ready in time; \
         the host may have reached its limit of concurrent workers"
    );
    Readiness::TimedOut
}

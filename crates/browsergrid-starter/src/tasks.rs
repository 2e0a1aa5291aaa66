//! Provisioning task pool.
//!
//! Every launch runs as its own tokio task, detached from the admission
//! caller. A semaphore bounds how many run at once. Each finished task is
//! logged, counted, and broadcast as a [`ProvisionReport`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::provisioner::{ProvisionOutcome, ProvisionRequest, Provisioner};

/// Reports buffered per subscriber before old ones are dropped.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// A finished provisioning task.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    pub request: ProvisionRequest,
    pub outcome: ProvisionOutcome,
}

/// Lifetime counters for provisioning tasks.
#[derive(Debug, Default)]
pub struct ProvisionStats {
    launched: AtomicU64,
    ready: AtomicU64,
    at_capacity: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ProvisionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub launched: u64,
    pub ready: u64,
    pub at_capacity: u64,
    pub failed: u64,
}

impl StatsSnapshot {
    /// Tasks that have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.launched
            .saturating_sub(self.ready + self.at_capacity + self.failed)
    }
}

impl ProvisionStats {
    fn record(&self, outcome: &ProvisionOutcome) {
        let counter = match outcome {
            ProvisionOutcome::Ready { .. } => &self.ready,
            ProvisionOutcome::AtCapacity => &self.at_capacity,
            ProvisionOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            launched: self.launched.load(Ordering::Relaxed),
            ready: self.ready.load(Ordering::Relaxed),
            at_capacity: self.at_capacity.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Spawns and tracks provisioning tasks.
pub struct ProvisionTasks {
    provisioner: Arc<Provisioner>,
    permits: Arc<Semaphore>,
    stats: Arc<ProvisionStats>,
    reports: broadcast::Sender<ProvisionReport>,
}

impl ProvisionTasks {
    pub fn new(provisioner: Provisioner, max_parallel: usize) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            provisioner: Arc::new(provisioner),
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            stats: Arc::new(ProvisionStats::default()),
            reports,
        }
    }

    /// Start provisioning right away. Must be called within a tokio runtime.
    pub fn spawn(&self, request: ProvisionRequest) -> JoinHandle<ProvisionOutcome> {
        self.spawn_after(request, Duration::ZERO)
    }

    /// Start provisioning after `delay`.
    pub fn spawn_after(
        &self,
        request: ProvisionRequest,
        delay: Duration,
    ) -> JoinHandle<ProvisionOutcome> {
        self.stats.launched.fetch_add(1, Ordering::Relaxed);

        let provisioner = self.provisioner.clone();
        let permits = self.permits.clone();
        let stats = self.stats.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // The semaphore is never closed; without a permit the task still runs.
            let _permit = permits.acquire_owned().await.ok();

            let outcome = provisioner.provision(&request).await;
            match &outcome {
                ProvisionOutcome::Ready { container, ports } => {
                    info!(
                        %container,
                        port = ports.service,
                        browser = %request.browser,
                        "worker ready"
                    );
                }
                ProvisionOutcome::AtCapacity => {
                    debug!(browser = %request.browser, "launch skipped at capacity");
                }
                ProvisionOutcome::Failed { attempts } => {
                    error!(browser = %request.browser, attempts, "worker provisioning failed");
                }
            }
            stats.record(&outcome);

            // No subscribers is fine.
            let _ = reports.send(ProvisionReport {
                request,
                outcome: outcome.clone(),
            });
            outcome
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProvisionReport> {
        self.reports.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsergrid_core::PortTriple;

    #[test]
    fn stats_count_each_outcome() {
        let stats = ProvisionStats::default();
        stats.launched.fetch_add(4, Ordering::Relaxed);
        stats.record(&ProvisionOutcome::Ready {
            container: "browsergrid_40000".to_string(),
            ports: PortTriple::for_service(40000).unwrap(),
        });
        stats.record(&ProvisionOutcome::AtCapacity);
        stats.record(&ProvisionOutcome::Failed { attempts: 2 });

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                launched: 4,
                ready: 1,
                at_capacity: 1,
                failed: 1
            }
        );
        assert_eq!(snapshot.in_flight(), 1);
    }
}

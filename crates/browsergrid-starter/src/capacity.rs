//! Capacity guard — caps concurrently running worker containers.
//!
//! The check is advisory: the count and the following creation are not
//! atomic, so concurrent tasks can overshoot the ceiling briefly.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, warn};

use crate::diagnostics::DiagnosticsSink;
use crate::error::StarterError;
use crate::runtime::ContainerRuntime;

/// Result of one capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityVerdict {
    Admit { running: u32 },
    AtCapacity { running: u32, max: u32 },
    /// The running count could not be read. Treated as "no capacity".
    Unknown,
}

impl CapacityVerdict {
    pub fn admits(&self) -> bool {
        matches!(self, CapacityVerdict::Admit { .. })
    }
}

pub struct CapacityGuard {
    runtime: Arc<dyn ContainerRuntime>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    image: String,
    max_containers: u32,
}

impl CapacityGuard {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        image: impl Into<String>,
        max_containers: u32,
    ) -> Self {
        Self {
            runtime,
            diagnostics,
            image: image.into(),
            max_containers,
        }
    }

    /// Compare the running worker count against the ceiling.
    pub async fn check(&self) -> CapacityVerdict {
        let running = self
            .runtime
            .running_containers(&self.image)
            .await
            .with_context(|| format!("counting running containers of {}", self.image));

        match running {
            Ok(running) if running < self.max_containers => CapacityVerdict::Admit { running },
            Ok(running) => {
                warn!(
                    running,
                    max = self.max_containers,
                    "max container limit reached, not starting a worker"
                );
                CapacityVerdict::AtCapacity {
                    running,
                    max: self.max_containers,
                }
            }
            Err(e) => {
                let e = StarterError::from(e);
                error!(error = %e, "running container count unavailable, not starting a worker");
                self.diagnostics.record_error("capacity check", &e);
                CapacityVerdict::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::runtime::{ContainerRequest, RuntimeFuture};

    struct CountingRuntime {
        running: Option<u32>,
    }

    impl ContainerRuntime for CountingRuntime {
        fn create_container<'a>(&'a self, _request: &'a ContainerRequest) -> RuntimeFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
        fn container_ip<'a>(&'a self, _name: &'a str) -> RuntimeFuture<'a, Option<String>> {
            Box::pin(async { Ok(None) })
        }
        fn running_containers<'a>(&'a self, _image: &'a str) -> RuntimeFuture<'a, u32> {
            let running = self.running;
            Box::pin(async move { running.ok_or_else(|| anyhow::anyhow!("daemon unreachable")) })
        }
        fn latest_downloaded_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, String> {
            Box::pin(async move { Ok(image.to_string()) })
        }
        fn label_value<'a>(
            &'a self,
            _image: &'a str,
            _label: &'a str,
        ) -> RuntimeFuture<'a, Option<String>> {
            Box::pin(async { Ok(None) })
        }
        fn initialise_environment(&self) -> RuntimeFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
        fn set_node_id(&self, _prefix: &str) {}
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl DiagnosticsSink for RecordingSink {
        fn record_error(&self, context: &str, _error: &StarterError) {
            self.0.lock().unwrap().push(context.to_string());
        }
    }

    fn guard(running: Option<u32>, max: u32) -> (CapacityGuard, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let runtime = Arc::new(CountingRuntime { running });
        let guard = CapacityGuard::new(runtime, sink.clone(), "elgalu/selenium", max);
        (guard, sink)
    }

    #[tokio::test]
    async fn admits_below_ceiling() {
        let (guard, sink) = guard(Some(3), 10);
        assert_eq!(guard.check().await, CapacityVerdict::Admit { running: 3 });
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_at_ceiling() {
        let (guard, _) = guard(Some(10), 10);
        let verdict = guard.check().await;
        assert_eq!(verdict, CapacityVerdict::AtCapacity { running: 10, max: 10 });
        assert!(!verdict.admits());
    }

    #[tokio::test]
    async fn zero_ceiling_never_admits() {
        let (guard, _) = guard(Some(0), 0);
        assert!(!guard.check().await.admits());
    }

    #[tokio::test]
    async fn fails_closed_and_reports() {
        let (guard, sink) = guard(None, 10);
        assert_eq!(guard.check().await, CapacityVerdict::Unknown);
        assert_eq!(*sink.0.lock().unwrap(), vec!["capacity check".to_string()]);
    }
}

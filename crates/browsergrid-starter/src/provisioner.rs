//! Container provisioner — creates one worker and waits until it is up.
//!
//! A provisioning run makes at most [`MAX_CREATE_ATTEMPTS`] attempts. Each
//! attempt leases a fresh port triple, creates the container, and polls its
//! status endpoint. Nothing is returned to the admission caller: the run
//! ends in a [`ProvisionOutcome`] that the task pool logs and reports.

use std::sync::Arc;

use browsergrid_core::{BrowserType, PortTriple, ProvisionConfig, ScreenSize, Tz, WorkerLaunchSpec};
use browsergrid_health::{Readiness, ReadinessPolicy, wait_until_ready};
use tracing::{debug, error, info, warn};

use crate::capacity::CapacityGuard;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{StarterError, StarterResult};
use crate::ports::PortLeasePool;
use crate::runtime::{ContainerRequest, ContainerRuntime};

/// Creation attempts per provisioning run.
pub const MAX_CREATE_ATTEMPTS: u32 = 2;

/// A worker to provision.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub browser: BrowserType,
    pub screen_size: ScreenSize,
    pub time_zone: Tz,
    /// Skip the capacity guard.
    pub forced: bool,
}

/// How a provisioning run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Ready { container: String, ports: PortTriple },
    /// The capacity guard refused the launch.
    AtCapacity,
    /// Every attempt failed.
    Failed { attempts: u32 },
}

impl ProvisionOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProvisionOutcome::Ready { .. })
    }
}

pub struct Provisioner {
    config: Arc<ProvisionConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    ports: Arc<PortLeasePool>,
    capacity: CapacityGuard,
    readiness: ReadinessPolicy,
}

impl Provisioner {
    pub fn new(
        config: Arc<ProvisionConfig>,
        runtime: Arc<dyn ContainerRuntime>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        ports: Arc<PortLeasePool>,
    ) -> Self {
        let capacity = CapacityGuard::new(
            runtime.clone(),
            diagnostics.clone(),
            config.image.clone(),
            config.max_containers,
        );
        let readiness = ReadinessPolicy::new(config.sleep_interval);
        Self {
            config,
            runtime,
            diagnostics,
            ports,
            capacity,
            readiness,
        }
    }

    /// Run the capacity guard (unless forced) and up to two creation attempts.
    pub async fn provision(&self, request: &ProvisionRequest) -> ProvisionOutcome {
        if !request.forced && !self.capacity.check().await.admits() {
            return ProvisionOutcome::AtCapacity;
        }

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            match self.attempt(request).await {
                Ok((container, ports)) => return ProvisionOutcome::Ready { container, ports },
                Err(e) => {
                    warn!(
                        browser = %request.browser,
                        attempt,
                        error = %e,
                        "worker provisioning attempt failed"
                    );
                    if matches!(e, StarterError::Runtime(_)) {
                        self.diagnostics.record_error("container creation", &e);
                    }
                }
            }
        }

        error!(
            browser = %request.browser,
            attempts = MAX_CREATE_ATTEMPTS,
            "no worker container was created for the request"
        );
        ProvisionOutcome::Failed {
            attempts: MAX_CREATE_ATTEMPTS,
        }
    }

    async fn attempt(&self, request: &ProvisionRequest) -> StarterResult<(String, PortTriple)> {
        let ports = self.ports.lease().ok_or(StarterError::PortsExhausted {
            lower: self.ports.lower(),
            upper: self.ports.upper(),
        })?;

        let spec = WorkerLaunchSpec::new(
            &self.config,
            request.browser,
            request.screen_size,
            request.time_zone,
            ports,
        );
        let name = spec.container_name(&self.config.container_name);
        let image = self.runtime.latest_downloaded_image(&self.config.image).await?;

        info!(
            container = %name,
            %image,
            browser = %request.browser,
            screen = %request.screen_size,
            tz = %request.time_zone.name(),
            forced = request.forced,
            "starting worker container"
        );

        let container = ContainerRequest {
            name,
            image,
            env: spec.env_vars(),
            port_label: ports.service.to_string(),
        };
        self.runtime.create_container(&container).await?;

        if !self.runtime.supports_direct_probing() {
            debug!(container = %container.name, "runtime cannot probe workers, assuming ready");
            return Ok((container.name, ports));
        }

        let runtime = &self.runtime;
        let name = container.name.as_str();
        let readiness = wait_until_ready(name, ports.service, &self.readiness, move || async move {
            runtime.container_ip(name).await.unwrap_or_else(|e| {
                debug!(container = %name, error = %e, "container address lookup failed");
                None
            })
        })
        .await;

        match readiness {
            Readiness::Healthy { .. } => Ok((container.name, ports)),
            Readiness::TimedOut => Err(StarterError::NotReady {
                container: container.name,
                attempts: self.readiness.max_attempts,
            }),
        }
    }
}

//! The starter service — entry point for admission and provisioning.

use std::sync::Arc;

use browsergrid_core::{CapabilityRequest, ProvisionConfig};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::admission::{AdmissionDecision, AdmissionOutcome, evaluate};
use crate::catalog::{AdvertisedCapability, CapabilityCatalog};
use crate::diagnostics::DiagnosticsSink;
use crate::error::{StarterError, StarterResult};
use crate::ports::PortLeasePool;
use crate::provisioner::{ProvisionOutcome, Provisioner};
use crate::runtime::ContainerRuntime;
use crate::seeder;
use crate::tasks::{ProvisionReport, ProvisionTasks, StatsSnapshot};

/// Prefix the runtime uses to tag this node in its logs.
pub const NODE_ID_PREFIX: &str = "[BG] ";

/// Owns configuration, the port lease pool, the runtime handle, and the
/// provisioning task pool. One per process.
pub struct Starter {
    config: Arc<ProvisionConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    catalog: CapabilityCatalog,
    tasks: ProvisionTasks,
}

impl Starter {
    /// A starter leasing ports from the default range.
    pub fn new(
        config: ProvisionConfig,
        runtime: Arc<dyn ContainerRuntime>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self::with_port_pool(config, runtime, diagnostics, PortLeasePool::default())
    }

    /// A starter leasing ports from the given pool.
    pub fn with_port_pool(
        config: ProvisionConfig,
        runtime: Arc<dyn ContainerRuntime>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        ports: PortLeasePool,
    ) -> Self {
        let config = Arc::new(config);
        let provisioner = Provisioner::new(
            config.clone(),
            runtime.clone(),
            diagnostics.clone(),
            Arc::new(ports),
        );
        let tasks = ProvisionTasks::new(provisioner, config.max_parallel_provisions);
        Self {
            config,
            runtime,
            diagnostics,
            catalog: CapabilityCatalog::new(),
            tasks,
        }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Prepare the runtime, load the capability catalog, and seed the pool.
    ///
    /// A failing runtime preparation is reported and aborts seeding.
    pub async fn initialise(&self) -> StarterResult<Vec<JoinHandle<ProvisionOutcome>>> {
        self.runtime.set_node_id(NODE_ID_PREFIX);

        if let Err(e) = self.runtime.initialise_environment().await {
            let e = StarterError::from(e.context("preparing container environment"));
            error!(error = %e, "container environment unavailable, no workers will be seeded");
            self.diagnostics.record_error("environment initialisation", &e);
            return Err(e);
        }

        let capabilities = self.catalog.load(self.runtime.as_ref(), &self.config.image).await;
        debug!(?capabilities, "advertising capabilities");

        Ok(self.seed_pool())
    }

    /// Capabilities this starter advertises.
    pub fn capabilities(&self) -> Vec<AdvertisedCapability> {
        self.catalog.snapshot()
    }

    /// Decide what to do with one offer of a request, without side effects.
    pub fn evaluate(&self, request: &CapabilityRequest) -> AdmissionDecision {
        evaluate(request, &self.config, &self.catalog.snapshot())
    }

    /// Admit a request: apply the decision's writes and, if a worker is
    /// needed, start provisioning it in the background.
    ///
    /// Returns as soon as the task is spawned. Must be called within a
    /// tokio runtime.
    pub fn handle_request(&self, request: &mut CapabilityRequest) -> AdmissionOutcome {
        let AdmissionDecision { outcome, patch } = self.evaluate(request);
        request.apply(&patch);

        match &outcome {
            AdmissionOutcome::Launch(req) => {
                info!(browser = %req.browser, "no worker for request yet, launching one");
                self.tasks.spawn(req.clone());
            }
            AdmissionOutcome::Relaunch(req) => {
                info!(
                    browser = %req.browser,
                    "request waited too long for a worker, launching another"
                );
                self.tasks.spawn(req.clone());
            }
            AdmissionOutcome::Waiting { offers } => {
                debug!(offers, "request already has a worker on the way");
            }
            AdmissionOutcome::Rejected(_) => {}
        }
        outcome
    }

    /// Launch the startup workers. Called by [`Starter::initialise`].
    pub fn seed_pool(&self) -> Vec<JoinHandle<ProvisionOutcome>> {
        seeder::seed_pool(&self.tasks, &self.config)
    }

    /// Receive a report for every provisioning task that finishes.
    pub fn subscribe(&self) -> broadcast::Receiver<ProvisionReport> {
        self.tasks.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.tasks.stats()
    }
}

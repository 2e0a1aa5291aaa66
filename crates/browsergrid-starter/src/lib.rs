//! browsergrid-starter — on-demand browser worker provisioning.
//!
//! Receives capability requests from the hub and decides whether to start
//! a new worker container for them:
//!
//! - Gates requests to Chrome and Firefox on Linux
//! - Normalizes screen size and time zone overrides
//! - Deduplicates repeated offers of the same waiting request
//! - Caps running workers and provisions new ones in the background
//! - Seeds a pool of workers at startup
//!
//! # Architecture
//!
//! ```text
//! Starter
//!   ├── admission::evaluate (gate → normalize → dedup) → RequestPatch
//!   ├── CapabilityCatalog (versions from image labels, cached)
//!   └── ProvisionTasks (semaphore-bounded tokio tasks)
//!       └── Provisioner
//!           ├── CapacityGuard (running count vs. ceiling, fails closed)
//!           ├── PortLeasePool (service / viewer / VNC triples)
//!           ├── ContainerRuntime (create, inspect)
//!           └── browsergrid_health::wait_until_ready
//! ```

pub mod admission;
pub mod capacity;
pub mod catalog;
pub mod diagnostics;
pub mod error;
pub mod ports;
pub mod provisioner;
pub mod runtime;
pub mod seeder;
pub mod starter;
pub mod tasks;

pub use admission::{AdmissionDecision, AdmissionOutcome, Rejection};
pub use catalog::AdvertisedCapability;
pub use diagnostics::{DiagnosticsSink, TracingDiagnostics};
pub use error::{StarterError, StarterResult};
pub use ports::PortLeasePool;
pub use provisioner::{ProvisionOutcome, ProvisionRequest};
pub use runtime::{ContainerRequest, ContainerRuntime, RuntimeFuture};
pub use starter::Starter;
pub use tasks::{ProvisionReport, StatsSnapshot};

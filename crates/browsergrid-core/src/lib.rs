//! browsergrid-core — shared model for on-demand browser worker provisioning.
//!
//! - [`capability`]: loosely typed capability requests and the patches the
//!   pipeline asks callers to apply to them
//! - [`config`]: provisioning settings resolved from environment-style keys
//! - [`launch`]: port triples and the launch spec for one worker container
//! - [`types`]: browsers, platforms, screen sizes, time zones

pub mod capability;
pub mod config;
pub mod launch;
pub mod types;

pub use capability::{CapabilityRequest, RequestPatch};
pub use config::{ConfigSource, EnvSource, MapSource, ProvisionConfig};
pub use launch::{PortTriple, WorkerLaunchSpec};
pub use types::*;

pub use chrono_tz::Tz;

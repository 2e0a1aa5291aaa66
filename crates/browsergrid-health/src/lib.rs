//! browsergrid-health — readiness probing for new worker containers.
//!
//! Provides a single-shot HTTP status probe and a bounded polling loop
//! used right after a container is created.
//!
//! # Architecture
//!
//! ```text
//! wait_until_ready(container, port, policy, resolve)
//!   ├── resolve() → container address (retried while unknown)
//!   ├── sleep(policy.interval)
//!   └── status_probe() → ProbeResult   (up to policy.max_attempts)
//! ```
//!
//! A probe that fails to connect or returns a non-success body counts as
//! "not yet". Only exhausting every attempt yields [`Readiness::TimedOut`].

pub mod checker;
pub mod readiness;

#[cfg(test)]
mod test_server;

pub use checker::{ProbeResult, STATUS_PATH, status_probe};
pub use readiness::{Readiness, ReadinessPolicy, wait_until_ready};

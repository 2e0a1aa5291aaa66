//! Starter error types.

use thiserror::Error;

/// Errors raised while provisioning a worker container.
///
/// None of these reach the admission caller: provisioning tasks log them,
/// report them, and end with a failed outcome.
#[derive(Debug, Error)]
pub enum StarterError {
    #[error("no free port triple in {lower}..={upper}")]
    PortsExhausted { lower: u16, upper: u16 },

    #[error("container {container} was not ready after {attempts} status polls")]
    NotReady { container: String, attempts: u32 },

    #[error("container runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
}

pub type StarterResult<T> = Result<T, StarterError>;

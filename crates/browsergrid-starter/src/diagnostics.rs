//! Diagnostics sink for infrastructure failures.

use tracing::error;

use crate::error::StarterError;

/// Receives infrastructure failures for out-of-band reporting.
///
/// Calls are fire-and-forget. Implementations must return quickly and
/// never block the provisioning task that reports.
pub trait DiagnosticsSink: Send + Sync {
    fn record_error(&self, context: &str, error: &StarterError);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record_error(&self, context: &str, error: &StarterError) {
        error!(%context, error = %error, "infrastructure failure");
    }
}

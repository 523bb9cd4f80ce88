//! The probe capability.
//!
//! A probe is a named measurement source. Callers hold probes as trait
//! objects (`Arc<dyn Probe>`) so new kinds can be added without touching
//! the code that reads them.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::warn;

use crate::error::ProbeResult;

/// Boxed future returned by [`Probe::value`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Value reported by [`value_or_sentinel`] when a read fails.
pub const SENTINEL_VALUE: f64 = -1.0;

/// A source of a single numeric measurement.
pub trait Probe: Send + Sync {
    /// Human-readable descriptor embedding the probe kind and its
    /// configuration. For logs and error messages only.
    fn name(&self) -> String;

    /// Read the current measurement.
    ///
    /// The whole read is bounded by `timeout`. Dropping the returned future
    /// abandons the read.
    fn value(&self, timeout: Duration) -> BoxFuture<'_, ProbeResult<f64>>;
}

/// Read `probe`, collapsing any failure into [`SENTINEL_VALUE`].
///
/// The failure is logged with the probe name and cause. Prefer
/// [`Probe::value`] when a genuine reading can be negative.
pub async fn value_or_sentinel(probe: &dyn Probe, timeout: Duration) -> f64 {
    match probe.value(timeout).await {
        Ok(v) => v,
        Err(e) => {
            warn!(probe = %probe.name(), error = %e, "probe read failed");
            SENTINEL_VALUE
        }
    }
}

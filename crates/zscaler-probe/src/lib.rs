//! zscaler-probe — metric probes for the zscaler autoscaler.
//!
//! A [`Probe`] is a named source of one numeric measurement. The only
//! kind today is [`PrometheusProbe`], which scrapes a Prometheus text
//! exposition endpoint and extracts the sample for a literal key.
//!
//! # Architecture
//!
//! ```text
//! PrometheusProbe::value(timeout)
//!   ├── HttpClient::get()          → HTTP/1.1 GET, plain TCP or rustls
//!   ├── status check               → ProbeError::Protocol on non-2xx
//!   └── exposition::find_value_in_body()
//!         └── KeyScanner           → first line whose first token == key
//! ```
//!
//! Reads return `Result<f64, ProbeError>`; [`value_or_sentinel`] is
//! available for callers that want the legacy `-1.0` convention.

pub mod error;
pub mod exposition;
pub mod http;
pub mod probe;
pub mod prometheus;

pub use error::{ProbeError, ProbeErrorKind, ProbeResult};
pub use self::http::HttpClient;
pub use probe::{BoxFuture, Probe, SENTINEL_VALUE, value_or_sentinel};
pub use prometheus::PrometheusProbe;

//! zscaler-config — `zscaler.toml` loading and probe construction.
//!
//! ```toml
//! [defaults]
//! timeout = "10s"
//!
//! [[probes]]
//! id = "cpu1-idle"
//! kind = "prometheus"
//! url = "http://localhost:9100/metrics"
//! key = 'node_cpu{cpu="cpu1",mode="idle"}'
//! timeout = "2s"
//! ```
//!
//! Configurations are validated on load: ids must be unique and non-empty,
//! durations must parse, and every probe must have a valid URL and key.

pub mod config;
pub mod duration;

pub use config::{ConfigError, ConfiguredProbe, Defaults, ProbeConfig, ProbeKind, ZscalerConfig};
pub use duration::parse_duration;

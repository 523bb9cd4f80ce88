//! zscaler.toml configuration model.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use zscaler_probe::http::Target;
use zscaler_probe::{HttpClient, Probe, ProbeError, PrometheusProbe};

use crate::duration::parse_duration;

/// Timeout applied to probes that set none.
pub const DEFAULT_TIMEOUT: &str = "10s";

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("no probes configured")]
    NoProbes,

    #[error("probe #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("duplicate probe id: {0}")]
    DuplicateId(String),

    #[error("invalid duration {value:?} for {field}")]
    InvalidDuration { field: String, value: String },

    #[error("probe {id}: {source}")]
    Probe {
        id: String,
        #[source]
        source: ProbeError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZscalerConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: None,
        }
    }
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProbeTable")]
pub struct ProbeConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: ProbeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Probe variants, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeKind {
    Prometheus { url: String, key: String },
}

/// On-disk shape of one `[[probes]]` table. Every variant lists the shared
/// fields itself so unknown keys are rejected.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
enum ProbeTable {
    Prometheus {
        id: String,
        url: String,
        key: String,
        #[serde(default)]
        timeout: Option<String>,
    },
}

impl From<ProbeTable> for ProbeConfig {
    fn from(table: ProbeTable) -> Self {
        match table {
            ProbeTable::Prometheus {
                id,
                url,
                key,
                timeout,
            } => Self {
                id,
                kind: ProbeKind::Prometheus { url, key },
                timeout,
            },
        }
    }
}

/// A probe built from configuration, ready to be read.
#[derive(Clone)]
pub struct ConfiguredProbe {
    pub id: String,
    pub probe: Arc<dyn Probe>,
    pub timeout: Duration,
}

impl ZscalerConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ZscalerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check ids, durations, URLs, and keys without building probes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probes.is_empty() {
            return Err(ConfigError::NoProbes);
        }
        checked_duration("defaults.timeout", &self.defaults.timeout)?;

        let mut seen = HashSet::new();
        for (index, probe) in self.probes.iter().enumerate() {
            if probe.id.trim().is_empty() {
                return Err(ConfigError::EmptyId { index });
            }
            if !seen.insert(probe.id.as_str()) {
                return Err(ConfigError::DuplicateId(probe.id.clone()));
            }
            probe.timeout(&self.defaults)?;
            probe.check()?;
        }
        Ok(())
    }

    /// Look up a probe by id.
    pub fn probe(&self, id: &str) -> Option<&ProbeConfig> {
        self.probes.iter().find(|p| p.id == id)
    }

    /// Build every configured probe, sharing one HTTP client.
    pub fn build_probes(&self, client: &HttpClient) -> Result<Vec<ConfiguredProbe>, ConfigError> {
        let client = match &self.defaults.user_agent {
            Some(ua) => client.clone().with_user_agent(ua.clone()),
            None => client.clone(),
        };
        self.probes
            .iter()
            .map(|p| -> Result<ConfiguredProbe, ConfigError> {
                Ok(ConfiguredProbe {
                    id: p.id.clone(),
                    probe: p.build(&client)?,
                    timeout: p.timeout(&self.defaults)?,
                })
            })
            .collect()
    }
}

impl ProbeConfig {
    /// Effective timeout: the probe's own, else the default.
    pub fn timeout(&self, defaults: &Defaults) -> Result<Duration, ConfigError> {
        match &self.timeout {
            Some(t) => checked_duration(&format!("probes.{}.timeout", self.id), t),
            None => checked_duration("defaults.timeout", &defaults.timeout),
        }
    }

    pub fn build(&self, client: &HttpClient) -> Result<Arc<dyn Probe>, ConfigError> {
        match &self.kind {
            ProbeKind::Prometheus { url, key } => {
                let probe = PrometheusProbe::new(client.clone(), url, key.clone())
                    .map_err(|source| self.error(source))?;
                Ok(Arc::new(probe))
            }
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        match &self.kind {
            ProbeKind::Prometheus { url, key } => {
                if key.trim().is_empty() {
                    return Err(self.error(ProbeError::EmptyKey));
                }
                Target::parse(url).map_err(|source| self.error(source))?;
            }
        }
        Ok(())
    }

    fn error(&self, source: ProbeError) -> ConfigError {
        ConfigError::Probe {
            id: self.id.clone(),
            source,
        }
    }
}

fn checked_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
timeout = "3s"

[[probes]]
id = "cpu1-idle"
kind = "prometheus"
url = "http://localhost:9100/metrics"
key = 'node_cpu{cpu="cpu1",mode="idle"}'

[[probes]]
id = "load"
kind = "prometheus"
url = "https://metrics.example.com/metrics"
key = "node_load1"
timeout = "500ms"
"#;

    #[test]
    fn parse_sample() {
        let config = ZscalerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.probes.len(), 2);

        let cpu = config.probe("cpu1-idle").unwrap();
        assert_eq!(
            cpu.kind,
            ProbeKind::Prometheus {
                url: "http://localhost:9100/metrics".to_string(),
                key: "node_cpu{cpu=\"cpu1\",mode=\"idle\"}".to_string(),
            }
        );
        assert_eq!(cpu.timeout(&config.defaults).unwrap(), Duration::from_secs(3));

        let load = config.probe("load").unwrap();
        assert_eq!(
            load.timeout(&config.defaults).unwrap(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn defaults_apply_when_section_missing() {
        let config = ZscalerConfig::from_toml_str(
            r#"
[[probes]]
id = "up"
kind = "prometheus"
url = "http://localhost:9090/metrics"
key = "up"
"#,
        )
        .unwrap();
        assert_eq!(config.defaults.timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            config.probes[0].timeout(&config.defaults).unwrap(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn rejects_empty_probe_list() {
        let err = ZscalerConfig::from_toml_str("[defaults]\ntimeout = \"1s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::NoProbes));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let text = r#"
[[probes]]
id = "a"
kind = "prometheus"
url = "http://h:1/metrics"
key = "x"

[[probes]]
id = "a"
kind = "prometheus"
url = "http://h:1/metrics"
key = "y"
"#;
        let err = ZscalerConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn rejects_bad_timeout() {
        let text = r#"
[[probes]]
id = "a"
kind = "prometheus"
url = "http://h:1/metrics"
key = "x"
timeout = "soon"
"#;
        let err = ZscalerConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));

        let text = text.replace("\"soon\"", "\"0s\"");
        let err = ZscalerConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    }

    #[test]
    fn rejects_unknown_kind() {
        let text = r#"
[[probes]]
id = "a"
kind = "jsonpath"
url = "http://h:1/metrics"
key = "x"
"#;
        assert!(matches!(
            ZscalerConfig::from_toml_str(text).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn rejects_misspelled_table_field() {
        let text = r#"
[[probes]]
id = "a"
kind = "prometheus"
url = "http://h:1/metrics"
key = "x"
timout = "1s"
"#;
        let err = ZscalerConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
        assert!(err.to_string().contains("timout"), "{err}");
    }

    #[test]
    fn rejects_bad_url_and_empty_key() {
        let text = r#"
[[probes]]
id = "a"
kind = "prometheus"
url = "localhost:9100"
key = "x"
"#;
        let err = ZscalerConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::Probe { ref id, .. } if id == "a"));

        let text = r#"
[[probes]]
id = "b"
kind = "prometheus"
url = "http://localhost:9100/metrics"
key = ""
"#;
        let err = ZscalerConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Probe {
                source: ProbeError::EmptyKey,
                ..
            }
        ));
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = ZscalerConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("kind = \"prometheus\""));
        assert_eq!(ZscalerConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn build_probes_names_and_timeouts() {
        let config = ZscalerConfig::from_toml_str(SAMPLE).unwrap();
        let client = HttpClient::new().unwrap();
        let probes = config.build_probes(&client).unwrap();

        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].id, "cpu1-idle");
        assert_eq!(
            probes[0].probe.name(),
            "Prometheus probe for http://localhost:9100/metrics [node_cpu{cpu=\"cpu1\",mode=\"idle\"}]"
        );
        assert_eq!(probes[1].timeout, Duration::from_millis(500));
    }
}

//! `zscaler check` — read configured probes once.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use serde::{Serialize, Serializer};
use tokio::task::JoinSet;
use tracing::{info, warn};

use zscaler_config::{ConfiguredProbe, ZscalerConfig};
use zscaler_probe::{HttpClient, value_or_sentinel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Outcome of reading one probe.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub id: String,
    pub name: String,
    #[serde(serialize_with = "serialize_value")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run(
    config_path: &Path,
    ids: &[String],
    format: OutputFormat,
    sentinel: bool,
) -> anyhow::Result<ExitCode> {
    let readings = collect(config_path, ids, sentinel).await?;

    match format {
        OutputFormat::Text => print!("{}", render_text(&readings)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&readings)?),
    }

    if readings.iter().any(|r| r.error.is_some()) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Load the configuration, then read the selected probes.
pub async fn collect(
    config_path: &Path,
    ids: &[String],
    sentinel: bool,
) -> anyhow::Result<Vec<Reading>> {
    let config = ZscalerConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let client = HttpClient::new().context("building TLS client configuration")?;
    let probes = select(config.build_probes(&client)?, ids)?;

    info!(count = probes.len(), "reading probes");
    Ok(read_all(probes, sentinel).await)
}

/// Keep only the probes named in `ids`, in configuration order. An empty
/// selection keeps everything.
pub fn select(probes: Vec<ConfiguredProbe>, ids: &[String]) -> anyhow::Result<Vec<ConfiguredProbe>> {
    if ids.is_empty() {
        return Ok(probes);
    }
    if let Some(unknown) = ids.iter().find(|id| !probes.iter().any(|p| &p.id == *id)) {
        anyhow::bail!("no probe with id {unknown:?} in configuration");
    }
    Ok(probes
        .into_iter()
        .filter(|p| ids.contains(&p.id))
        .collect())
}

/// Read every probe concurrently. Results keep the input order.
pub async fn read_all(probes: Vec<ConfiguredProbe>, sentinel: bool) -> Vec<Reading> {
    let mut set = JoinSet::new();
    for (index, configured) in probes.into_iter().enumerate() {
        set.spawn(async move {
            let ConfiguredProbe { id, probe, timeout } = configured;
            let name = probe.name();
            let reading = if sentinel {
                let value = value_or_sentinel(&*probe, timeout).await;
                Reading {
                    id,
                    name,
                    value: Some(value),
                    error: None,
                }
            } else {
                match probe.value(timeout).await {
                    Ok(value) => Reading {
                        id,
                        name,
                        value: Some(value),
                        error: None,
                    },
                    Err(e) => {
                        warn!(probe = %name, error = %e, "probe read failed");
                        Reading {
                            id,
                            name,
                            value: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            };
            (index, reading)
        });
    }

    let mut readings = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(pair) => readings.push(pair),
            Err(e) => warn!(error = %e, "probe task aborted"),
        }
    }
    readings.sort_by_key(|(index, _)| *index);
    readings.into_iter().map(|(_, r)| r).collect()
}

/// Prometheus spelling for non-finite values, `None` for finite ones.
fn non_finite_literal(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some("NaN")
    } else if value == f64::INFINITY {
        Some("+Inf")
    } else if value == f64::NEG_INFINITY {
        Some("-Inf")
    } else {
        None
    }
}

/// JSON has no non-finite numbers; write those as their exposition strings.
fn serialize_value<S: Serializer>(value: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => match non_finite_literal(*v) {
            Some(literal) => s.serialize_str(literal),
            None => s.serialize_f64(*v),
        },
        None => s.serialize_none(),
    }
}

pub fn render_text(readings: &[Reading]) -> String {
    let mut out = String::new();
    for r in readings {
        match (&r.value, &r.error) {
            (_, Some(e)) => out.push_str(&format!("{}\terror: {}\n", r.id, e)),
            (Some(v), None) => match non_finite_literal(*v) {
                Some(literal) => out.push_str(&format!("{}\t{}\n", r.id, literal)),
                None => out.push_str(&format!("{}\t{}\n", r.id, v)),
            },
            (None, None) => out.push_str(&format!("{}\t-\n", r.id)),
        }
    }
    out
}

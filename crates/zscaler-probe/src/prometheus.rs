//! Prometheus text-exposition probe.
//!
//! Fetches an exposition endpoint over HTTP(S) and returns the value of
//! the first sample whose first column equals the configured key.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::error::{ProbeError, ProbeResult};
use crate::exposition;
use crate::http::{HttpClient, Target};
use crate::probe::{BoxFuture, Probe};

/// Probe reading one sample from a Prometheus `/metrics` endpoint.
#[derive(Clone)]
pub struct PrometheusProbe {
    client: HttpClient,
    target: Target,
    /// Literal first-column token, e.g. `node_cpu{cpu="cpu6",mode="idle"}`.
    key: String,
}

impl PrometheusProbe {
    /// Create a probe for `key` at `url`.
    ///
    /// Fails if the URL is not an absolute http(s) URL or the key is empty.
    pub fn new(
        client: HttpClient,
        url: impl AsRef<str>,
        key: impl Into<String>,
    ) -> ProbeResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ProbeError::EmptyKey);
        }
        let target = Target::parse(url.as_ref())?;
        Ok(Self {
            client,
            target,
            key,
        })
    }

    pub fn url(&self) -> &str {
        self.target.as_str()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetch the endpoint and extract the value, bounded by `timeout`.
    pub async fn read(&self, timeout: Duration) -> ProbeResult<f64> {
        match tokio::time::timeout(timeout, self.fetch()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(url = %self.target, key = %self.key, ?timeout, "prometheus probe timed out");
                Err(ProbeError::Timeout {
                    url: self.url().to_string(),
                    timeout,
                })
            }
        }
    }

    async fn fetch(&self) -> ProbeResult<f64> {
        let url = self.url();
        debug!(%url, key = %self.key, "reading prometheus probe");

        let resp = self.client.get(&self.target).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Protocol {
                url: url.to_string(),
                status,
            });
        }

        let value = exposition::find_value_in_body(resp.into_body(), &self.key, url).await?;
        debug!(%url, key = %self.key, value, "prometheus probe read");
        Ok(value)
    }
}

impl fmt::Debug for PrometheusProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusProbe")
            .field("url", &self.url())
            .field("key", &self.key)
            .finish()
    }
}

impl Probe for PrometheusProbe {
    fn name(&self) -> String {
        format!("Prometheus probe for {} [{}]", self.url(), self.key)
    }

    fn value(&self, timeout: Duration) -> BoxFuture<'_, ProbeResult<f64>> {
        Box::pin(self.read(timeout))
    }
}

use crate::scoring::{default_subject_keywords, ScoringWeights};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsTransport {
    /// DNS-over-HTTPS against `doh_endpoint`.
    Doh,
    /// The host's configured resolver.
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dns_transport: DnsTransport,
    pub doh_endpoint: String,
    /// Per-query timeout in seconds for every DNS lookup.
    pub dns_timeout_seconds: u64,
    /// Cap on concurrently outstanding DKIM selector lookups.
    pub dns_parallelism: usize,
    /// Content-classification service; empty disables body analysis.
    pub body_api_url: String,
    pub body_timeout_seconds: u64,
    pub subject_keywords: Vec<String>,
    pub scoring: ScoringWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_transport: DnsTransport::Doh,
            doh_endpoint: "https://dns.google/resolve".to_string(),
            dns_timeout_seconds: 4,
            dns_parallelism: 8,
            body_api_url: String::new(),
            body_timeout_seconds: 10,
            subject_keywords: default_subject_keywords(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid config file {:?}", path.as_ref()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("failed to serialize config")?;
        std::fs::write(&path, yaml)
            .with_context(|| format!("failed to write config file {:?}", path.as_ref()))?;
        Ok(())
    }
}

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Benchmark configuration file. Sections other than the ones below are ignored, so the same
/// file can describe endpoints this tool does not talk to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BenchConfig {
    pub endpoints: Endpoints,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Endpoints {
    pub sage: ServiceEndpoint,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub url: String,
    pub graph: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_secs: Option<u64>,
}

impl HttpSettings {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

pub fn load(path: &Path) -> Result<BenchConfig> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse(&body).with_context(|| format!("invalid config file {}", path.display()))
}

pub fn parse(body: &str) -> Result<BenchConfig> {
    Ok(serde_yaml::from_str(body)?)
}

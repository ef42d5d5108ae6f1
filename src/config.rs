//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup for technofino.in:
//!
//! ```yaml
//! forum_domain: technofino.in
//! request_timeout_secs: 30
//! pacing_ms: 100
//! generator:
//!   api_base: https://api.openai.com/v1
//!   model: gpt-4o-mini
//!   max_retries: 3
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// The only forum host (and its subdomains) a harvest will touch.
    pub forum_domain: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Stagger between dispatching consecutive page requests.
    pub pacing_ms: u64,
    pub generator: GeneratorConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            forum_domain: "technofino.in".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            pacing_ms: 100,
            generator: GeneratorConfig::default(),
        }
    }
}

impl HarvestConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Settings for the OpenAI-compatible summarization endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub api_base: String,
    pub model: String,
    pub max_retries: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_retries: 3,
        }
    }
}

/// Load the config at `path`, or defaults when no path is given.
#[instrument(level = "info")]
pub async fn load_config(path: Option<&str>) -> Result<HarvestConfig, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(HarvestConfig::default());
    };
    let raw = tokio::fs::read_to_string(path).await?;
    let config = parse_config(&raw)?;
    info!(path, domain = %config.forum_domain, "Loaded configuration");
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<HarvestConfig, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(HarvestConfig::default());
    }
    serde_yaml::from_str(raw)
}

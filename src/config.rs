use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::url::{placeholders, validate_template};

fn default_timeout_secs() -> u64 {
    30
}

/// Endpoint and tuning configuration, matching `api-config.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub general: GeneralConfig,
    pub user: UserEndpoint,
    pub puzzle: Endpoint,
    pub info: InfoEndpoint,
    pub stats: Endpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Maximum simultaneous in-flight requests.
    pub threads: usize,
    /// Maximum requests dispatched in any one-second window.
    pub qps: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Identity lookup: a POST of `query` to `url`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEndpoint {
    pub url: String,
    #[serde(default)]
    pub query: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Puzzle metadata listing, queried one date window at a time.
#[derive(Debug, Clone, Deserialize)]
pub struct InfoEndpoint {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "max-chunk-size")]
    pub max_chunk_size: usize,
}

impl ApiConfig {
    /// Read and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: ApiConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.general.threads == 0 {
            return Err(Error::Config("general.threads must be at least 1".into()));
        }
        if self.general.qps == 0 {
            return Err(Error::Config("general.qps must be at least 1".into()));
        }
        if self.general.timeout_secs == 0 {
            return Err(Error::Config("general.timeout_secs must be at least 1".into()));
        }
        if self.info.max_chunk_size == 0 {
            return Err(Error::Config("info.max-chunk-size must be at least 1".into()));
        }
        for (name, url) in [
            ("user", &self.user.url),
            ("puzzle", &self.puzzle.url),
            ("info", &self.info.url),
            ("stats", &self.stats.url),
        ] {
            validate_template(url).map_err(|e| Error::Config(format!("{name}.url: {e}")))?;
        }
        if !placeholders(&self.stats.url).iter().any(|p| p == "puzzle_id") {
            return Err(Error::Config(
                "stats.url must contain a {puzzle_id} placeholder".into(),
            ));
        }
        Ok(())
    }
}

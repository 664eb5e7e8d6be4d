//! Relay configuration: built-in defaults, an optional TOML file, then CLI
//! overrides. The upstream credential only ever comes from the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::error::RelayError;
use crate::providers::{GEMINI_BASE_URL, GEMINI_DEFAULT_MODEL};

/// Environment variable holding the upstream API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    pub model: String,
    pub upstream_url: String,
    /// Bound on the single outbound call, in seconds.
    pub timeout_secs: u64,
    /// Bound on reading one inbound request, in seconds.
    pub read_timeout_secs: u64,
    /// Never serialized; populated from [`API_KEY_ENV`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8888,
            model: GEMINI_DEFAULT_MODEL.to_string(),
            upstream_url: GEMINI_BASE_URL.to_string(),
            timeout_secs: 30,
            read_timeout_secs: 15,
            api_key: None,
        }
    }
}

impl RelayConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, RelayError> {
        toml::from_str(contents).map_err(|e| RelayError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Resolve the effective configuration for a run of the binary.
    pub fn load(args: &Args) -> Result<Self, RelayError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        config.validate()?;
        Ok(config)
    }

    /// CLI flags win over file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = &args.bind {
            self.bind = bind.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(url) = &args.upstream_url {
            self.upstream_url = url.clone();
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout_secs = secs;
        }
        if let Some(secs) = args.read_timeout_secs {
            self.read_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.model.trim().is_empty() {
            return Err(RelayError::Config("model must not be empty".to_string()));
        }
        if !self.upstream_url.starts_with("http://") && !self.upstream_url.starts_with("https://") {
            return Err(RelayError::Config(format!(
                "upstream_url must be an http(s) URL, got '{}'",
                self.upstream_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(RelayError::Config("timeout_secs must be at least 1".to_string()));
        }
        if self.read_timeout_secs == 0 {
            return Err(RelayError::Config("read_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

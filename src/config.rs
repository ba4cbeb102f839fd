//! Configuration management for docgate.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use crate::error::{DocgateError, Result};
use crate::gate::{RateGate, TimeUnit};

/// Prefix of environment variables overriding file settings.
const ENV_PREFIX: &str = "DOCGATE";

/// Main configuration for docgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocgateConfig {
    /// Endpoint client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Endpoint client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// URL documents are posted to
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Indent the JSON request body
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_ms: default_request_timeout(),
            pretty_json: default_pretty_json(),
        }
    }
}

impl ClientConfig {
    /// Get the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_api_url() -> String {
    "https://ismp.crpt.ru/api/v3/lk/documents/create".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_pretty_json() -> bool {
    true
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests allowed per time unit
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: usize,

    /// The time unit; one unit is one window
    #[serde(default)]
    pub unit: TimeUnit,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_unit: default_requests_per_unit(),
            unit: TimeUnit::default(),
        }
    }
}

fn default_requests_per_unit() -> usize {
    10
}

impl RateLimitSettings {
    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.unit.duration()
    }

    /// Build the gate these settings describe.
    pub fn build_gate(&self) -> Result<RateGate> {
        let limit = NonZeroUsize::new(self.requests_per_unit).ok_or_else(|| {
            DocgateError::Config("rate_limit.requests_per_unit must be positive".to_string())
        })?;
        Ok(RateGate::new(limit, self.window()))
    }
}

impl DocgateConfig {
    /// Load configuration from an optional YAML file, overridden by
    /// `DOCGATE_*` environment variables (`DOCGATE_RATE_LIMIT__UNIT=minute`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        let config: DocgateConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DocgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DocgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| DocgateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.client.api_url.trim().is_empty() {
            return Err(DocgateError::Config("client.api_url must not be empty".to_string()));
        }
        if self.client.request_timeout_ms == 0 {
            return Err(DocgateError::Config(
                "client.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.rate_limit.requests_per_unit == 0 {
            return Err(DocgateError::Config(
                "rate_limit.requests_per_unit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

use crate::error::Result;
use crate::gate::ErrorPolicy;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RefreshConfig
// ---------------------------------------------------------------------------

/// Intervals for the admin dashboard refresh loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_api_usage_secs")]
    pub api_usage_seconds: u64,
    #[serde(default = "default_health_secs")]
    pub health_seconds: u64,
}

fn default_api_usage_secs() -> u64 {
    30
}

fn default_health_secs() -> u64 {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            api_usage_seconds: default_api_usage_secs(),
            health_seconds: default_health_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployed app serving `/api/entitlements` and checkout. When unset the
    /// in-memory org seed is used.
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default)]
    pub on_entitlement_error: ErrorPolicy,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            cache_ttl_seconds: default_cache_ttl(),
            on_entitlement_error: ErrorPolicy::default(),
            request_timeout_seconds: default_request_timeout(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl Config {
    /// Load `.promptforge/config.yaml`; defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Some(url) = &self.api_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("api_base_url '{url}' must start with http:// or https://"),
                });
            }
        }

        if self.request_timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "request_timeout_seconds must be greater than 0".to_string(),
            });
        }

        if self.cache_ttl_seconds > 3600 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "cache_ttl_seconds={} keeps plan changes invisible for over an hour",
                    self.cache_ttl_seconds
                ),
            });
        }

        if self.refresh.api_usage_seconds == 0 || self.refresh.health_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "refresh intervals must be greater than 0".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

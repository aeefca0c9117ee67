//! @ai:module:intent Configuration structs and candidate list construction
//! @ai:module:layer infrastructure
//! @ai:module:public_api ClientConfig, ApiConfig, TimeoutConfig, EnvOverrides, DEFAULT_API_URL
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Loopback backend used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5050";

pub const ENV_API_URL: &str = "VISIONTAGS_API_URL";
pub const ENV_API_URLS: &str = "VISIONTAGS_API_URLS";
pub const ENV_SKIP_HEALTH_PROBE: &str = "VISIONTAGS_SKIP_HEALTH_PROBE";

/// @ai:intent Main configuration for the client
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// @ai:intent Backend location and request identity
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub skip_health_probe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// @ai:intent Per-operation timeouts in milliseconds
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_probe_ms")]
    pub probe_ms: u64,
    #[serde(default = "default_health_ms")]
    pub health_ms: u64,
    #[serde(default = "default_analyze_ms")]
    pub analyze_ms: u64,
    #[serde(default = "default_feedback_ms")]
    pub feedback_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe_ms: default_probe_ms(),
            health_ms: default_health_ms(),
            analyze_ms: default_analyze_ms(),
            feedback_ms: default_feedback_ms(),
        }
    }
}

fn default_probe_ms() -> u64 {
    5_000
}

fn default_health_ms() -> u64 {
    15_000
}

fn default_analyze_ms() -> u64 {
    180_000
}

fn default_feedback_ms() -> u64 {
    10_000
}

impl TimeoutConfig {
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn health(&self) -> Duration {
        Duration::from_millis(self.health_ms)
    }

    pub fn analyze(&self) -> Duration {
        Duration::from_millis(self.analyze_ms)
    }

    pub fn feedback(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }
}

/// @ai:intent Environment-style overrides, captured once at startup
/// @ai:effects pure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub api_url: Option<String>,
    pub api_urls: Vec<String>,
    pub skip_health_probe: bool,
}

impl EnvOverrides {
    /// @ai:intent Read overrides from the process environment
    /// @ai:effects env
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// @ai:intent Build overrides from an arbitrary key lookup
    /// @ai:effects pure
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup(ENV_API_URL)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let api_urls = lookup(ENV_API_URLS)
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let skip_health_probe = lookup(ENV_SKIP_HEALTH_PROBE)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            api_url,
            api_urls,
            skip_health_probe,
        }
    }
}

impl ClientConfig {
    /// @ai:intent Load configuration from a TOML file
    /// @ai:pre path exists and is readable
    /// @ai:effects fs:read
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// @ai:intent Save configuration to a TOML file
    /// @ai:effects fs:write
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// @ai:intent Ordered, deduplicated base URL candidates
    /// @ai:post result is non-empty and ends with the loopback fallback unless already present
    /// @ai:effects pure
    pub fn candidates(&self, env: &EnvOverrides) -> Vec<String> {
        let ordered = self
            .api
            .url
            .iter()
            .chain(self.api.urls.iter())
            .chain(env.api_url.iter())
            .chain(env.api_urls.iter())
            .map(String::as_str)
            .chain(std::iter::once(DEFAULT_API_URL));

        normalize_candidates(ordered)
    }

    /// @ai:intent Whether health probing is disabled by file or environment
    /// @ai:effects pure
    pub fn skip_health_probe(&self, env: &EnvOverrides) -> bool {
        self.api.skip_health_probe || env.skip_health_probe
    }
}

/// @ai:intent Trim, drop empties, strip trailing slashes and keep first occurrences
/// @ai:effects pure
pub fn normalize_candidates<'a, I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = Vec::new();

    for candidate in raw {
        let trimmed = candidate.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        if !out.iter().any(|existing| existing == trimmed) {
            out.push(trimmed.to_string());
        }
    }

    out
}

//! @ai:module:intent Pick and memoize the backend base URL
//! @ai:module:layer application
//! @ai:module:public_api ApiResolver, HealthProbe, ResolveOptions, MockProbe
//! @ai:module:stateless false

use crate::client::signal::AbortSignal;
use crate::config::{normalize_candidates, ClientConfig, EnvOverrides, DEFAULT_API_URL};
use crate::error::{Error, Operation, Result};
use std::collections::HashSet;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Per-candidate probe timeout when the caller does not pick one.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// @ai:intent Trait for checking whether a base URL is reachable
pub trait HealthProbe: Send + Sync {
    /// @ai:intent Probe `<base>/health`, honoring the signal and timeout
    fn probe(
        &self,
        base: &str,
        signal: Option<AbortSignal>,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// @ai:intent Inputs for one resolution attempt
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub candidates: Option<Vec<String>>,
    pub signal: Option<AbortSignal>,
    pub timeout: Option<Duration>,
}

/// @ai:intent Candidate list plus the memoized selected base
#[derive(Debug)]
pub struct ApiResolver {
    candidates: Vec<String>,
    skip_health_probe: bool,
    selected: RwLock<Option<String>>,
}

impl ApiResolver {
    /// @ai:intent Create a resolver over an ordered candidate list
    /// @ai:post candidate list is non-empty
    /// @ai:effects pure
    pub fn new(candidates: Vec<String>, skip_health_probe: bool) -> Self {
        let mut candidates = normalize_candidates(candidates.iter().map(String::as_str));
        if candidates.is_empty() {
            candidates.push(DEFAULT_API_URL.to_string());
        }

        Self {
            candidates,
            skip_health_probe,
            selected: RwLock::new(None),
        }
    }

    /// @ai:intent Build a resolver from file configuration and environment overrides
    /// @ai:effects pure
    pub fn from_config(config: &ClientConfig, env: &EnvOverrides) -> Self {
        Self::new(config.candidates(env), config.skip_health_probe(env))
    }

    pub fn skip_health_probe(&self) -> bool {
        self.skip_health_probe
    }

    /// @ai:intent Candidates still in play: the selection alone once made
    /// @ai:effects pure
    pub fn candidates(&self) -> Vec<String> {
        match self.selected() {
            Some(selected) => vec![selected],
            None => self.candidates.clone(),
        }
    }

    pub fn selected(&self) -> Option<String> {
        self.selected
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// @ai:intent Install a base explicitly, bypassing probing
    /// @ai:effects state:write
    pub fn set_api_url(&self, url: impl Into<String>) {
        let url = url.into();
        let url = url.trim().trim_end_matches('/').to_string();
        tracing::info!("Using API base {}", url);
        *self
            .selected
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(url);
    }

    /// @ai:intent Forget the selection so the next resolve probes again
    /// @ai:effects state:write
    pub fn reset(&self) {
        *self
            .selected
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// @ai:intent Base used for building request URLs
    /// @ai:effects pure
    pub fn current_base(&self) -> String {
        self.selected()
            .or_else(|| self.candidates.first().cloned())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// @ai:intent Select the first candidate that answers its health probe
    /// @ai:post on success the returned base is selected
    /// @ai:post on NoReachableBase the first candidate is selected
    /// @ai:effects network, state:write
    pub async fn resolve<P: HealthProbe>(&self, probe: &P, opts: ResolveOptions) -> Result<String> {
        if let Some(selected) = self.selected() {
            return Ok(selected);
        }

        let candidates = match opts.candidates {
            Some(list) if !list.is_empty() => {
                normalize_candidates(list.iter().map(String::as_str))
            }
            _ => self.candidates.clone(),
        };
        let first = candidates
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        if self.skip_health_probe {
            self.set_api_url(first.clone());
            return Ok(first);
        }

        let timeout = opts.timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT);

        for base in &candidates {
            match probe.probe(base, opts.signal.clone(), timeout).await {
                Ok(()) => {
                    self.set_api_url(base.clone());
                    return Ok(base.clone());
                }
                Err(e) => {
                    tracing::warn!("Health probe for {} failed: {}", base, e);
                }
            }
        }

        self.set_api_url(first);
        Err(Error::NoReachableBase { tried: candidates })
    }
}

/// @ai:intent Probe double that answers from a fixed set of healthy bases
#[derive(Debug, Default)]
pub struct MockProbe {
    healthy: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockProbe {
    /// @ai:intent Create a probe where only `healthy` bases succeed
    /// @ai:effects pure
    pub fn new<I, S>(healthy: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            healthy: healthy.into_iter().map(Into::into).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// @ai:intent Bases probed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl HealthProbe for MockProbe {
    async fn probe(&self, base: &str, signal: Option<AbortSignal>, _timeout: Duration) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(base.to_string());

        if signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Err(Error::Canceled {
                operation: Operation::Health,
            });
        }

        if self.healthy.contains(base) {
            Ok(())
        } else {
            Err(Error::Http {
                operation: Operation::Health,
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            })
        }
    }
}

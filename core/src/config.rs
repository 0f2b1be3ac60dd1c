//! Gateway configuration.

use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// LAN address of the backend, reachable from a physical device.
pub const DEFAULT_FALLBACK_URL: &str = "http://192.168.100.4:4022/api";

/// Applied to every request issued through the gateway.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_BASE_URL: &str = "BANK_API_URL";
pub const ENV_FALLBACK_URL: &str = "BANK_API_FALLBACK_URL";
pub const ENV_TIMEOUT_SECS: &str = "BANK_API_TIMEOUT_SECS";
pub const ENV_PIN_FALLBACK: &str = "BANK_API_PIN_FALLBACK";

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base endpoint override, e.g. an emulator address.
    pub base_url_override: Option<String>,

    /// Address the gateway rebinds to after a connectivity failure.
    pub fallback_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Start on the fallback address even when an override is set.
    pub pin_fallback: bool,
}

impl GatewayConfig {
    pub fn new(fallback_url: &str) -> Self {
        Self {
            base_url_override: None,
            fallback_url: normalize(fallback_url),
            timeout: DEFAULT_TIMEOUT,
            pin_fallback: false,
        }
    }

    /// Read configuration from the process environment.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fallback_url = lookup(ENV_FALLBACK_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FALLBACK_URL.to_string());

        let timeout_secs: u64 = lookup(ENV_TIMEOUT_SECS)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT.as_secs());

        let pin_fallback = lookup(ENV_PIN_FALLBACK)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self::new(&fallback_url)
            .with_base_url_override(lookup(ENV_BASE_URL))
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_pin_fallback(pin_fallback)
    }

    pub fn with_base_url_override(mut self, base_url: Option<String>) -> Self {
        self.base_url_override = base_url
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize(&v));
        self
    }

    pub fn with_base_url(self, base_url: &str) -> Self {
        self.with_base_url_override(Some(base_url.to_string()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pin_fallback(mut self, pin: bool) -> Self {
        self.pin_fallback = pin;
        self
    }

    /// The base endpoint the gateway starts on.
    ///
    /// An override wins over the fallback unless `pin_fallback` is set.
    pub fn resolve_base_url(&self) -> String {
        if self.pin_fallback {
            return self.fallback_url.clone();
        }
        self.base_url_override
            .clone()
            .unwrap_or_else(|| self.fallback_url.clone())
    }

    /// Reject addresses the transport could never reach and a zero timeout.
    pub fn validate(&self) -> GatewayResult<()> {
        check_url("fallback url", &self.fallback_url)?;
        if let Some(url) = &self.base_url_override {
            check_url("base url", url)?;
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::Config("timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_URL)
    }
}

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn check_url(what: &str, url: &str) -> GatewayResult<()> {
    if url.is_empty() {
        return Err(GatewayError::Config(format!("{what} is empty")));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(GatewayError::Config(format!("{what} must be http(s): {url}")));
    }
    Ok(())
}

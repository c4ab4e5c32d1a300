//! Transport configuration.
//!
//! Configuration comes in three layers that are merged per request with the
//! precedence **per-call > per-store > global**. The global layer is an
//! explicit value (usually [`TransportConfig::from_env`]) threaded into store
//! construction; there is no process-wide mutable default.
//!
//! # Example
//!
//! ```
//! use composable_resource_core::config::TransportConfig;
//! use std::time::Duration;
//!
//! let global = TransportConfig::default().with_base_url("https://api.example.com");
//! let store = TransportConfig::default().with_timeout(Duration::from_secs(5));
//! let call = TransportConfig::default().with_header("x-trace", "abc");
//!
//! let effective = global.merge(&store).merge(&call);
//! assert_eq!(effective.base_url.as_deref(), Some("https://api.example.com"));
//! assert_eq!(effective.timeout, Some(Duration::from_secs(5)));
//! assert_eq!(effective.headers.get("x-trace").map(String::as_str), Some("abc"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the global base URL
pub const BASE_URL_VAR: &str = "RESOURCE_BASE_URL";

/// Environment variable holding the global timeout in milliseconds
pub const TIMEOUT_MS_VAR: &str = "RESOURCE_TIMEOUT_MS";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },
}

/// One layer of transport settings. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Prefix joined in front of every request URL
    pub base_url: Option<String>,
    /// Extra headers; higher layers override per header name
    pub headers: BTreeMap<String, String>,
    /// Request timeout enforced by the transport
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overlay `higher` on top of `self`; `higher` wins wherever it is set.
    #[must_use]
    pub fn merge(&self, higher: &Self) -> Self {
        let mut headers = self.headers.clone();
        headers.extend(higher.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            base_url: higher.base_url.clone().or_else(|| self.base_url.clone()),
            headers,
            timeout: higher.timeout.or(self.timeout),
        }
    }

    /// Join the base URL (if any) with a request URL.
    #[must_use]
    pub fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            },
            _ => url.to_string(),
        }
    }

    /// Load the global layer from `RESOURCE_BASE_URL` and `RESOURCE_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the timeout is not an integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load the global layer through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the timeout is not an integer.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(base_url) = lookup(BASE_URL_VAR).filter(|v| !v.is_empty()) {
            config.base_url = Some(base_url);
        }
        if let Some(raw) = lookup(TIMEOUT_MS_VAR) {
            let millis = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                var: TIMEOUT_MS_VAR.to_string(),
                value: raw.clone(),
            })?;
            config.timeout = Some(Duration::from_millis(millis));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_layer_wins_per_field() {
        let global = TransportConfig::default()
            .with_base_url("https://global")
            .with_header("a", "global")
            .with_header("b", "global");
        let store = TransportConfig::default().with_header("a", "store");
        let call = TransportConfig::default()
            .with_base_url("https://call")
            .with_header("b", "call");

        let effective = global.merge(&store).merge(&call);
        assert_eq!(effective.base_url.as_deref(), Some("https://call"));
        assert_eq!(effective.headers["a"], "store");
        assert_eq!(effective.headers["b"], "call");
        assert_eq!(effective.timeout, None);
    }

    #[test]
    fn resolve_url_joins_without_double_slash() {
        let config = TransportConfig::default().with_base_url("https://api.test/");
        assert_eq!(config.resolve_url("/posts/"), "https://api.test/posts/");
        assert_eq!(config.resolve_url("https://other/x"), "https://other/x");
        assert_eq!(TransportConfig::default().resolve_url("/x"), "/x");
    }

    #[test]
    fn from_lookup_parses_variables() {
        let config = TransportConfig::from_lookup(|var| match var {
            BASE_URL_VAR => Some("https://env".to_string()),
            TIMEOUT_MS_VAR => Some("250".to_string()),
            _ => None,
        })
        .unwrap_or_default();
        assert_eq!(config.base_url.as_deref(), Some("https://env"));
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let result = TransportConfig::from_lookup(|var| {
            (var == TIMEOUT_MS_VAR).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}

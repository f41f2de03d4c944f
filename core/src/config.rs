//! Client configuration.
//!
//! `ClientConfig` deserializes from JSON (every field optional, defaults
//! below) or reads `VSAPI_*` environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ApiError;
use crate::request::{Credentials, Endpoint, Protocol, DEFAULT_API_PREFIX};
use crate::retry::{
    RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_REUSE_DELAY,
    DEFAULT_REUSE_RETRY_CEILING,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub user: String,
    pub password: String,
    pub api_prefix: String,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub reuse_retry_ceiling: u32,
    pub reuse_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            https: false,
            user: String::new(),
            password: String::new(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
            reuse_retry_ceiling: DEFAULT_REUSE_RETRY_CEILING,
            reuse_delay_ms: DEFAULT_REUSE_DELAY.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        serde_json::from_str(json).map_err(|e| ApiError::Config(e.to_string()))
    }

    /// Defaults overridden by `VSAPI_HOST`, `VSAPI_PORT`, `VSAPI_HTTPS`,
    /// `VSAPI_USER` and `VSAPI_PASSWORD` where set.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut config = ClientConfig::default();
        if let Some(host) = lookup("VSAPI_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("VSAPI_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ApiError::Config(format!("VSAPI_PORT is not a port: {port:?}")))?;
        }
        if let Some(https) = lookup("VSAPI_HTTPS") {
            config.https = match https.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ApiError::Config(format!(
                        "VSAPI_HTTPS is not a boolean: {https:?}"
                    )))
                }
            };
        }
        if let Some(user) = lookup("VSAPI_USER") {
            config.user = user;
        }
        if let Some(password) = lookup("VSAPI_PASSWORD") {
            config.password = password;
        }
        Ok(config)
    }

    pub fn endpoint(&self) -> Endpoint {
        let protocol = if self.https {
            Protocol::Https
        } else {
            Protocol::Http
        };
        Endpoint::new(self.host.clone(), self.port, protocol).with_prefix(&self.api_prefix)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.user.clone(), self.password.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            reuse_ceiling: self.reuse_retry_ceiling,
            reuse_delay: Duration::from_millis(self.reuse_delay_ms),
        }
    }
}

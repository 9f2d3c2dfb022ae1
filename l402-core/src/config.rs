//! Engine configuration.
//!
//! [`L402Config`] is built once at startup (with the builder or by deserializing a
//! camelCase JSON/TOML document), validated, and then shared read-only as
//! `Arc<L402Config>` by every component.

use std::{fmt::Debug, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Minimum invoice price accepted by [`L402Config::validate`].
pub const MIN_PRICE_SATS: u64 = 1;

/// Maximum token lifetime accepted by [`L402Config::validate`].
pub const MAX_TIMEOUT_SECONDS: u64 = 10_000;

pub const DEFAULT_AUTH_SCHEME: &str = "L402";
pub const DEFAULT_TOKEN_SEPARATOR: &str = ":";
pub const DEFAULT_DESCRIPTION: &str = "L402 API Access Token";
pub const DEFAULT_MAX_TOKEN_USES: u64 = 1000;

/// The HMAC root key. Never printed or serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_string())
    }
}

/// Deployment mode. Development responses include error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Bounded retry policy for payment oracle calls.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total number of attempts.
    #[builder(default = 3)]
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for every further attempt.
    #[builder(default = 1000)]
    pub base_delay_ms: u64,
    /// Per-attempt timeout.
    #[builder(default = 5000)]
    pub timeout_ms: u64,
    /// Add up to 50% random delay to every backoff.
    #[builder(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::builder().build()
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// L402 engine configuration.
///
/// ```
/// use l402_core::config::L402Config;
///
/// let config = L402Config::builder()
///     .secret("a-long-random-secret")
///     .price_sats(1000)
///     .timeout_seconds(3600)
///     .service_name("video")
///     .capabilities(vec!["stream".to_string()])
///     .build();
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.auth_scheme, "L402");
/// ```
#[derive(Builder, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L402Config {
    /// HMAC root key for the macaroon signature chain. Read from config but never written.
    #[builder(into)]
    #[serde(skip_serializing)]
    pub secret: Secret,
    /// Invoice amount for a challenge.
    pub price_sats: u64,
    /// Token lifetime.
    pub timeout_seconds: u64,
    /// Name of the protected service; becomes the macaroon location.
    #[builder(into)]
    pub service_name: String,
    /// Minimum tier a token must carry.
    #[builder(default)]
    #[serde(default)]
    pub default_tier: u32,
    /// Capabilities granted to minted tokens. At least one is required.
    #[builder(default)]
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Invoice description.
    #[builder(into, default = DEFAULT_DESCRIPTION.to_string())]
    #[serde(default = "default_description")]
    pub description: String,
    /// Identifier of the signing key, embedded in every minted identifier.
    #[builder(into, default = random_key_id())]
    #[serde(default = "random_key_id")]
    pub key_id: String,
    /// Uses allowed per token unless overridden at mint time.
    #[builder(default = DEFAULT_MAX_TOKEN_USES)]
    #[serde(default = "default_max_token_uses")]
    pub max_token_uses: u64,
    #[builder(default)]
    #[serde(default)]
    pub retry_config: RetryConfig,
    /// Authorization scheme name.
    #[builder(into, default = DEFAULT_AUTH_SCHEME.to_string())]
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    /// Separator between macaroon and preimage in the `Authorization` header.
    #[builder(into, default = DEFAULT_TOKEN_SEPARATOR.to_string())]
    #[serde(default = "default_token_separator")]
    pub token_separator: String,
    #[builder(default)]
    #[serde(default)]
    pub environment: Environment,
}

impl L402Config {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(Error::InvalidConfig("Invalid secret key".to_string()));
        }
        if self.price_sats < MIN_PRICE_SATS {
            return Err(Error::InvalidConfig(format!(
                "Price must be >= {MIN_PRICE_SATS}"
            )));
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(Error::InvalidConfig(
                "Invalid timeout configuration".to_string(),
            ));
        }
        if self.service_name.trim().is_empty() {
            return Err(Error::InvalidConfig("Service name is required".to_string()));
        }
        if self.capabilities.is_empty() || self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "At least one capability is required".to_string(),
            ));
        }
        if self.max_token_uses == 0 {
            return Err(Error::InvalidConfig(
                "Max token uses must be positive".to_string(),
            ));
        }
        if self.retry_config.max_retries == 0 || self.retry_config.timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "Invalid retry configuration".to_string(),
            ));
        }
        if self.auth_scheme.is_empty() || self.auth_scheme.contains(char::is_whitespace) {
            return Err(Error::InvalidConfig("Invalid auth scheme".to_string()));
        }
        if self.token_separator.is_empty() {
            return Err(Error::InvalidConfig(
                "Token separator is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn random_key_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

fn default_max_token_uses() -> u64 {
    DEFAULT_MAX_TOKEN_USES
}

fn default_auth_scheme() -> String {
    DEFAULT_AUTH_SCHEME.to_string()
}

fn default_token_separator() -> String {
    DEFAULT_TOKEN_SEPARATOR.to_string()
}

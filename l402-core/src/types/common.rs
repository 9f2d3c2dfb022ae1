//! Miscellaneous common types used throughout the L402 codebase.

use std::fmt::Display;

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::errors::{Error, Result};

/// A base64url (unpadded) encoded JSON document, as carried in tokens and identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Base64UrlJson(pub String);

impl Base64UrlJson {
    /// Serialize `value` to JSON and encode it.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_vec(value)
            .map_err(|err| Error::InvalidMacaroon(format!("Failed to serialize: {err}")))?;
        Ok(Base64UrlJson(BASE64_URL_SAFE_NO_PAD.encode(json)))
    }

    /// Decode into an untyped JSON value.
    pub fn decode_value(&self) -> Result<serde_json::Value> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(self.0.trim_end_matches('='))
            .map_err(|err| Error::InvalidMacaroon(format!("Invalid base64url: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| Error::InvalidMacaroon(format!("Invalid JSON payload: {err}")))
    }

    /// Decode into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.decode_value()?)
            .map_err(|err| Error::InvalidMacaroon(format!("Unexpected payload: {err}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Base64UrlJson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Base64UrlJson {
    fn from(value: String) -> Self {
        Base64UrlJson(value)
    }
}

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::Result, types::Base64UrlJson};

/// Current identifier format version.
pub const IDENTIFIER_VERSION: u8 = 1;

/// The signed identity of a macaroon, bound to a payment hash.
///
/// Carried base64url-encoded in [`Macaroon::identifier`](crate::types::Macaroon::identifier)
/// and never trusted before the signature chain has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacaroonIdentifier {
    pub version: u8,
    pub token_id: String,
    pub user_id: String,
    pub key_id: String,
    pub payment_hash: String,
    pub issued_at: DateTime<Utc>,
    /// Access tier, signed here so `restrictions.tier` cannot be raised by the holder.
    #[serde(default)]
    pub tier: u32,
}

impl MacaroonIdentifier {
    /// A fresh identifier with random token and user ids.
    pub fn new(payment_hash: impl Into<String>, key_id: impl Into<String>) -> Self {
        MacaroonIdentifier {
            version: IDENTIFIER_VERSION,
            token_id: hex::encode(rand::random::<[u8; 16]>()),
            user_id: hex::encode(rand::random::<[u8; 32]>()),
            key_id: key_id.into(),
            payment_hash: payment_hash.into(),
            issued_at: Utc::now().trunc_subsecs(3),
            tier: 0,
        }
    }

    pub fn with_tier(mut self, tier: u32) -> Self {
        self.tier = tier;
        self
    }

    pub fn encode(&self) -> Result<String> {
        Ok(Base64UrlJson::encode(self)?.0)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        Base64UrlJson(encoded.to_string()).decode()
    }
}

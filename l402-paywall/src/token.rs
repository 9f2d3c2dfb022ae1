use chrono::{DateTime, Utc};
use l402_core::macaroon::VerifiedMacaroon;

/// The token of an authorized request, attached to the request extensions before the
/// handler runs.
///
/// Lives only as long as the request; never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct L402Token {
    /// The presented macaroon, as sent by the client.
    pub macaroon: String,
    pub preimage: String,
    pub payment_hash: String,
    pub token_id: String,
    pub key_id: String,
    pub version: u8,
    pub expires_at: DateTime<Utc>,
    pub capabilities: Vec<String>,
    /// Redemptions recorded so far, including this request.
    pub usage_count: u64,
}

impl L402Token {
    pub(crate) fn new(
        macaroon: String,
        preimage: String,
        verified: &VerifiedMacaroon,
        usage_count: u64,
    ) -> Self {
        let restrictions = &verified.macaroon.restrictions;
        L402Token {
            macaroon,
            preimage,
            payment_hash: verified.identifier.payment_hash.clone(),
            token_id: verified.identifier.token_id.clone(),
            key_id: verified.identifier.key_id.clone(),
            version: verified.identifier.version,
            expires_at: restrictions.expires_at,
            capabilities: restrictions.capabilities.clone(),
            usage_count,
        }
    }
}

impl std::fmt::Debug for L402Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L402Token")
            .field("macaroon", &"[REDACTED]")
            .field("preimage", &"[REDACTED]")
            .field("payment_hash", &self.payment_hash)
            .field("token_id", &self.token_id)
            .field("key_id", &self.key_id)
            .field("version", &self.version)
            .field("expires_at", &self.expires_at)
            .field("capabilities", &self.capabilities)
            .field("usage_count", &self.usage_count)
            .finish()
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    types::{AuthCaveat, Caveat, MacaroonIdentifier, TimeCaveat, TypedCaveat, UsageCaveat},
};

/// A caveat discharged by a third party. Present as an extension point only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThirdPartyCaveat {
    pub location: String,
    pub identifier: String,
    /// Base64url HMAC of the identifier under the root key.
    pub verification_key: String,
}

impl ThirdPartyCaveat {
    /// Canonical bytes folded into the chain.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::json!({
            "location": self.location,
            "identifier": self.identifier,
            "verificationKey": self.verification_key,
        })
        .to_string()
        .into_bytes()
    }
}

/// A bearer credential restricted by a hash-chained list of caveats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macaroon {
    /// Base64url-encoded [`MacaroonIdentifier`].
    pub identifier: String,
    /// Issuing service.
    pub location: String,
    pub caveats: Vec<Caveat>,
    #[serde(default)]
    pub third_party_caveats: Vec<ThirdPartyCaveat>,
    /// Base64url final chain value.
    pub signature: String,
}

impl Macaroon {
    pub fn decode_identifier(&self) -> Result<MacaroonIdentifier> {
        MacaroonIdentifier::decode(&self.identifier).map_err(|err| {
            Error::InvalidMacaroonStructure(format!("Undecodable identifier: {err}"))
        })
    }

    /// Decode every caveat into its typed view.
    pub fn typed_caveats(&self) -> Result<Vec<TypedCaveat>> {
        self.caveats.iter().map(Caveat::typed).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub hash: String,
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
}

/// Denormalized, directly checkable mirror of the L402 caveats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restrictions {
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u64>,
    pub service: String,
    pub tier: u32,
    pub capabilities: Vec<String>,
}

/// A macaroon minted for an L402 payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L402Macaroon {
    #[serde(flatten)]
    pub macaroon: Macaroon,
    pub payment_info: PaymentInfo,
    pub restrictions: Restrictions,
}

impl L402Macaroon {
    /// Fields that must be present and non-empty in a presented token.
    pub const REQUIRED_FIELDS: [&str; 6] = [
        "identifier",
        "location",
        "caveats",
        "signature",
        "paymentInfo",
        "restrictions",
    ];

    /// Check that the unsigned `paymentInfo` and `restrictions` agree with the signed
    /// identifier and caveats.
    ///
    /// Must only be called after the signature chain has been verified.
    pub fn check_consistency(&self, identifier: &MacaroonIdentifier) -> Result<()> {
        let mismatch = |what: &str| {
            Error::InvalidMacaroonStructure(format!("{what} disagrees with signed caveats"))
        };

        if self.payment_info.hash != identifier.payment_hash {
            return Err(mismatch("paymentInfo.hash"));
        }
        if self.restrictions.tier != identifier.tier {
            return Err(mismatch("restrictions.tier"));
        }

        let mut expirations = Vec::new();
        let mut services = Vec::new();
        let mut capabilities = BTreeSet::new();
        let mut limits = Vec::new();

        for caveat in self.macaroon.typed_caveats()? {
            match caveat {
                TypedCaveat::Time(TimeCaveat::Expiration { at, .. }) => expirations.push(at),
                TypedCaveat::Auth(AuthCaveat::ServiceCapability { service, .. }) => {
                    services.push(service)
                }
                TypedCaveat::Auth(AuthCaveat::Capability { capability, .. }) => {
                    capabilities.insert(capability);
                }
                TypedCaveat::Usage(UsageCaveat::RequestLimit { limit, .. }) => limits.push(limit),
            }
        }

        if expirations != [self.restrictions.expires_at] {
            return Err(mismatch("restrictions.expiresAt"));
        }
        if services != [self.restrictions.service.as_str()] {
            return Err(mismatch("restrictions.service"));
        }
        let mirrored: BTreeSet<String> = self.restrictions.capabilities.iter().cloned().collect();
        if capabilities != mirrored {
            return Err(mismatch("restrictions.capabilities"));
        }
        if limits != self.restrictions.max_uses.into_iter().collect::<Vec<_>>() {
            return Err(mismatch("restrictions.maxUses"));
        }

        Ok(())
    }
}

use bon::Builder;
use chrono::{DateTime, SubsecRound, Utc};

use crate::{
    config::Secret,
    errors::{Error, Result},
    macaroon::chain::{SignatureChain, third_party_verification_key},
    types::{
        Caveat, CaveatCondition, L402Macaroon, Macaroon, MacaroonIdentifier, PaymentInfo,
        Restrictions, ThirdPartyCaveat, TypedCaveat,
    },
};

/// Parameters for [`MacaroonBuilder::build_l402_macaroon`].
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct L402BuildParams {
    /// Amount paid for the token, in satoshis.
    pub payment_amount: u64,
    #[builder(into)]
    pub service: String,
    #[builder(default)]
    pub capabilities: Vec<String>,
    pub max_uses: Option<u64>,
    pub expires_at: DateTime<Utc>,
}

/// Accumulates the parts of a macaroon; signatures are computed by [`build`](Self::build).
///
/// Every `with_*` method consumes the builder and returns the extended one, so a
/// partially built macaroon can be cloned and extended in different directions.
///
/// ```
/// use l402_core::{
///     config::Secret,
///     macaroon::{MacaroonBuilder, verify_signature_chain},
///     types::{CaveatCondition, MacaroonIdentifier, Operator},
/// };
///
/// let secret = Secret::from("root-key");
/// let macaroon = MacaroonBuilder::new(&secret)
///     .with_location("video")
///     .with_identifier(&MacaroonIdentifier::new("00".repeat(32), "key-1"))
///     .unwrap()
///     .with_caveat(CaveatCondition::new("auth", "capability", Operator::Eq, "stream"))
///     .build()
///     .unwrap();
///
/// assert!(verify_signature_chain(secret.expose(), &macaroon).is_ok());
/// ```
#[derive(Clone)]
pub struct MacaroonBuilder {
    root_key: Vec<u8>,
    location: Option<String>,
    identifier: Option<String>,
    conditions: Vec<CaveatCondition>,
    third_party_caveats: Vec<ThirdPartyCaveat>,
}

impl std::fmt::Debug for MacaroonBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacaroonBuilder")
            .field("location", &self.location)
            .field("identifier", &self.identifier)
            .field("conditions", &self.conditions)
            .field("third_party_caveats", &self.third_party_caveats)
            .finish_non_exhaustive()
    }
}

impl MacaroonBuilder {
    pub fn new(secret: &Secret) -> Self {
        MacaroonBuilder {
            root_key: secret.expose().to_vec(),
            location: None,
            identifier: None,
            conditions: Vec::new(),
            third_party_caveats: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_identifier(self, identifier: &MacaroonIdentifier) -> Result<Self> {
        Ok(self.with_encoded_identifier(identifier.encode()?))
    }

    /// Use an already encoded identifier verbatim.
    pub fn with_encoded_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_caveat(mut self, condition: impl Into<CaveatCondition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn with_third_party_caveat(
        mut self,
        location: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        let identifier = identifier.into();
        self.third_party_caveats.push(ThirdPartyCaveat {
            location: location.into(),
            verification_key: third_party_verification_key(&self.root_key, &identifier),
            identifier,
        });
        self
    }

    /// Sign every caveat in order and produce the macaroon.
    ///
    /// Fails with [`Error::InvalidMacaroon`] without a location, an identifier, or at least
    /// one caveat.
    pub fn build(self) -> Result<Macaroon> {
        let location = self
            .location
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidMacaroon("Location is required".to_string()))?;
        let identifier = self
            .identifier
            .filter(|i| !i.is_empty())
            .ok_or_else(|| Error::InvalidMacaroon("Identifier is required".to_string()))?;
        if self.conditions.is_empty() {
            return Err(Error::InvalidMacaroon(
                "At least one caveat is required".to_string(),
            ));
        }

        let mut chain = SignatureChain::root(&self.root_key)
            .fold(location.as_bytes())
            .fold(identifier.as_bytes());

        let mut caveats = Vec::with_capacity(self.conditions.len());
        for condition in self.conditions {
            chain = chain.fold(&condition.canonical_bytes());
            caveats.push(Caveat::signed(condition, chain.to_base64()));
        }

        for caveat in &self.third_party_caveats {
            chain = chain.fold(&caveat.canonical_bytes());
        }

        Ok(Macaroon {
            identifier,
            location,
            caveats,
            third_party_caveats: self.third_party_caveats,
            signature: chain.to_base64(),
        })
    }

    /// Append the canonical L402 caveat set and build, deriving `paymentInfo` and
    /// `restrictions` from the identifier and `params`. The tier is taken from the
    /// identifier.
    ///
    /// The canonical set is `expiration<ISO8601`, `service-capability==service`, one
    /// `capability==cap` per capability and, when `max_uses` is set, `request-limit<max_uses`.
    pub fn build_l402_macaroon(self, params: L402BuildParams) -> Result<L402Macaroon> {
        let identifier = self
            .identifier
            .as_deref()
            .map(MacaroonIdentifier::decode)
            .transpose()?
            .ok_or_else(|| Error::InvalidMacaroon("Identifier is required".to_string()))?;

        let expires_at = params.expires_at.trunc_subsecs(3);

        let mut builder = self
            .with_caveat(TypedCaveat::expiration(expires_at))
            .with_caveat(TypedCaveat::service(params.service.clone()));
        for capability in &params.capabilities {
            builder = builder.with_caveat(TypedCaveat::capability(capability.clone()));
        }
        if let Some(max_uses) = params.max_uses {
            builder = builder.with_caveat(TypedCaveat::request_limit(max_uses));
        }

        let macaroon = builder.build()?;

        Ok(L402Macaroon {
            macaroon,
            payment_info: PaymentInfo {
                hash: identifier.payment_hash,
                amount: params.payment_amount,
                timestamp: identifier.issued_at,
            },
            restrictions: Restrictions {
                expires_at,
                max_uses: params.max_uses,
                service: params.service,
                tier: identifier.tier,
                capabilities: params.capabilities,
            },
        })
    }
}

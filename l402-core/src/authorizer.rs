//! Caveat evaluation against the live request context.

use std::sync::Arc;

use bon::Builder;
use chrono::{DateTime, Utc};

use crate::{
    config::L402Config,
    errors::{Error, Result},
    macaroon::VerifiedMacaroon,
    types::{
        AuthCaveat, CaveatCondition, Operator, ThirdPartyCaveat, TimeCaveat, TypedCaveat,
        UsageCaveat,
    },
};

/// Capability requested by idempotent methods.
pub const READ_CAPABILITY: &str = "read";
/// Capability requested by every other method.
pub const WRITE_CAPABILITY: &str = "write";

/// What the current request asks of a token.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    #[builder(into)]
    pub service: String,
    #[builder(into)]
    pub capability: String,
    #[builder(into, default)]
    pub endpoint: String,
    /// Redemptions recorded before this request.
    #[builder(default)]
    pub usage_count: u64,
}

impl AuthContext {
    /// `read` for `GET` and `HEAD`, `write` otherwise.
    pub fn capability_for_method(method: &str) -> &'static str {
        if method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD") {
            READ_CAPABILITY
        } else {
            WRITE_CAPABILITY
        }
    }
}

/// Discharges third-party caveats.
pub trait ThirdPartyVerifier: Send + Sync {
    fn verify(&self, caveat: &ThirdPartyCaveat, context: &AuthContext) -> Result<()>;
}

impl<T: ThirdPartyVerifier + ?Sized> ThirdPartyVerifier for Arc<T> {
    fn verify(&self, caveat: &ThirdPartyCaveat, context: &AuthContext) -> Result<()> {
        (**self).verify(caveat, context)
    }
}

/// Rejects every third-party caveat.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectThirdParty;

impl ThirdPartyVerifier for RejectThirdParty {
    fn verify(&self, caveat: &ThirdPartyCaveat, _context: &AuthContext) -> Result<()> {
        Err(Error::InvalidCaveat(format!(
            "Third-party caveat from '{}' cannot be discharged",
            caveat.location
        )))
    }
}

/// Evaluates a verified macaroon against the service policy and the request.
///
/// Checks run in a fixed order and the first failure is returned:
///
/// 1. `restrictions.service` is this service ([`Error::InvalidService`])
/// 2. `restrictions.tier` meets the configured minimum ([`Error::InvalidTier`])
/// 3. `restrictions.expiresAt` is in the future ([`Error::Expired`])
/// 4. every caveat holds ([`Error::InvalidCaveat`])
/// 5. every third-party caveat is discharged by the [`ThirdPartyVerifier`]
/// 6. the capability is granted and the usage count is under `restrictions.maxUses`
///    ([`Error::UnauthorizedCapability`], [`Error::UsageLimitExceeded`]). A token
///    granting no capabilities authorizes nothing.
#[derive(Debug, Clone)]
pub struct CaveatAuthorizer<V = RejectThirdParty> {
    config: Arc<L402Config>,
    third_party: V,
}

impl CaveatAuthorizer {
    pub fn new(config: Arc<L402Config>) -> Self {
        CaveatAuthorizer {
            config,
            third_party: RejectThirdParty,
        }
    }
}

impl<V: ThirdPartyVerifier> CaveatAuthorizer<V> {
    pub fn with_third_party_verifier<W: ThirdPartyVerifier>(
        self,
        verifier: W,
    ) -> CaveatAuthorizer<W> {
        CaveatAuthorizer {
            config: self.config,
            third_party: verifier,
        }
    }

    pub fn authorize(&self, macaroon: &VerifiedMacaroon, context: &AuthContext) -> Result<()> {
        self.authorize_at(macaroon, context, Utc::now())
    }

    pub fn authorize_at(
        &self,
        macaroon: &VerifiedMacaroon,
        context: &AuthContext,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let restrictions = &macaroon.macaroon.restrictions;

        if restrictions.service != self.config.service_name {
            return Err(Error::InvalidService {
                expected: self.config.service_name.clone(),
                actual: restrictions.service.clone(),
            });
        }
        if restrictions.tier < self.config.default_tier {
            return Err(Error::InvalidTier {
                required: self.config.default_tier,
                actual: restrictions.tier,
            });
        }
        if now >= restrictions.expires_at {
            return Err(Error::Expired(restrictions.expires_at));
        }

        self.check_caveats(&macaroon.caveats, context, now)?;

        for caveat in &macaroon.macaroon.macaroon.third_party_caveats {
            self.third_party.verify(caveat, context)?;
        }

        if !restrictions.capabilities.contains(&context.capability) {
            return Err(Error::UnauthorizedCapability(context.capability.clone()));
        }
        if let Some(limit) = restrictions.max_uses {
            if context.usage_count >= limit {
                return Err(Error::UsageLimitExceeded {
                    used: context.usage_count,
                    limit,
                });
            }
        }

        Ok(())
    }

    fn check_caveats(
        &self,
        caveats: &[TypedCaveat],
        context: &AuthContext,
        now: DateTime<Utc>,
    ) -> Result<()> {
        // `capability==` caveats form a set of grants: the request needs to match one of them.
        let mut granted = Vec::new();

        for caveat in caveats {
            let holds = match caveat {
                TypedCaveat::Time(TimeCaveat::Expiration { operator, at }) => {
                    operator.compare(&now, at)
                }
                TypedCaveat::Auth(AuthCaveat::ServiceCapability { operator, service }) => {
                    operator.compare(context.service.as_str(), service.as_str())
                }
                TypedCaveat::Auth(AuthCaveat::Capability {
                    operator: Operator::Eq,
                    capability,
                }) => {
                    granted.push(capability);
                    true
                }
                TypedCaveat::Auth(AuthCaveat::Capability {
                    operator,
                    capability,
                }) => operator.compare(context.capability.as_str(), capability.as_str()),
                TypedCaveat::Usage(UsageCaveat::RequestLimit { operator, limit }) => {
                    operator.compare(&context.usage_count, limit)
                }
            };

            if !holds {
                return Err(unsatisfied(caveat));
            }
        }

        if !granted.is_empty() && !granted.iter().any(|c| **c == context.capability) {
            return Err(Error::InvalidCaveat(format!(
                "Capability '{}' not granted by any caveat",
                context.capability
            )));
        }

        Ok(())
    }
}

fn unsatisfied(caveat: &TypedCaveat) -> Error {
    Error::InvalidCaveat(format!(
        "Caveat not satisfied: {}",
        CaveatCondition::from(caveat.clone())
    ))
}

use std::sync::Arc;

use bon::Builder;
use chrono::{DateTime, Utc};

use crate::{
    config::L402Config,
    errors::{Error, Result},
    macaroon::{L402BuildParams, MacaroonBuilder, verify_signature_chain},
    store::TokenStore,
    types::{Base64UrlJson, L402Macaroon, MacaroonIdentifier, TypedCaveat},
};

/// Optional per-token overrides applied at mint time.
#[derive(Builder, Debug, Clone, Default, PartialEq, Eq)]
pub struct MintMetadata {
    /// Amount recorded in `paymentInfo.amount`; defaults to the configured price.
    pub price_sats: Option<u64>,
    /// Requested capabilities, narrowed to the configured set. `None` or empty grants all
    /// configured capabilities; a request sharing none of them is refused.
    pub capabilities: Option<Vec<String>>,
    /// Defaults to the configured `maxTokenUses`.
    pub max_uses: Option<u64>,
}

#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    /// Hex payment hash the token is bound to.
    #[builder(into)]
    pub payment_hash: String,
    /// Defaults to now plus the configured token lifetime.
    pub expiry_time: Option<DateTime<Utc>>,
    #[builder(default)]
    pub metadata: MintMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintResult {
    /// Opaque token string handed to the client.
    pub macaroon: String,
    pub payment_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// A presented token whose signature chain replayed correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMacaroon {
    pub macaroon: L402Macaroon,
    /// The signed identifier; the only trusted source of the payment hash.
    pub identifier: MacaroonIdentifier,
    pub caveats: Vec<TypedCaveat>,
}

impl VerifiedMacaroon {
    pub fn payment_hash(&self) -> &str {
        &self.identifier.payment_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid(VerifiedMacaroon),
    Invalid(Error),
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid(_))
    }

    pub fn as_valid(&self) -> Option<&VerifiedMacaroon> {
        match self {
            VerifyResult::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_invalid(&self) -> Option<&Error> {
        match self {
            VerifyResult::Invalid(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<VerifiedMacaroon> {
        match self {
            VerifyResult::Valid(v) => Ok(v),
            VerifyResult::Invalid(e) => Err(e),
        }
    }
}

/// Issues L402 tokens bound to payment hashes and verifies presented ones.
///
/// Verification is payment-agnostic: it proves the token was minted with this secret and
/// has not been altered, nothing more.
#[derive(Debug, Clone)]
pub struct MacaroonMinter {
    config: Arc<L402Config>,
}

impl MacaroonMinter {
    pub fn new(config: Arc<L402Config>) -> Self {
        MacaroonMinter { config }
    }

    pub fn config(&self) -> &L402Config {
        &self.config
    }

    pub fn mint(&self, request: MintRequest) -> Result<MintResult> {
        let config = &self.config;
        let expires_at = match request.expiry_time {
            Some(at) => at,
            None => {
                Utc::now()
                    + chrono::Duration::from_std(config.token_lifetime())
                        .map_err(Error::internal)?
            }
        };

        let identifier = MacaroonIdentifier::new(&request.payment_hash, &config.key_id)
            .with_tier(config.default_tier);
        let metadata = request.metadata;
        let capabilities = self.granted_capabilities(metadata.capabilities)?;

        let l402 = MacaroonBuilder::new(&config.secret)
            .with_location(&config.service_name)
            .with_identifier(&identifier)?
            .build_l402_macaroon(
                L402BuildParams::builder()
                    .payment_amount(metadata.price_sats.unwrap_or(config.price_sats))
                    .service(&config.service_name)
                    .capabilities(capabilities)
                    .max_uses(metadata.max_uses.unwrap_or(config.max_token_uses))
                    .expires_at(expires_at)
                    .build(),
            )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Minted macaroon: payment_hash='{}', token_id='{}', key_id='{}'",
            identifier.payment_hash,
            identifier.token_id,
            identifier.key_id
        );

        Ok(MintResult {
            macaroon: Base64UrlJson::encode(&l402)?.0,
            payment_hash: request.payment_hash,
            expires_at: l402.restrictions.expires_at,
        })
    }

    /// Decode a presented token and replay its signature chain.
    pub fn verify(&self, macaroon: &str) -> VerifyResult {
        match self.decode_and_verify(macaroon) {
            Ok(verified) => VerifyResult::Valid(verified),
            Err(err) => VerifyResult::Invalid(err),
        }
    }

    /// Revoke the token bound to `payment_hash`.
    pub async fn revoke<S: TokenStore>(
        &self,
        store: &S,
        payment_hash: &str,
    ) -> std::result::Result<(), S::Error> {
        store.revoke(payment_hash).await
    }

    fn decode_and_verify(&self, macaroon: &str) -> Result<VerifiedMacaroon> {
        let value = Base64UrlJson(macaroon.to_string()).decode_value()?;

        let missing = L402Macaroon::REQUIRED_FIELDS
            .iter()
            .find(|field| is_blank(value.get(**field)));
        if let Some(field) = missing {
            return Err(Error::InvalidMacaroonStructure(format!(
                "Missing required field: {field}"
            )));
        }

        let macaroon: L402Macaroon = serde_json::from_value(value)
            .map_err(|err| Error::InvalidMacaroonStructure(err.to_string()))?;

        verify_signature_chain(self.config.secret.expose(), &macaroon.macaroon)?;

        let identifier = macaroon.macaroon.decode_identifier()?;
        macaroon.check_consistency(&identifier)?;
        let caveats = macaroon.macaroon.typed_caveats()?;

        Ok(VerifiedMacaroon {
            macaroon,
            identifier,
            caveats,
        })
    }

    fn granted_capabilities(&self, requested: Option<Vec<String>>) -> Result<Vec<String>> {
        let configured = &self.config.capabilities;
        let requested = match requested {
            Some(requested) if !requested.is_empty() => requested,
            _ => return Ok(configured.clone()),
        };

        let granted: Vec<String> = configured
            .iter()
            .filter(|c| requested.contains(c))
            .cloned()
            .collect();
        if granted.is_empty() {
            return Err(Error::UnauthorizedCapability(requested.join(",")));
        }
        Ok(granted)
    }
}

fn is_blank(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.is_empty(),
        Some(serde_json::Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
    use chrono::{Duration, SubsecRound};
    use serde_json::{Value, json};

    use super::*;
    use crate::store::{MemoryTokenStore, TokenStore};

    const HASH: &str = "0f0e0d0c0b0a09080706050403020100000102030405060708090a0b0c0d0e0f";

    fn minter(secret: &str) -> MacaroonMinter {
        MacaroonMinter::new(Arc::new(
            L402Config::builder()
                .secret(secret)
                .price_sats(1000)
                .timeout_seconds(3600)
                .service_name("video")
                .capabilities(vec!["stream".to_string(), "download".to_string()])
                .key_id("key-1")
                .build(),
        ))
    }

    fn mint(minter: &MacaroonMinter) -> String {
        minter
            .mint(MintRequest::builder().payment_hash(HASH).build())
            .unwrap()
            .macaroon
    }

    fn to_json(token: &str) -> Value {
        Base64UrlJson(token.to_string()).decode_value().unwrap()
    }

    fn from_json(value: &Value) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_mint_then_verify() {
        let minter = minter("secret");
        let result = minter
            .mint(MintRequest::builder().payment_hash(HASH).build())
            .unwrap();
        assert_eq!(result.payment_hash, HASH);

        let verified = minter.verify(&result.macaroon).into_result().unwrap();
        assert_eq!(verified.payment_hash(), HASH);
        assert_eq!(verified.identifier.key_id, "key-1");
        assert_eq!(verified.macaroon.payment_info.amount, 1000);
        assert_eq!(verified.macaroon.restrictions.max_uses, Some(1000));
        assert_eq!(
            verified.macaroon.restrictions.capabilities,
            vec!["stream".to_string(), "download".to_string()]
        );
        assert_eq!(verified.caveats.len(), 5);
    }

    #[test]
    fn test_mint_metadata_overrides() {
        let minter = minter("secret");
        let expiry = Utc::now() + Duration::minutes(5);
        let token = minter
            .mint(
                MintRequest::builder()
                    .payment_hash(HASH)
                    .expiry_time(expiry)
                    .metadata(
                        MintMetadata::builder()
                            .price_sats(21)
                            .capabilities(vec!["stream".to_string(), "admin".to_string()])
                            .max_uses(1)
                            .build(),
                    )
                    .build(),
            )
            .unwrap()
            .macaroon;

        let verified = minter.verify(&token).into_result().unwrap();
        let restrictions = &verified.macaroon.restrictions;
        assert_eq!(verified.macaroon.payment_info.amount, 21);
        assert_eq!(restrictions.capabilities, vec!["stream".to_string()]);
        assert_eq!(restrictions.max_uses, Some(1));
        assert_eq!(restrictions.expires_at, expiry.trunc_subsecs(3));
    }

    #[test]
    fn test_mint_rejects_unconfigured_capabilities() {
        let minter = minter("secret");
        let err = minter
            .mint(
                MintRequest::builder()
                    .payment_hash(HASH)
                    .metadata(
                        MintMetadata::builder()
                            .capabilities(vec!["admin".to_string()])
                            .build(),
                    )
                    .build(),
            )
            .unwrap_err();
        assert_eq!(err, Error::UnauthorizedCapability("admin".to_string()));

        let granted = minter
            .mint(
                MintRequest::builder()
                    .payment_hash(HASH)
                    .metadata(MintMetadata::builder().capabilities(vec![]).build())
                    .build(),
            )
            .unwrap();
        let verified = minter.verify(&granted.macaroon).into_result().unwrap();
        assert_eq!(verified.macaroon.restrictions.capabilities.len(), 2);
    }

    #[test]
    fn test_tier_is_signed() {
        let minter = MacaroonMinter::new(Arc::new(
            L402Config::builder()
                .secret("secret")
                .price_sats(1000)
                .timeout_seconds(3600)
                .service_name("video")
                .capabilities(vec!["stream".to_string()])
                .default_tier(1)
                .build(),
        ));
        let token = mint(&minter);

        let verified = minter.verify(&token).into_result().unwrap();
        assert_eq!(verified.identifier.tier, 1);
        assert_eq!(verified.macaroon.restrictions.tier, 1);

        let mut value = to_json(&token);
        value["restrictions"]["tier"] = json!(9);
        assert!(matches!(
            minter.verify(&from_json(&value)).as_invalid(),
            Some(Error::InvalidMacaroonStructure(_))
        ));
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let token = mint(&minter("secret"));
        let result = minter("other").verify(&token);
        assert!(!result.is_valid());
        assert!(matches!(
            result.as_invalid(),
            Some(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let minter = minter("secret");
        assert!(matches!(
            minter.verify("not a token").as_invalid(),
            Some(Error::InvalidMacaroon(_))
        ));
        assert!(matches!(
            minter.verify(&from_json(&json!({ "identifier": "x" }))).as_invalid(),
            Some(Error::InvalidMacaroonStructure(_))
        ));
    }

    #[test]
    fn test_missing_required_field() {
        let minter = minter("secret");
        let token = mint(&minter);

        for field in L402Macaroon::REQUIRED_FIELDS {
            let mut value = to_json(&token);
            value.as_object_mut().unwrap().remove(field);
            let result = minter.verify(&from_json(&value));
            assert!(
                matches!(result.as_invalid(), Some(Error::InvalidMacaroonStructure(_))),
                "removing {field} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_tampering_any_signed_field_invalidates() {
        let minter = minter("secret");
        let token = mint(&minter);

        let tamper: [fn(&mut Value); 5] = [
            |v| v["caveats"][2]["value"] = json!("admin"),
            |v| v["caveats"][1]["namespace"] = json!("authz"),
            |v| v["caveats"][4]["value"] = json!(1_000_000),
            |v| v["location"] = json!("music"),
            |v| {
                let identifier = v["identifier"].as_str().unwrap().to_string();
                let mut chars: Vec<char> = identifier.chars().collect();
                chars[10] = if chars[10] == 'A' { 'B' } else { 'A' };
                v["identifier"] = json!(chars.into_iter().collect::<String>());
            },
        ];

        for (index, tamper) in tamper.iter().enumerate() {
            let mut value = to_json(&token);
            tamper(&mut value);
            assert!(
                !minter.verify(&from_json(&value)).is_valid(),
                "tamper #{index} was accepted"
            );
        }
    }

    #[test]
    fn test_reordering_caveats_invalidates() {
        let minter = minter("secret");
        let mut value = to_json(&mint(&minter));
        value["caveats"].as_array_mut().unwrap().swap(2, 3);

        assert!(matches!(
            minter.verify(&from_json(&value)).as_invalid(),
            Some(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_unsigned_mirror_must_match_caveats() {
        let minter = minter("secret");
        let token = mint(&minter);

        let mut value = to_json(&token);
        value["restrictions"]["maxUses"] = json!(1_000_000);
        assert!(matches!(
            minter.verify(&from_json(&value)).as_invalid(),
            Some(Error::InvalidMacaroonStructure(_))
        ));

        let mut value = to_json(&token);
        value["restrictions"]["tier"] = json!(5);
        assert!(matches!(
            minter.verify(&from_json(&value)).as_invalid(),
            Some(Error::InvalidMacaroonStructure(_))
        ));

        let mut value = to_json(&token);
        value["paymentInfo"]["hash"] = json!("ff".repeat(32));
        assert!(matches!(
            minter.verify(&from_json(&value)).as_invalid(),
            Some(Error::InvalidMacaroonStructure(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_delegates_to_store() {
        let minter = minter("secret");
        let store = MemoryTokenStore::new();

        minter.revoke(&store, HASH).await.unwrap();
        assert!(store.is_revoked(HASH).await.unwrap());
    }
}

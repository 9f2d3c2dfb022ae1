use std::sync::Arc;

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use l402_core::{
    authorizer::{AuthContext, CaveatAuthorizer},
    config::L402Config,
    errors::Error,
    macaroon::{MacaroonMinter, MintMetadata, MintRequest},
    payment::{payment_hash_of, verify_preimage},
    store::{MemoryTokenStore, Redemption, TokenStore},
};
use serde_json::Value;

fn config() -> Arc<L402Config> {
    Arc::new(
        L402Config::builder()
            .secret("integration-secret")
            .price_sats(1000)
            .timeout_seconds(3600)
            .service_name("video")
            .capabilities(vec!["stream".to_string()])
            .build(),
    )
}

fn decode(token: &str) -> Value {
    serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(token).unwrap()).unwrap()
}

fn encode(value: &Value) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}

/// Replace one character of a string field, keeping its length.
fn flip(value: &mut Value, index: usize) {
    let s = value.as_str().unwrap();
    let mut chars: Vec<char> = s.chars().collect();
    let i = index % chars.len();
    chars[i] = if chars[i] == 'x' { 'y' } else { 'x' };
    *value = Value::String(chars.into_iter().collect());
}

#[test]
fn test_every_signed_string_is_tamper_evident() {
    let minter = MacaroonMinter::new(config());
    let token = minter
        .mint(MintRequest::builder().payment_hash("11".repeat(32)).build())
        .unwrap()
        .macaroon;
    let original = decode(&token);
    let caveat_count = original["caveats"].as_array().unwrap().len();

    for position in 0..8 {
        let mut tampered = original.clone();
        flip(&mut tampered["location"], position);
        assert!(!minter.verify(&encode(&tampered)).is_valid());

        let mut tampered = original.clone();
        flip(&mut tampered["identifier"], position);
        assert!(!minter.verify(&encode(&tampered)).is_valid());

        for caveat in 0..caveat_count {
            let mut tampered = original.clone();
            flip(&mut tampered["caveats"][caveat]["namespace"], position);
            assert!(!minter.verify(&encode(&tampered)).is_valid());

            let mut tampered = original.clone();
            if tampered["caveats"][caveat]["value"].is_string() {
                flip(&mut tampered["caveats"][caveat]["value"], position);
            } else {
                let n = tampered["caveats"][caveat]["value"].as_u64().unwrap();
                tampered["caveats"][caveat]["value"] = Value::from(n + 1);
            }
            assert!(!minter.verify(&encode(&tampered)).is_valid());
        }
    }
}

#[test]
fn test_challenge_round_trip_fails_only_at_preimage() {
    let config = config();
    let minter = MacaroonMinter::new(config.clone());
    let preimage = "42".repeat(32);
    let payment_hash = payment_hash_of(&preimage).unwrap();

    let token = minter
        .mint(MintRequest::builder().payment_hash(&payment_hash).build())
        .unwrap()
        .macaroon;

    let verified = minter.verify(&token).into_result().unwrap();
    let context = AuthContext::builder()
        .service("video")
        .capability("stream")
        .build();
    assert!(
        CaveatAuthorizer::new(config)
            .authorize(&verified, &context)
            .is_ok()
    );

    assert_eq!(
        verify_preimage(&"00".repeat(32), verified.payment_hash()),
        Err(Error::InvalidPreimage)
    );
    assert!(verify_preimage(&preimage, verified.payment_hash()).is_ok());
}

#[test]
fn test_expired_token_is_rejected() {
    let config = config();
    let minter = MacaroonMinter::new(config.clone());
    let authorizer = CaveatAuthorizer::new(config);
    let context = AuthContext::builder()
        .service("video")
        .capability("stream")
        .build();

    let mint = |expiry: DateTime<Utc>| {
        let token = minter
            .mint(
                MintRequest::builder()
                    .payment_hash("33".repeat(32))
                    .expiry_time(expiry)
                    .build(),
            )
            .unwrap()
            .macaroon;
        minter.verify(&token).into_result().unwrap()
    };

    let past = mint(Utc::now() - Duration::seconds(1));
    assert!(matches!(
        authorizer.authorize(&past, &context),
        Err(Error::Expired(_))
    ));

    let future = mint(Utc::now() + Duration::hours(1));
    assert!(authorizer.authorize(&future, &context).is_ok());
}

#[tokio::test]
async fn test_exhausted_token_stays_revoked() {
    let config = config();
    let minter = MacaroonMinter::new(config);
    let store = MemoryTokenStore::new();
    let token = minter
        .mint(
            MintRequest::builder()
                .payment_hash("44".repeat(32))
                .metadata(MintMetadata::builder().max_uses(3).build())
                .build(),
        )
        .unwrap()
        .macaroon;
    let verified = minter.verify(&token).into_result().unwrap();
    let restrictions = &verified.macaroon.restrictions;
    let max_uses = restrictions.max_uses.unwrap();

    for expected in 1..=3 {
        assert_eq!(
            store
                .redeem(verified.payment_hash(), max_uses, restrictions.expires_at)
                .await
                .unwrap(),
            Redemption::Granted {
                usage_count: expected
            }
        );
    }
    assert_eq!(
        store
            .redeem(verified.payment_hash(), max_uses, restrictions.expires_at)
            .await
            .unwrap(),
        Redemption::Exhausted { max_uses: 3 }
    );

    // Even a fresh limit cannot resurrect it
    assert_eq!(
        store
            .redeem(verified.payment_hash(), 100, restrictions.expires_at)
            .await
            .unwrap(),
        Redemption::Revoked
    );
}

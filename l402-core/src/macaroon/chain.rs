//! The HMAC-SHA256 signature chain.
//!
//! The chain starts at `HMAC(secret, "")`; every fold uses the current value as the key
//! and the new data as the message.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    errors::{Error, Result},
    types::{Macaroon, ThirdPartyCaveat},
};

type HmacSha256 = Hmac<Sha256>;

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// One value of the signature chain.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureChain([u8; 32]);

impl std::fmt::Debug for SignatureChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignatureChain({})", self.to_base64())
    }
}

impl SignatureChain {
    pub fn root(secret: &[u8]) -> Self {
        SignatureChain(hmac_sha256(secret, b""))
    }

    /// Fold `data` into the chain.
    pub fn fold(&self, data: &[u8]) -> Self {
        SignatureChain(hmac_sha256(&self.0, data))
    }

    pub fn to_base64(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Constant-time comparison against a base64url-encoded signature.
    pub fn matches(&self, encoded: &str) -> bool {
        match BASE64_URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')) {
            Ok(bytes) => bytes.ct_eq(&self.0).into(),
            Err(_) => false,
        }
    }
}

/// Verification key handed to a third party for `identifier`.
pub fn third_party_verification_key(secret: &[u8], identifier: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(hmac_sha256(secret, identifier.as_bytes()))
}

/// Replay the full chain of `macaroon` from `secret`.
///
/// Reports the first position at which the presented signatures diverge.
pub fn verify_signature_chain(secret: &[u8], macaroon: &Macaroon) -> Result<()> {
    let mut chain = SignatureChain::root(secret)
        .fold(macaroon.location.as_bytes())
        .fold(macaroon.identifier.as_bytes());

    for (index, caveat) in macaroon.caveats.iter().enumerate() {
        chain = chain.fold(&caveat.condition().canonical_bytes());
        if !chain.matches(&caveat.signature) {
            return Err(Error::InvalidSignature(format!(
                "Caveat #{index} signature mismatch"
            )));
        }
    }

    for (index, caveat) in macaroon.third_party_caveats.iter().enumerate() {
        if !verification_key_matches(secret, caveat) {
            return Err(Error::InvalidSignature(format!(
                "Third-party caveat #{index} verification key mismatch"
            )));
        }
        chain = chain.fold(&caveat.canonical_bytes());
    }

    if !chain.matches(&macaroon.signature) {
        return Err(Error::InvalidSignature(
            "Invalid signature chain".to_string(),
        ));
    }

    Ok(())
}

fn verification_key_matches(secret: &[u8], caveat: &ThirdPartyCaveat) -> bool {
    let expected = third_party_verification_key(secret, &caveat.identifier);
    expected
        .as_bytes()
        .ct_eq(caveat.verification_key.as_bytes())
        .into()
}

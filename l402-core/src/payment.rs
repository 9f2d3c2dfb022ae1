//! Binding between a payment preimage and its payment hash.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::{Error, Result};

/// Length of a hex-encoded 32-byte preimage.
pub const PREIMAGE_HEX_LEN: usize = 64;

/// Check that `SHA256(preimage) == payment_hash`.
///
/// `preimage` must be 64 lowercase hex characters. Any malformed input or mismatch yields
/// [`Error::InvalidPreimage`]; the digests are compared in constant time.
///
/// ```
/// use l402_core::payment::verify_preimage;
///
/// let preimage = "00".repeat(32);
/// let hash = "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925";
/// assert!(verify_preimage(&preimage, hash).is_ok());
/// assert!(verify_preimage(&"01".repeat(32), hash).is_err());
/// ```
pub fn verify_preimage(preimage: &str, payment_hash: &str) -> Result<()> {
    if preimage.len() != PREIMAGE_HEX_LEN || !is_lower_hex(preimage) {
        return Err(Error::InvalidPreimage);
    }
    let preimage = hex::decode(preimage).map_err(|_| Error::InvalidPreimage)?;
    let expected = hex::decode(payment_hash).map_err(|_| Error::InvalidPreimage)?;

    let digest = Sha256::digest(&preimage);
    if bool::from(digest.as_slice().ct_eq(&expected)) {
        Ok(())
    } else {
        Err(Error::InvalidPreimage)
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Hex SHA-256 of a hex preimage; used to derive payment hashes in tests and fakes.
pub fn payment_hash_of(preimage: &str) -> Result<String> {
    let preimage = hex::decode(preimage).map_err(|_| Error::InvalidPreimage)?;
    Ok(hex::encode(Sha256::digest(&preimage)))
}

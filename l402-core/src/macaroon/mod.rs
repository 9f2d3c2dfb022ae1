//! Macaroon construction, minting and verification.

mod builder;
mod chain;
mod minter;

pub use builder::*;
pub use chain::{SignatureChain, third_party_verification_key, verify_signature_chain};
pub use minter::*;

//! L402 core library.
//!
//! This library provides the core types and building blocks of the L402 protocol:
//! macaroons with an HMAC-SHA256 signature chain, caveat authorization, preimage
//! binding, usage accounting and the payment oracle interface.
//!
//! ```
//! use std::sync::Arc;
//!
//! use l402_core::{
//!     authorizer::{AuthContext, CaveatAuthorizer},
//!     config::L402Config,
//!     macaroon::{MacaroonMinter, MintRequest},
//! };
//!
//! let config = Arc::new(
//!     L402Config::builder()
//!         .secret("a-long-random-secret")
//!         .price_sats(1000)
//!         .timeout_seconds(3600)
//!         .service_name("video")
//!         .capabilities(vec!["stream".to_string()])
//!         .build(),
//! );
//!
//! let minter = MacaroonMinter::new(config.clone());
//! let minted = minter
//!     .mint(MintRequest::builder().payment_hash("00".repeat(32)).build())
//!     .unwrap();
//!
//! let verified = minter.verify(&minted.macaroon).into_result().unwrap();
//! let context = AuthContext::builder()
//!     .service("video")
//!     .capability("stream")
//!     .build();
//! assert!(CaveatAuthorizer::new(config).authorize(&verified, &context).is_ok());
//! ```

pub mod authorizer;
pub mod config;
pub mod errors;
pub mod macaroon;
pub mod oracle;
pub mod payment;
pub mod retry;
pub mod store;
pub mod types;

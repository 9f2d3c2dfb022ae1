//! # L402 Kit
//!
//! L402 Kit is a modular, framework-agnostic SDK for protecting HTTP resources with
//! macaroons that are bound to Lightning invoices.
//!
//! ## Related Crates
//!
//! - **[`l402-core`](https://docs.rs/l402-core)**: Macaroons, caveat authorization, usage
//!   tracking and the payment oracle interface. Re-exported here module by module.
//! - **[`l402-paywall`](https://docs.rs/l402-paywall)**: A framework-agnostic HTTP paywall
//!   enforcing the challenge/verify protocol. Re-exported as [`paywall`] with the `paywall`
//!   feature.
//!
//! ## Core Components Overview
//!
//! - **[`config`]**: Engine configuration, validated once at startup.
//! - **[`macaroon`]**: The signature chain, the builder and the minter.
//! - **[`authorizer`]**: Caveat evaluation against the live request.
//! - **[`store`]**: Usage and revocation tracking, with an in-memory store.
//! - **[`oracle`]**: The payment oracle interface.
//! - **[`oracle_client`]**: An oracle backed by the LND REST API (feature `lnd-client`).
//!
//! ## Bring Your Own Oracle
//!
//! Any payment backend works as long as it can create invoices and report whether one
//! has settled:
//!
//! ```
//! use l402_kit::oracle::{CreateInvoiceRequest, Invoice, PaymentOracle};
//!
//! struct AlwaysSettled;
//!
//! impl PaymentOracle for AlwaysSettled {
//!     type Error = std::convert::Infallible;
//!
//!     async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<Invoice, Self::Error> {
//!         Ok(Invoice {
//!             id: "00".repeat(32),
//!             request: format!("lnbc{}n1", request.tokens),
//!             is_confirmed: false,
//!         })
//!     }
//!
//!     async fn get_invoice(&self, id: &str) -> Result<Invoice, Self::Error> {
//!         Ok(Invoice { id: id.to_string(), request: String::new(), is_confirmed: true })
//!     }
//! }
//! ```
//!
//! ## Bring Your Own Store
//!
//! [`store::MemoryTokenStore`] keeps usage in process memory. Implement
//! [`store::TokenStore`] to share usage across instances; `redeem` must be atomic.

pub use l402_core::{
    authorizer, config, errors, macaroon, oracle, payment, retry, store, types,
};

#[cfg(feature = "lnd-client")]
pub mod oracle_client;

#[cfg(feature = "paywall")]
pub use l402_paywall as paywall;

//! # L402 Paywall
//!
//! A framework-agnostic HTTP paywall enforcing the L402 challenge/verify protocol.
//!
//! This crate provides [`PayWall`](paywall::PayWall), a composable middleware that protects
//! HTTP resources with macaroons bound to Lightning invoices. Requests without credentials
//! receive a `402 Payment Required` challenge; requests presenting
//! `Authorization: L402 <macaroon>:<preimage>` are verified, authorized, counted and
//! forwarded to the handler.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use l402_core::{
//!     config::L402Config,
//!     oracle::{CreateInvoiceRequest, Invoice, PaymentOracle},
//!     store::MemoryTokenStore,
//! };
//! use l402_paywall::paywall::PayWall;
//!
//! struct Node;
//!
//! impl PaymentOracle for Node {
//!     type Error = std::io::Error;
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
//!
//! let config = L402Config::builder()
//!     .secret("a-long-random-secret")
//!     .price_sats(1000)
//!     .timeout_seconds(3600)
//!     .service_name("video")
//!     .capabilities(vec!["read".to_string()])
//!     .build();
//!
//! let paywall: PayWall<Node, MemoryTokenStore> = PayWall::builder()
//!     .config(config)
//!     .oracle(Node)
//!     .store(MemoryTokenStore::new())
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`paywall`]: The main [`PayWall`](paywall::PayWall) struct and challenge issuance.
//! - [`processor`]: The verification steps of [`RequestProcessor`](processor::RequestProcessor)
//!   and their [`TokenState`](processor::TokenState).
//! - [`token`]: The [`L402Token`](token::L402Token) handed to resource handlers.
//! - [`errors`]: HTTP error and challenge responses.
//!
//! ## Request Flow
//!
//! The standard flow using [`PayWall::handle_request`](paywall::PayWall::handle_request):
//!
//! 1. **Process Request**: Parse the `Authorization` header, or answer with a challenge.
//! 2. **Verify Macaroon**: Replay the signature chain and decode the identifier.
//! 3. **Verify Preimage**: `SHA-256(preimage)` must equal the bound payment hash.
//! 4. **Check Usage**: Reject revoked tokens and revoke exhausted ones.
//! 5. **Authorize**: Evaluate restrictions and caveats against the request.
//! 6. **Confirm Payment**: Ask the payment oracle whether the invoice settled.
//! 7. **Redeem**: Count the use atomically.
//! 8. **Run Handler**: Execute the resource handler with the token attached.
//!
//! ## Framework Integration
//!
//! With the `axum` feature, [`PayWall`](paywall::PayWall) is a tower layer and
//! [`L402Token`](token::L402Token) an extractor:
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use l402_paywall::token::L402Token;
//!
//! async fn stream(token: L402Token) -> String {
//!     format!("usage {}", token.usage_count)
//! }
//!
//! let app = Router::new().route("/stream", get(stream).layer(paywall));
//! ```
//!
//! ## Error Handling
//!
//! [`ErrorResponse`](errors::ErrorResponse) converts into an `http` response (and implements
//! `IntoResponse` for Axum). Bodies carry `{ message, code }`, plus `details` in
//! development mode:
//!
//! - `402 Payment Required`: No credentials; a fresh challenge.
//! - `401 Unauthorized`: Any rejected token, including expired, revoked or exhausted ones.
//! - `400 Bad Request`: Payment verification failed.
//! - `500 Internal Server Error`: Challenge creation or store failures.

#[cfg(feature = "axum")]
pub mod axum;
pub mod errors;
pub mod paywall;
pub mod processor;
pub mod token;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use http::{Method, Request, Response, StatusCode, header::AUTHORIZATION};
use l402_core::{
    config::{Environment, L402Config, RetryConfig},
    oracle::{CreateInvoiceRequest, Invoice, PaymentOracle},
    store::{MemoryTokenStore, TokenStore},
};
use l402_paywall::{
    errors::{ErrorBody, ErrorResponse, ErrorResponseBody, ErrorResponseHeader},
    paywall::PayWall,
    token::L402Token,
};
use sha2::{Digest, Sha256};

const PREIMAGE: [u8; 32] = [7; 32];

fn preimage_hex() -> String {
    hex::encode(PREIMAGE)
}

fn payment_hash() -> String {
    hex::encode(Sha256::digest(PREIMAGE))
}

#[derive(Default)]
struct FakeNode {
    confirmed: AtomicBool,
    fail_create: AtomicBool,
    fail_lookup: AtomicBool,
    lookups: AtomicUsize,
}

impl FakeNode {
    fn confirmed() -> Arc<Self> {
        let node = FakeNode::default();
        node.confirmed.store(true, Ordering::SeqCst);
        Arc::new(node)
    }
}

impl PaymentOracle for FakeNode {
    type Error = std::io::Error;

    async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<Invoice, Self::Error> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("node unreachable"));
        }
        Ok(Invoice {
            id: payment_hash(),
            request: format!("lnbc{}n1fake", request.tokens),
            is_confirmed: false,
        })
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice, Self::Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("node unreachable"));
        }
        Ok(Invoice {
            id: id.to_string(),
            request: String::new(),
            is_confirmed: self.confirmed.load(Ordering::SeqCst),
        })
    }
}

fn config(max_token_uses: u64, environment: Environment) -> L402Config {
    L402Config::builder()
        .secret("paywall-test-secret")
        .price_sats(1000)
        .timeout_seconds(3600)
        .service_name("video")
        .capabilities(vec!["stream".to_string()])
        .max_token_uses(max_token_uses)
        .retry_config(
            RetryConfig::builder()
                .max_retries(2)
                .base_delay_ms(1)
                .timeout_ms(1000)
                .build(),
        )
        .environment(environment)
        .build()
}

fn paywall(
    node: Arc<FakeNode>,
    store: Arc<MemoryTokenStore>,
    config: L402Config,
) -> PayWall<FakeNode, MemoryTokenStore> {
    PayWall::builder()
        .config(config)
        .oracle(node)
        .store(store)
        .capability("stream")
        .build()
        .unwrap()
}

fn request(authorization: Option<String>) -> Request<()> {
    let mut builder = Request::builder().method(Method::GET).uri("/videos/42");
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    builder.body(()).unwrap()
}

async fn handler(request: Request<()>) -> Response<String> {
    let token = request.extensions().get::<L402Token>().unwrap();
    Response::new(format!("usage {}", token.usage_count))
}

async fn call(
    paywall: &PayWall<FakeNode, MemoryTokenStore>,
    authorization: Option<String>,
) -> Result<Response<String>, ErrorResponse> {
    paywall.handle_request(request(authorization), handler).await
}

/// Issue a challenge and return its macaroon.
async fn challenge_macaroon(paywall: &PayWall<FakeNode, MemoryTokenStore>) -> String {
    let challenge = call(paywall, None).await.unwrap_err();
    match challenge.header {
        Some(ErrorResponseHeader::Challenge { macaroon, .. }) => macaroon,
        None => panic!("challenge without header"),
    }
}

fn error_body(response: &ErrorResponse) -> &ErrorBody {
    match &response.body {
        ErrorResponseBody::Error(body) => body,
        ErrorResponseBody::Challenge(_) => panic!("expected an error body"),
    }
}

#[tokio::test]
async fn test_single_use_token_lifecycle() {
    let node = Arc::new(FakeNode::default());
    let store = Arc::new(MemoryTokenStore::new());
    let paywall = paywall(node.clone(), store.clone(), config(1, Environment::Production));

    // No credentials: a challenge bound to the invoice's payment hash
    let challenge = call(&paywall, None).await.unwrap_err();
    assert_eq!(challenge.status, StatusCode::PAYMENT_REQUIRED);
    assert!(challenge.is_challenge());
    let Some(ErrorResponseHeader::Challenge {
        scheme,
        macaroon,
        invoice,
    }) = challenge.header.clone()
    else {
        panic!("challenge without header");
    };
    assert_eq!(scheme, "L402");
    assert_eq!(invoice, "lnbc1000n1fake");
    match &challenge.body {
        ErrorResponseBody::Challenge(body) => {
            assert_eq!(body.message, "Payment Required");
            assert_eq!(body.payment_hash, payment_hash());
            assert_eq!(body.price, 1000);
        }
        ErrorResponseBody::Error(_) => panic!("expected a challenge body"),
    }
    assert_eq!(
        store.usage_record(&payment_hash()).unwrap().count,
        0,
        "challenge records the token"
    );

    // Wrong preimage
    let denied = call(&paywall, Some(format!("L402 {macaroon}:{}", "00".repeat(32))))
        .await
        .unwrap_err();
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    assert_eq!(denied.code(), Some("INVALID_PREIMAGE"));

    // Right preimage, invoice not settled yet
    let authorization = format!("L402 {macaroon}:{}", preimage_hex());
    let denied = call(&paywall, Some(authorization.clone()))
        .await
        .unwrap_err();
    assert_eq!(denied.code(), Some("PAYMENT_NOT_CONFIRMED"));
    assert_eq!(store.get_usage(&payment_hash()).await.unwrap(), 0);

    node.confirmed.store(true, Ordering::SeqCst);
    let response = call(&paywall, Some(authorization.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "usage 1");

    // The only use is spent; the token gets revoked on the next attempt
    let denied = call(&paywall, Some(authorization.clone()))
        .await
        .unwrap_err();
    assert_eq!(denied.code(), Some("TOKEN_EXPIRED"));
    assert!(store.is_revoked(&payment_hash()).await.unwrap());

    let denied = call(&paywall, Some(authorization)).await.unwrap_err();
    assert_eq!(denied.code(), Some("TOKEN_REVOKED"));
}

#[tokio::test]
async fn test_concurrent_requests_respect_usage_limit() {
    let store = Arc::new(MemoryTokenStore::new());
    let paywall = paywall(
        FakeNode::confirmed(),
        store.clone(),
        config(3, Environment::Production),
    );
    let macaroon = challenge_macaroon(&paywall).await;
    let authorization = format!("L402 {macaroon}:{}", preimage_hex());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let paywall = paywall.clone();
            let authorization = authorization.clone();
            tokio::spawn(async move {
                paywall
                    .handle_request(request(Some(authorization)), handler)
                    .await
                    .map(|_| ())
                    .map_err(|err| err.code().map(str::to_string))
            })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => granted += 1,
            Err(code) => assert!(
                matches!(code.as_deref(), Some("TOKEN_EXPIRED" | "TOKEN_REVOKED")),
                "unexpected rejection {code:?}"
            ),
        }
    }
    assert_eq!(granted, 3);
}

#[tokio::test]
async fn test_production_and_development_bodies() {
    let authorization = |macaroon: &str| format!("L402 {macaroon}:{}", "ab".repeat(32));

    let production = paywall(
        FakeNode::confirmed(),
        Arc::new(MemoryTokenStore::new()),
        config(10, Environment::Production),
    );
    let macaroon = challenge_macaroon(&production).await;
    let denied = call(&production, Some(authorization(&macaroon)))
        .await
        .unwrap_err();
    assert_eq!(
        error_body(&denied),
        &ErrorBody {
            message: "Invalid preimage".to_string(),
            code: "INVALID_PREIMAGE".to_string(),
            details: None,
        }
    );

    let development = paywall(
        FakeNode::confirmed(),
        Arc::new(MemoryTokenStore::new()),
        config(10, Environment::Development),
    );
    let macaroon = challenge_macaroon(&development).await;
    let denied = call(&development, Some(authorization(&macaroon)))
        .await
        .unwrap_err();
    assert_eq!(
        error_body(&denied).details.as_deref(),
        Some("Invalid preimage")
    );
}

#[tokio::test]
async fn test_malformed_credentials() {
    let paywall = paywall(
        FakeNode::confirmed(),
        Arc::new(MemoryTokenStore::new()),
        config(10, Environment::Production),
    );
    let macaroon = challenge_macaroon(&paywall).await;

    let denied = call(&paywall, Some(format!("L402 {macaroon}")))
        .await
        .unwrap_err();
    assert_eq!(denied.code(), Some("INVALID_TOKEN"));

    let denied = call(&paywall, Some(format!("L402 :{}", preimage_hex())))
        .await
        .unwrap_err();
    assert_eq!(denied.code(), Some("INVALID_TOKEN"));

    let denied = call(&paywall, Some(format!("L402 not-a-macaroon:{}", preimage_hex())))
        .await
        .unwrap_err();
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    assert!(!denied.is_challenge());

    // Another scheme is treated as no credentials at all
    let challenge = call(&paywall, Some("Bearer abc".to_string()))
        .await
        .unwrap_err();
    assert!(challenge.is_challenge());
}

#[tokio::test]
async fn test_oracle_failures() {
    let node = FakeNode::confirmed();
    let paywall = paywall(
        node.clone(),
        Arc::new(MemoryTokenStore::new()),
        config(10, Environment::Production),
    );
    let macaroon = challenge_macaroon(&paywall).await;

    node.fail_lookup.store(true, Ordering::SeqCst);
    let denied = call(&paywall, Some(format!("L402 {macaroon}:{}", preimage_hex())))
        .await
        .unwrap_err();
    assert_eq!(denied.status, StatusCode::BAD_REQUEST);
    assert_eq!(denied.code(), Some("PAYMENT_VERIFICATION_FAILED"));
    assert_eq!(node.lookups.load(Ordering::SeqCst), 2, "lookup is retried");

    node.fail_create.store(true, Ordering::SeqCst);
    let failed = call(&paywall, None).await.unwrap_err();
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed.code(), Some("CHALLENGE_CREATION_FAILED"));
}

#[tokio::test]
async fn test_revoke_and_metrics() {
    let store = Arc::new(MemoryTokenStore::new());
    let paywall = paywall(
        FakeNode::confirmed(),
        store.clone(),
        config(10, Environment::Production),
    );
    let macaroon = challenge_macaroon(&paywall).await;
    let authorization = format!("L402 {macaroon}:{}", preimage_hex());

    assert!(call(&paywall, Some(authorization.clone())).await.is_ok());
    let metrics = paywall.metrics().await.unwrap();
    assert_eq!(metrics.active_tokens, 1);
    assert_eq!(metrics.revoked_tokens, 0);

    paywall.revoke(&payment_hash()).await.unwrap();
    let denied = call(&paywall, Some(authorization)).await.unwrap_err();
    assert_eq!(denied.code(), Some("TOKEN_REVOKED"));
    assert_eq!(paywall.metrics().await.unwrap().revoked_tokens, 1);
}

#[tokio::test]
async fn test_method_capability_without_override() {
    let paywall: PayWall<FakeNode, MemoryTokenStore> = PayWall::builder()
        .config(config(10, Environment::Production))
        .oracle(FakeNode::confirmed())
        .store(MemoryTokenStore::new())
        .build()
        .unwrap();
    let macaroon = challenge_macaroon(&paywall).await;

    // The token only grants `stream`; a GET requests `read`
    let denied = call(&paywall, Some(format!("L402 {macaroon}:{}", preimage_hex())))
        .await
        .unwrap_err();
    assert_eq!(denied.code(), Some("INVALID_CAVEAT"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let result: Result<PayWall<FakeNode, MemoryTokenStore>, _> = PayWall::builder()
        .config(
            L402Config::builder()
                .secret("")
                .price_sats(1000)
                .timeout_seconds(3600)
                .service_name("video")
                .build(),
        )
        .oracle(FakeNode::confirmed())
        .store(MemoryTokenStore::new())
        .build();
    assert_eq!(result.unwrap_err().code().as_str(), "INVALID_CONFIG");
}

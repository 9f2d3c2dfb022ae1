use std::{sync::Arc, time::Duration};

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use l402_kit::{
    config::{Environment, L402Config},
    oracle_client::LndRestClient,
    paywall::{errors::ErrorResponse, paywall::PayWall, token::L402Token},
    store::{DEFAULT_SWEEP_MAX_AGE, MemoryTokenStore},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use url::Url;

type SellerPayWall = PayWall<LndRestClient, MemoryTokenStore>;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(paywall): State<SellerPayWall>) -> Result<impl IntoResponse, ErrorResponse> {
    Ok(Json(paywall.metrics().await?))
}

async fn stream(token: L402Token) -> Json<Value> {
    tracing::info!("Streaming to token {}", token.token_id);

    Json(json!({
        "message": "Enjoy the stream",
        "paymentHash": token.payment_hash,
        "usage": token.usage_count,
        "expiresAt": token.expires_at,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let lnd_url = std::env::var("LND_REST_URL").unwrap_or("https://localhost:8080".to_string());
    let oracle = LndRestClient::from_url(Url::parse(&lnd_url)?)
        .with_macaroon(&std::env::var("LND_MACAROON_HEX").unwrap_or_default())?;

    let config = L402Config::builder()
        .secret(std::env::var("L402_SECRET").unwrap_or("change-me-in-production".to_string()))
        .price_sats(1000)
        .timeout_seconds(3600)
        .service_name("video")
        .capabilities(vec!["stream".to_string()])
        .max_token_uses(10)
        .environment(Environment::Development)
        .build();

    let store = Arc::new(MemoryTokenStore::new());
    let _sweeper = store.spawn_sweeper(Duration::from_secs(60 * 60), DEFAULT_SWEEP_MAX_AGE);

    let paywall: SellerPayWall = PayWall::builder()
        .config(config)
        .oracle(oracle)
        .store(store)
        .capability("stream")
        .build()?;

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/stream", get(stream).layer(paywall.clone()))
        .with_state(paywall)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

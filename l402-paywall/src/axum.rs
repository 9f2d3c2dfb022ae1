use std::{convert::Infallible, pin::Pin};

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use l402_core::{errors::Error, oracle::PaymentOracle, store::TokenStore};
use tower::{Layer, Service};

use crate::{errors::ErrorResponse, paywall::PayWall, token::L402Token};

impl<O, S, Svc> Layer<Svc> for PayWall<O, S> {
    type Service = PayWallService<O, S, Svc>;

    fn layer(&self, inner: Svc) -> Self::Service {
        PayWallService {
            paywall: self.clone(),
            inner,
        }
    }
}

/// Service produced by using a [`PayWall`] as a tower layer.
pub struct PayWallService<O, S, Svc> {
    paywall: PayWall<O, S>,
    inner: Svc,
}

impl<O, S, Svc: Clone> Clone for PayWallService<O, S, Svc> {
    fn clone(&self) -> Self {
        PayWallService {
            paywall: self.paywall.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<O, S, Svc> Service<Request> for PayWallService<O, S, Svc>
where
    O: PaymentOracle + 'static,
    S: TokenStore + 'static,
    Svc: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let paywall = self.paywall.clone();
        // The polled-ready service handles this request; its clone serves the next one.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = paywall
                .handle_request(request, |req| async move {
                    match inner.call(req).await {
                        Ok(response) => response,
                        Err(never) => match never {},
                    }
                })
                .await
                .unwrap_or_else(|err| err.into_response());

            Ok(response)
        })
    }
}

/// Extracts the [`L402Token`] attached by the paywall.
///
/// Rejects with `401 UNAUTHORIZED` on routes the paywall does not protect.
impl<St: Send + Sync> FromRequestParts<St> for L402Token {
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<L402Token>()
            .cloned()
            .ok_or_else(|| ErrorResponse::from(Error::Unauthorized))
    }
}

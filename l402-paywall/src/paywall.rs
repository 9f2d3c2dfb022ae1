use std::sync::Arc;

use bon::bon;
use http::{Request, Response, StatusCode};
use l402_core::{
    authorizer::{CaveatAuthorizer, RejectThirdParty, ThirdPartyVerifier},
    config::L402Config,
    errors::{Error, Result},
    macaroon::{MacaroonMinter, MintRequest},
    oracle::{CreateInvoiceRequest, PaymentOracle},
    retry::RetryService,
    store::{StoreMetrics, TokenStore},
};

use crate::{
    errors::{ChallengeBody, ErrorResponse, ErrorResponseBody, ErrorResponseHeader},
    processor::{Credentials, RequestProcessor, TokenState},
};

/// Message of the `402` challenge body.
pub const PAYMENT_REQUIRED_MESSAGE: &str = "Payment Required";

/// An HTTP paywall enforcing the L402 challenge/verify protocol.
///
/// Requests without an `Authorization: <scheme> …` header receive a `402` challenge
/// carrying a fresh macaroon and invoice. Requests presenting `<macaroon>:<preimage>`
/// go through [`RequestProcessor`]'s steps before reaching the handler.
///
/// Cloning is cheap; all collaborators are shared.
pub struct PayWall<O, S> {
    pub(crate) config: Arc<L402Config>,
    pub(crate) oracle: Arc<O>,
    pub(crate) store: Arc<S>,
    pub(crate) minter: MacaroonMinter,
    pub(crate) authorizer: CaveatAuthorizer<Arc<dyn ThirdPartyVerifier>>,
    pub(crate) retry: RetryService,
    pub(crate) capability: Option<String>,
}

impl<O, S> Clone for PayWall<O, S> {
    fn clone(&self) -> Self {
        PayWall {
            config: self.config.clone(),
            oracle: self.oracle.clone(),
            store: self.store.clone(),
            minter: self.minter.clone(),
            authorizer: self.authorizer.clone(),
            retry: self.retry.clone(),
            capability: self.capability.clone(),
        }
    }
}

impl<O, S> std::fmt::Debug for PayWall<O, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayWall")
            .field("config", &self.config)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

#[bon]
impl<O: PaymentOracle, S: TokenStore> PayWall<O, S> {
    /// Build a paywall; fails with [`Error::InvalidConfig`] if `config` does not validate.
    #[builder]
    pub fn new(
        #[builder(into)] config: Arc<L402Config>,
        #[builder(into)] oracle: Arc<O>,
        #[builder(into)] store: Arc<S>,
        // Requested capability for every request instead of `read`/`write` by method
        #[builder(into)]
        capability: Option<String>,
        third_party_verifier: Option<Arc<dyn ThirdPartyVerifier>>,
    ) -> Result<Self> {
        config.validate()?;

        let verifier = third_party_verifier
            .unwrap_or_else(|| Arc::new(RejectThirdParty) as Arc<dyn ThirdPartyVerifier>);

        Ok(PayWall {
            minter: MacaroonMinter::new(config.clone()),
            authorizer: CaveatAuthorizer::new(config.clone()).with_third_party_verifier(verifier),
            retry: RetryService::new(config.retry_config.clone()),
            config,
            oracle,
            store,
            capability,
        })
    }
}

impl<O: PaymentOracle, S: TokenStore> PayWall<O, S> {
    pub fn config(&self) -> &L402Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Run the full protocol and, if access is granted, the handler.
    ///
    /// The steps are:
    ///
    /// 1. [`process_request`](Self::process_request): parse the header and verify the macaroon
    /// 2. [`verify_preimage`](RequestProcessor::verify_preimage)
    /// 3. [`check_usage`](RequestProcessor::check_usage)
    /// 4. [`authorize`](RequestProcessor::authorize)
    /// 5. [`confirm_payment`](RequestProcessor::confirm_payment)
    /// 6. [`redeem`](RequestProcessor::redeem)
    /// 7. [`run_handler`](RequestProcessor::run_handler)
    pub async fn handle_request<Fun, Fut, Req, Res>(
        &self,
        request: Request<Req>,
        handler: Fun,
    ) -> std::result::Result<Response<Res>, ErrorResponse>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        let response = self
            .process_request(request)
            .await?
            .verify_preimage()?
            .check_usage()
            .await?
            .authorize()?
            .confirm_payment()
            .await?
            .redeem()
            .await?
            .run_handler(handler)
            .await;

        Ok(response)
    }

    /// Parse the `Authorization` header and verify the presented macaroon.
    ///
    /// Without an `Authorization` header for the configured scheme, a challenge is returned
    /// as the error response.
    pub async fn process_request<Req>(
        &self,
        request: Request<Req>,
    ) -> std::result::Result<RequestProcessor<'_, O, S, Req>, ErrorResponse> {
        let credentials = match self.extract_credentials(&request) {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return Err(self.challenge().await),
            Err(err) => return Err(self.error_response(err)),
        };

        let verified = self
            .minter
            .verify(&credentials.macaroon)
            .into_result()
            .map_err(|err| self.error_response(err))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Macaroon verified: payment_hash='{}', token_id='{}'",
            verified.payment_hash(),
            verified.identifier.token_id
        );

        Ok(RequestProcessor {
            paywall: self,
            request,
            credentials,
            verified,
            state: TokenState::default(),
        })
    }

    /// Split `<scheme> <macaroon><separator><preimage>`.
    ///
    /// Returns `Ok(None)` when there is no header for the configured scheme.
    fn extract_credentials<Req>(&self, request: &Request<Req>) -> Result<Option<Credentials>> {
        let Some(header) = request.headers().get(http::header::AUTHORIZATION) else {
            return Ok(None);
        };
        let Ok(header) = header.to_str() else {
            return Ok(None);
        };
        let Some(token) = header
            .strip_prefix(self.config.auth_scheme.as_str())
            .and_then(|rest| rest.strip_prefix(' '))
        else {
            return Ok(None);
        };

        let (macaroon, preimage) = token
            .trim()
            .split_once(self.config.token_separator.as_str())
            .unwrap_or((token.trim(), ""));
        if macaroon.is_empty() || preimage.is_empty() {
            return Err(Error::InvalidToken(
                "Missing macaroon or preimage".to_string(),
            ));
        }

        Ok(Some(Credentials {
            macaroon: macaroon.to_string(),
            preimage: preimage.to_string(),
        }))
    }

    /// Create an invoice, mint a macaroon bound to it and build the `402` response.
    pub async fn challenge(&self) -> ErrorResponse {
        match self.create_challenge().await {
            Ok(response) => response,
            Err(err) => self.error_response(err),
        }
    }

    async fn create_challenge(&self) -> Result<ErrorResponse> {
        let invoice = self
            .retry
            .retry(|| {
                self.oracle.create_invoice(CreateInvoiceRequest {
                    tokens: self.config.price_sats,
                    description: self.config.description.clone(),
                })
            })
            .await
            .map_err(|err| Error::ChallengeCreationFailed(err.to_string()))?;

        let minted = self
            .minter
            .mint(MintRequest::builder().payment_hash(&invoice.id).build())?;

        self.store
            .record_token(&minted.payment_hash, minted.expires_at)
            .await
            .map_err(Error::internal)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Challenge issued: payment_hash='{}'", minted.payment_hash);

        Ok(ErrorResponse {
            status: StatusCode::PAYMENT_REQUIRED,
            header: Some(ErrorResponseHeader::Challenge {
                scheme: self.config.auth_scheme.clone(),
                macaroon: minted.macaroon,
                invoice: invoice.request,
            }),
            body: ErrorResponseBody::Challenge(ChallengeBody {
                message: PAYMENT_REQUIRED_MESSAGE.to_string(),
                payment_hash: minted.payment_hash,
                price: self.config.price_sats,
                description: self.config.description.clone(),
            }),
        })
    }

    /// Revoke the token bound to `payment_hash`.
    pub async fn revoke(&self, payment_hash: &str) -> Result<()> {
        self.minter
            .revoke(self.store.as_ref(), payment_hash)
            .await
            .map_err(Error::internal)
    }

    pub async fn metrics(&self) -> Result<StoreMetrics> {
        self.store.metrics().await.map_err(Error::internal)
    }

    /// Log `error` with its code and turn it into a response.
    pub fn error_response(&self, error: Error) -> ErrorResponse {
        #[cfg(feature = "tracing")]
        if error.is_operational() {
            tracing::warn!(code = error.code().as_str(), "Request denied: {error}");
        } else {
            tracing::error!(code = error.code().as_str(), "Unexpected error: {error}");
        }

        ErrorResponse::from_error(&error, self.config.is_development())
    }
}

use http::{Request, Response};
use l402_core::{
    authorizer::AuthContext,
    errors::Error,
    macaroon::VerifiedMacaroon,
    oracle::PaymentOracle,
    payment::verify_preimage,
    store::{Redemption, TokenStore},
};

use crate::{errors::ErrorResponse, paywall::PayWall, token::L402Token};

/// The two halves of the `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub macaroon: String,
    pub preimage: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// What the processor has established about the presented token so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    /// Usage recorded before this request, read by [`RequestProcessor::check_usage`].
    pub prior_usage: u64,
    /// Set by [`RequestProcessor::confirm_payment`].
    pub payment_confirmed: bool,
    /// Usage including this request, set by [`RequestProcessor::redeem`].
    pub usage_count: Option<u64>,
}

/// Token processing state before running the resource handler.
///
/// Every step consumes the processor and hands it back on success, so a custom flow can
/// reorder or skip steps. [`PayWall::handle_request`] runs all of them.
pub struct RequestProcessor<'pw, O, S, Req> {
    pub paywall: &'pw PayWall<O, S>,
    pub request: Request<Req>,
    pub credentials: Credentials,
    pub verified: VerifiedMacaroon,
    pub state: TokenState,
}

impl<'pw, O: PaymentOracle, S: TokenStore, Req> RequestProcessor<'pw, O, S, Req> {
    fn fail(&self, error: Error) -> ErrorResponse {
        self.paywall.error_response(error)
    }

    /// Check that the preimage hashes to the payment hash in the signed identifier.
    pub fn verify_preimage(self) -> Result<Self, ErrorResponse> {
        verify_preimage(&self.credentials.preimage, self.verified.payment_hash())
            .map_err(|err| self.fail(err))?;
        Ok(self)
    }

    /// Reject revoked tokens and revoke tokens whose usage is already exhausted.
    pub async fn check_usage(mut self) -> Result<Self, ErrorResponse> {
        let store = self.paywall.store.as_ref();
        let payment_hash = self.verified.payment_hash();

        if store
            .is_revoked(payment_hash)
            .await
            .map_err(|err| self.fail(Error::internal(err)))?
        {
            return Err(self.fail(Error::TokenRevoked));
        }

        let usage = store
            .get_usage(payment_hash)
            .await
            .map_err(|err| self.fail(Error::internal(err)))?;

        if let Some(max_uses) = self.verified.macaroon.restrictions.max_uses {
            if usage >= max_uses {
                store
                    .revoke(payment_hash)
                    .await
                    .map_err(|err| self.fail(Error::internal(err)))?;
                return Err(self.fail(Error::TokenExpired));
            }
        }

        self.state.prior_usage = usage;
        Ok(self)
    }

    /// The context the caveats are evaluated against.
    pub fn auth_context(&self) -> AuthContext {
        let capability = match &self.paywall.capability {
            Some(capability) => capability.clone(),
            None => AuthContext::capability_for_method(self.request.method().as_str()).to_string(),
        };

        AuthContext {
            service: self.paywall.config.service_name.clone(),
            capability,
            endpoint: self.request.uri().path().to_string(),
            usage_count: self.state.prior_usage,
        }
    }

    /// Evaluate restrictions and caveats.
    pub fn authorize(self) -> Result<Self, ErrorResponse> {
        self.paywall
            .authorizer
            .authorize(&self.verified, &self.auth_context())
            .map_err(|err| self.fail(err))?;
        Ok(self)
    }

    /// Ask the payment oracle whether the invoice has settled.
    ///
    /// `self.state.payment_confirmed` will be set on success.
    pub async fn confirm_payment(mut self) -> Result<Self, ErrorResponse> {
        let paywall = self.paywall;
        let payment_hash = self.verified.payment_hash();

        let invoice = paywall
            .retry
            .retry(|| paywall.oracle.get_invoice(payment_hash))
            .await
            .map_err(|err| self.fail(Error::PaymentVerificationFailed(err.to_string())))?;

        if !invoice.is_confirmed {
            return Err(self.fail(Error::PaymentNotConfirmed));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Payment confirmed: payment_hash='{payment_hash}'");

        self.state.payment_confirmed = true;
        Ok(self)
    }

    /// Atomically count this use against the token's limit.
    ///
    /// `self.state.usage_count` will be set on success.
    pub async fn redeem(mut self) -> Result<Self, ErrorResponse> {
        let restrictions = &self.verified.macaroon.restrictions;
        let redemption = self
            .paywall
            .store
            .redeem(
                self.verified.payment_hash(),
                restrictions.max_uses.unwrap_or(u64::MAX),
                restrictions.expires_at,
            )
            .await
            .map_err(|err| self.fail(Error::internal(err)))?;

        let usage_count = match redemption {
            Redemption::Granted { usage_count } => usage_count,
            Redemption::Revoked => return Err(self.fail(Error::TokenRevoked)),
            Redemption::Exhausted { .. } => return Err(self.fail(Error::TokenExpired)),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Authentication successful: payment_hash='{}', key_id='{}', expires_at='{}', usage={}",
            self.verified.payment_hash(),
            self.verified.identifier.key_id,
            restrictions.expires_at,
            usage_count
        );

        self.state.usage_count = Some(usage_count);
        Ok(self)
    }

    /// Run the resource handler with the [`L402Token`] attached to the request extensions.
    pub async fn run_handler<Fun, Fut, Res>(self, handler: Fun) -> Response<Res>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        let token = L402Token::new(
            self.credentials.macaroon,
            self.credentials.preimage,
            &self.verified,
            self.state.usage_count.unwrap_or(self.state.prior_usage),
        );

        let mut request = self.request;
        request.extensions_mut().insert(token);
        handler(request).await
    }
}

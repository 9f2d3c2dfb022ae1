use base64::{Engine, prelude::BASE64_STANDARD};
use http::{HeaderMap, HeaderName, HeaderValue};
use l402_core::oracle::{CreateInvoiceRequest, Invoice, PaymentOracle};
use serde::{Deserialize, Serialize};
use url::Url;

/// Header carrying the hex-encoded LND admin or invoice macaroon.
pub const LND_MACAROON_HEADER: &str = "grpc-metadata-macaroon";

/// Invoice state reported by LND once the invoice has been paid.
pub const SETTLED_STATE: &str = "SETTLED";

/// A payment oracle talking to an LND node over its REST API.
///
/// ```
/// use l402_kit::oracle_client::LndRestClient;
/// use url::Url;
///
/// let client = LndRestClient::from_url(Url::parse("https://localhost:8080").unwrap())
///     .with_macaroon("0201036c6e64")
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct LndRestClient {
    pub base_url: Url,
    pub client: reqwest::Client,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct LndAddInvoiceRequest {
    /// Satoshis, as a decimal string like every int64 of the REST gateway.
    pub value: String,
    pub memo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LndAddInvoiceResponse {
    /// Standard base64 payment hash.
    pub r_hash: String,
    pub payment_request: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LndInvoice {
    #[serde(default)]
    pub settled: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub payment_request: String,
}

impl LndInvoice {
    pub fn is_settled(&self) -> bool {
        self.settled || self.state.as_deref() == Some(SETTLED_STATE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LndRestClientError {
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("Invalid payment hash: {0}")]
    InvalidPaymentHash(#[from] base64::DecodeError),
}

impl LndRestClient {
    pub fn from_url(base_url: Url) -> Self {
        LndRestClient {
            base_url,
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Use a preconfigured client, e.g. one trusting the node's self-signed certificate.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Authenticate with a hex-encoded LND macaroon.
    pub fn with_macaroon(mut self, macaroon_hex: &str) -> Result<Self, LndRestClientError> {
        let mut value = HeaderValue::from_str(macaroon_hex)?;
        value.set_sensitive(true);
        self.headers
            .insert(HeaderName::from_static(LND_MACAROON_HEADER), value);
        Ok(self)
    }

    pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.headers.insert(key, value.to_owned());
        self
    }
}

impl PaymentOracle for LndRestClient {
    type Error = LndRestClientError;

    async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<Invoice, Self::Error> {
        let created = self
            .client
            .post(self.base_url.join("v1/invoices")?)
            .headers(self.headers.clone())
            .json(&LndAddInvoiceRequest {
                value: request.tokens.to_string(),
                memo: request.description,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<LndAddInvoiceResponse>()
            .await?;

        Ok(Invoice {
            id: hex::encode(BASE64_STANDARD.decode(&created.r_hash)?),
            request: created.payment_request,
            is_confirmed: false,
        })
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice, Self::Error> {
        let invoice = self
            .client
            .get(self.base_url.join(&format!("v1/invoice/{id}"))?)
            .headers(self.headers.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<LndInvoice>()
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "LND invoice lookup: payment_hash='{id}', settled={}",
            invoice.is_settled()
        );

        Ok(Invoice {
            id: id.to_string(),
            is_confirmed: invoice.is_settled(),
            request: invoice.payment_request,
        })
    }
}

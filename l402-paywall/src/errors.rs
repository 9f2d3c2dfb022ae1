use bytes::Bytes;
use http::{HeaderName, HeaderValue, Response, StatusCode, header::WWW_AUTHENTICATE};
use http_body_util::Full;
use l402_core::errors::{Error, ErrorCode};
use serde::Serialize;

/// Represents an error or challenge response from the paywall.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub header: Option<ErrorResponseHeader>,
    pub body: ErrorResponseBody,
}

/// Header sent along with a paywall response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorResponseHeader {
    /// `WWW-Authenticate: <scheme> macaroon="…", invoice="…"`
    Challenge {
        scheme: String,
        macaroon: String,
        invoice: String,
    },
}

impl ErrorResponseHeader {
    /// Get the header to include in the response.
    ///
    /// Returns `None` if the header value could not be created.
    pub fn header_value(&self) -> Option<(HeaderName, HeaderValue)> {
        match self {
            ErrorResponseHeader::Challenge {
                scheme,
                macaroon,
                invoice,
            } => HeaderValue::from_str(&format!(
                "{scheme} macaroon=\"{macaroon}\", invoice=\"{invoice}\""
            ))
            .ok()
            .map(|v| (WWW_AUTHENTICATE, v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorResponseBody {
    Challenge(ChallengeBody),
    Error(ErrorBody),
}

/// Body of a `402 Payment Required` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBody {
    pub message: String,
    pub payment_hash: String,
    pub price: u64,
    pub description: String,
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
    /// Only populated in development mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// A response for `error`; `details` carries the full error text when `development`.
    pub fn from_error(error: &Error, development: bool) -> Self {
        let code = error.code();
        ErrorResponse {
            status: StatusCode::from_u16(code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            header: None,
            body: ErrorResponseBody::Error(ErrorBody {
                message: code.public_message().to_string(),
                code: code.as_str().to_string(),
                details: development.then(|| error.to_string()),
            }),
        }
    }

    /// The error code of this response, if it is not a challenge.
    pub fn code(&self) -> Option<&str> {
        match &self.body {
            ErrorResponseBody::Error(body) => Some(&body.code),
            ErrorResponseBody::Challenge(_) => None,
        }
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self.body, ErrorResponseBody::Challenge(_))
    }
}

impl From<Error> for ErrorResponse {
    fn from(error: Error) -> Self {
        ErrorResponse::from_error(&error, false)
    }
}

impl From<ErrorResponse> for Response<Full<Bytes>> {
    fn from(value: ErrorResponse) -> Self {
        let body = match serde_json::to_vec(&value.body) {
            Ok(b) => b,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to serialize ErrorResponse body to JSON bytes: {err}");
                #[cfg(not(feature = "tracing"))]
                let _ = err;

                let mut response = Response::new(Full::new(Bytes::from_static(
                    ErrorCode::InternalError.public_message().as_bytes(),
                )));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

                return response;
            }
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = value.status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some((name, val)) = value.header.and_then(|h| h.header_value()) {
            response.headers_mut().insert(name, val);
        }
        response
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status, axum::extract::Json(self.body)).into_response();
        if let Some((name, val)) = self.header.and_then(|h| h.header_value()) {
            response.headers_mut().insert(name, val);
        }
        response
    }
}

use std::fmt::Display;

use chrono::{DateTime, Utc};

/// Error types for L402 core operations.
///
/// Every variant maps to a stable [`ErrorCode`], which in turn carries the HTTP status
/// and whether the error is operational (expected, client- or oracle-caused).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The `Authorization` header could not be split into macaroon and preimage.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A macaroon could not be built or decoded.
    #[error("Invalid macaroon: {0}")]
    InvalidMacaroon(String),

    /// A decoded macaroon is missing fields or its denormalized views disagree with its caveats.
    #[error("Invalid macaroon structure: {0}")]
    InvalidMacaroonStructure(String),

    /// The signature chain does not replay to the presented signature.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The preimage is malformed or does not hash to the bound payment hash.
    #[error("Invalid preimage")]
    InvalidPreimage,

    /// A caveat could not be decoded or does not hold for the request.
    #[error("Failed to verify caveat: {0}")]
    InvalidCaveat(String),

    /// The macaroon was issued for another service.
    #[error("Invalid service: expected '{expected}', got '{actual}'")]
    InvalidService { expected: String, actual: String },

    /// The macaroon tier is below the configured minimum.
    #[error("Invalid tier: {actual} is below required tier {required}")]
    InvalidTier { required: u32, actual: u32 },

    /// The macaroon restrictions expired.
    #[error("Macaroon expired at {0}")]
    Expired(DateTime<Utc>),

    /// The token used up its allowance and has been revoked.
    #[error("Token usage exhausted")]
    TokenExpired,

    /// The token was revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The payment oracle has not seen the invoice settle yet.
    #[error("Payment not confirmed")]
    PaymentNotConfirmed,

    /// The payment oracle could not be queried, even after retries.
    #[error("Failed to verify payment: {0}")]
    PaymentVerificationFailed(String),

    /// A challenge could not be created, even after retries.
    #[error("Failed to create challenge: {0}")]
    ChallengeCreationFailed(String),

    /// The restrictions usage allowance is used up.
    #[error("Usage limit exceeded: {used} of {limit} uses")]
    UsageLimitExceeded { used: u64, limit: u64 },

    /// The requested capability is not granted by the macaroon.
    #[error("Capability '{0}' is not granted")]
    UnauthorizedCapability(String),

    /// No verified token is attached to the request.
    #[error("Unauthorized")]
    Unauthorized,

    /// Unexpected failure; never caused by the client.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Error::InvalidToken(_) => ErrorCode::InvalidToken,
            Error::InvalidMacaroon(_) => ErrorCode::InvalidMacaroon,
            Error::InvalidMacaroonStructure(_) => ErrorCode::InvalidMacaroonStructure,
            Error::InvalidSignature(_) => ErrorCode::InvalidSignature,
            Error::InvalidPreimage => ErrorCode::InvalidPreimage,
            Error::InvalidCaveat(_) => ErrorCode::InvalidCaveat,
            Error::InvalidService { .. } => ErrorCode::InvalidService,
            Error::InvalidTier { .. } => ErrorCode::InvalidTier,
            Error::Expired(_) => ErrorCode::Expired,
            Error::TokenExpired => ErrorCode::TokenExpired,
            Error::TokenRevoked => ErrorCode::TokenRevoked,
            Error::PaymentNotConfirmed => ErrorCode::PaymentNotConfirmed,
            Error::PaymentVerificationFailed(_) => ErrorCode::PaymentVerificationFailed,
            Error::ChallengeCreationFailed(_) => ErrorCode::ChallengeCreationFailed,
            Error::UsageLimitExceeded { .. } => ErrorCode::UsageLimitExceeded,
            Error::UnauthorizedCapability(_) => ErrorCode::UnauthorizedCapability,
            Error::Unauthorized => ErrorCode::Unauthorized,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    pub fn is_operational(&self) -> bool {
        self.code().is_operational()
    }

    pub fn internal(reason: impl Display) -> Self {
        Error::Internal(reason.to_string())
    }
}

/// Stable, client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidConfig,
    InvalidToken,
    InvalidMacaroon,
    InvalidMacaroonStructure,
    InvalidSignature,
    InvalidPreimage,
    InvalidCaveat,
    InvalidService,
    InvalidTier,
    Expired,
    TokenExpired,
    TokenRevoked,
    PaymentNotConfirmed,
    PaymentVerificationFailed,
    ChallengeCreationFailed,
    UsageLimitExceeded,
    UnauthorizedCapability,
    Unauthorized,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::InvalidMacaroon => "INVALID_MACAROON",
            ErrorCode::InvalidMacaroonStructure => "INVALID_MACAROON_STRUCTURE",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::InvalidPreimage => "INVALID_PREIMAGE",
            ErrorCode::InvalidCaveat => "INVALID_CAVEAT",
            ErrorCode::InvalidService => "INVALID_SERVICE",
            ErrorCode::InvalidTier => "INVALID_TIER",
            ErrorCode::Expired => "EXPIRED",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::PaymentNotConfirmed => "PAYMENT_NOT_CONFIRMED",
            ErrorCode::PaymentVerificationFailed => "PAYMENT_VERIFICATION_FAILED",
            ErrorCode::ChallengeCreationFailed => "CHALLENGE_CREATION_FAILED",
            ErrorCode::UsageLimitExceeded => "USAGE_LIMIT_EXCEEDED",
            ErrorCode::UnauthorizedCapability => "UNAUTHORIZED_CAPABILITY",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code returned to the client for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::PaymentVerificationFailed => 400,
            ErrorCode::InvalidConfig
            | ErrorCode::ChallengeCreationFailed
            | ErrorCode::InternalError => 500,
            _ => 401,
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, ErrorCode::InternalError)
    }

    /// Short, production-safe message for this error kind.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "Invalid configuration",
            ErrorCode::InvalidToken => "Missing macaroon or preimage",
            ErrorCode::InvalidMacaroon => "Invalid macaroon",
            ErrorCode::InvalidMacaroonStructure => "Invalid macaroon structure",
            ErrorCode::InvalidSignature => "Invalid signature",
            ErrorCode::InvalidPreimage => "Invalid preimage",
            ErrorCode::InvalidCaveat => "Failed to verify caveat",
            ErrorCode::InvalidService => "Invalid service",
            ErrorCode::InvalidTier => "Invalid tier",
            ErrorCode::Expired => "Macaroon expired",
            ErrorCode::TokenExpired => "Token expired",
            ErrorCode::TokenRevoked => "Token revoked",
            ErrorCode::PaymentNotConfirmed => "Payment not confirmed",
            ErrorCode::PaymentVerificationFailed => "Failed to verify payment",
            ErrorCode::ChallengeCreationFailed => "Failed to create challenge",
            ErrorCode::UsageLimitExceeded => "Usage limit exceeded",
            ErrorCode::UnauthorizedCapability => "Unauthorized capability",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A specialized `Result` type for L402 core operations.
pub type Result<T> = std::result::Result<T, Error>;

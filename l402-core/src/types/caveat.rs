//! First-party caveats: the wire form and its typed, per-namespace view.

use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

pub const TIME_NAMESPACE: &str = "time";
pub const AUTH_NAMESPACE: &str = "auth";
pub const USAGE_NAMESPACE: &str = "usage";

pub const EXPIRATION_KEY: &str = "expiration";
pub const SERVICE_CAPABILITY_KEY: &str = "service-capability";
pub const CAPABILITY_KEY: &str = "capability";
pub const REQUEST_LIMIT_KEY: &str = "request-limit";

/// Comparison operator of a caveat condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    /// Evaluate `lhs <op> rhs`.
    pub fn compare<T: PartialOrd + ?Sized>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Le => lhs <= rhs,
            Operator::Gt => lhs > rhs,
            Operator::Ge => lhs >= rhs,
            Operator::Eq => lhs == rhs,
            Operator::Ne => lhs != rhs,
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caveat operand: either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaveatValue {
    Number(u64),
    Text(String),
}

impl CaveatValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CaveatValue::Text(s) => Some(s),
            CaveatValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            CaveatValue::Number(n) => Some(*n),
            CaveatValue::Text(s) => s.parse().ok(),
        }
    }
}

impl Display for CaveatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaveatValue::Number(n) => write!(f, "{n}"),
            CaveatValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for CaveatValue {
    fn from(value: u64) -> Self {
        CaveatValue::Number(value)
    }
}

impl From<&str> for CaveatValue {
    fn from(value: &str) -> Self {
        CaveatValue::Text(value.to_string())
    }
}

impl From<String> for CaveatValue {
    fn from(value: String) -> Self {
        CaveatValue::Text(value)
    }
}

/// An unsigned caveat condition.
///
/// Its JSON serialization (`namespace`, `key`, `operator`, `value`, in that order) is the
/// message signed into the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaveatCondition {
    pub namespace: String,
    pub key: String,
    pub operator: Operator,
    pub value: CaveatValue,
}

impl CaveatCondition {
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<CaveatValue>,
    ) -> Self {
        CaveatCondition {
            namespace: namespace.into(),
            key: key.into(),
            operator,
            value: value.into(),
        }
    }

    /// Canonical bytes signed into the chain.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = match &self.value {
            CaveatValue::Number(n) => serde_json::Value::from(*n),
            CaveatValue::Text(s) => serde_json::Value::from(s.as_str()),
        };
        serde_json::json!({
            "namespace": self.namespace,
            "key": self.key,
            "operator": self.operator.as_str(),
            "value": value,
        })
        .to_string()
        .into_bytes()
    }
}

impl Display for CaveatCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}{}{}",
            self.namespace, self.key, self.operator, self.value
        )
    }
}

/// A signed first-party caveat as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    pub namespace: String,
    pub key: String,
    pub operator: Operator,
    pub value: CaveatValue,
    /// Base64url chain value after folding this caveat.
    pub signature: String,
}

impl Caveat {
    pub fn condition(&self) -> CaveatCondition {
        CaveatCondition {
            namespace: self.namespace.clone(),
            key: self.key.clone(),
            operator: self.operator,
            value: self.value.clone(),
        }
    }

    pub fn signed(condition: CaveatCondition, signature: String) -> Self {
        Caveat {
            namespace: condition.namespace,
            key: condition.key,
            operator: condition.operator,
            value: condition.value,
            signature,
        }
    }

    /// Decode into the typed view; unknown namespaces and keys are rejected.
    pub fn typed(&self) -> Result<TypedCaveat> {
        TypedCaveat::try_from(&self.condition())
    }
}

/// Typed view of a caveat, decoded at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedCaveat {
    Time(TimeCaveat),
    Auth(AuthCaveat),
    Usage(UsageCaveat),
}

/// Caveats in the `time` namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeCaveat {
    /// `expiration <op> at`, evaluated as `now <op> at`.
    Expiration {
        operator: Operator,
        at: DateTime<Utc>,
    },
}

/// Caveats in the `auth` namespace. Only `==` and `!=` are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCaveat {
    ServiceCapability { operator: Operator, service: String },
    Capability { operator: Operator, capability: String },
}

/// Caveats in the `usage` namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageCaveat {
    /// `request-limit <op> limit`, evaluated as `usage_count <op> limit`.
    RequestLimit { operator: Operator, limit: u64 },
}

impl TypedCaveat {
    pub fn expiration(at: DateTime<Utc>) -> Self {
        TypedCaveat::Time(TimeCaveat::Expiration {
            operator: Operator::Lt,
            at,
        })
    }

    pub fn service(service: impl Into<String>) -> Self {
        TypedCaveat::Auth(AuthCaveat::ServiceCapability {
            operator: Operator::Eq,
            service: service.into(),
        })
    }

    pub fn capability(capability: impl Into<String>) -> Self {
        TypedCaveat::Auth(AuthCaveat::Capability {
            operator: Operator::Eq,
            capability: capability.into(),
        })
    }

    pub fn request_limit(limit: u64) -> Self {
        TypedCaveat::Usage(UsageCaveat::RequestLimit {
            operator: Operator::Lt,
            limit,
        })
    }
}

impl TryFrom<&CaveatCondition> for TypedCaveat {
    type Error = Error;

    fn try_from(condition: &CaveatCondition) -> Result<Self> {
        let unsupported = || Error::InvalidCaveat(format!("Unsupported caveat: {condition}"));
        let operator = condition.operator;

        match (condition.namespace.as_str(), condition.key.as_str()) {
            (TIME_NAMESPACE, EXPIRATION_KEY) => {
                let at = condition
                    .value
                    .as_text()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .ok_or_else(|| {
                        Error::InvalidCaveat(format!("Invalid timestamp in caveat: {condition}"))
                    })?
                    .with_timezone(&Utc);
                Ok(TypedCaveat::Time(TimeCaveat::Expiration { operator, at }))
            }
            (AUTH_NAMESPACE, SERVICE_CAPABILITY_KEY) if operator.is_equality() => {
                let service = condition.value.as_text().ok_or_else(unsupported)?;
                Ok(TypedCaveat::Auth(AuthCaveat::ServiceCapability {
                    operator,
                    service: service.to_string(),
                }))
            }
            (AUTH_NAMESPACE, CAPABILITY_KEY) if operator.is_equality() => {
                let capability = condition.value.as_text().ok_or_else(unsupported)?;
                Ok(TypedCaveat::Auth(AuthCaveat::Capability {
                    operator,
                    capability: capability.to_string(),
                }))
            }
            (USAGE_NAMESPACE, REQUEST_LIMIT_KEY) => {
                let limit = condition.value.as_number().ok_or_else(|| {
                    Error::InvalidCaveat(format!("Invalid request limit in caveat: {condition}"))
                })?;
                Ok(TypedCaveat::Usage(UsageCaveat::RequestLimit { operator, limit }))
            }
            _ => Err(unsupported()),
        }
    }
}

impl From<TypedCaveat> for CaveatCondition {
    fn from(caveat: TypedCaveat) -> Self {
        match caveat {
            TypedCaveat::Time(TimeCaveat::Expiration { operator, at }) => CaveatCondition::new(
                TIME_NAMESPACE,
                EXPIRATION_KEY,
                operator,
                at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            TypedCaveat::Auth(AuthCaveat::ServiceCapability { operator, service }) => {
                CaveatCondition::new(AUTH_NAMESPACE, SERVICE_CAPABILITY_KEY, operator, service)
            }
            TypedCaveat::Auth(AuthCaveat::Capability {
                operator,
                capability,
            }) => CaveatCondition::new(AUTH_NAMESPACE, CAPABILITY_KEY, operator, capability),
            TypedCaveat::Usage(UsageCaveat::RequestLimit { operator, limit }) => {
                CaveatCondition::new(USAGE_NAMESPACE, REQUEST_LIMIT_KEY, operator, limit)
            }
        }
    }
}

//! Correlation id resolution
//!
//! An exchange keeps the id its caller sent in a correlation carrier header
//! when that value is a UUID; otherwise it gets a fresh random one. Header
//! names are compared after normalisation (lower-case, `-` and `_` removed), so
//! `correlationid`, `X-Correlation-Id` and `x_correlationid` all count as
//! carriers for the default token.

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default carrier token matched against normalised header names.
pub const DEFAULT_CARRIER_TOKEN: &str = "correlationid";

/// Stable identifier of one exchange.
///
/// Inserted into request extensions by the interceptor so downstream code can
/// log with the same id the audit record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a carrier value.
    ///
    /// Accepts the hyphenated, simple, braced and URN forms. Surrounding
    /// whitespace is ignored.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ExchangeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Lower-case and strip `-`/`_` from a header name.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Finds the correlation carrier among request headers.
#[derive(Debug, Clone)]
pub struct CorrelationResolver {
    token: String,
}

impl CorrelationResolver {
    /// Resolver matching header names that contain `token` after normalisation
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            token: normalize(token.as_ref()),
        }
    }

    /// Whether `name` is a correlation carrier
    pub fn is_carrier(&self, name: &str) -> bool {
        !self.token.is_empty() && normalize(name).contains(&self.token)
    }

    /// The first carrier value that parses as a UUID, in header order.
    ///
    /// Malformed or non-text values are skipped.
    pub fn find(&self, headers: &HeaderMap) -> Option<ExchangeId> {
        headers
            .iter()
            .filter(|(name, _)| self.is_carrier(name.as_str()))
            .find_map(|(name, value)| {
                let parsed = value.to_str().ok().and_then(ExchangeId::parse);
                if parsed.is_none() {
                    tracing::debug!(header = %name, "ignoring malformed correlation carrier");
                }
                parsed
            })
    }

    /// Carrier id if present, otherwise a fresh one
    pub fn resolve(&self, headers: &HeaderMap) -> ExchangeId {
        self.find(headers).unwrap_or_default()
    }
}

impl Default for CorrelationResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CARRIER_TOKEN)
    }
}

//! Actor resolution
//!
//! Authentication happens elsewhere. Whatever authenticated the request is
//! expected to leave a [`Principal`] in the request extensions; the
//! interceptor only reads a claim from it.

use exchange_audit_core::Request;
use std::collections::HashMap;

/// Claim read by [`ClaimsIdentity::default`].
pub const DEFAULT_IDENTITY_CLAIM: &str = "email";

/// An already-authenticated caller and its claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    claims: HashMap<String, String>,
}

impl Principal {
    /// A principal with no claims
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Look up a claim value
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }
}

/// Resolves the actor recorded for an exchange.
pub trait IdentitySource: Send + Sync + 'static {
    /// The actor behind `req`, or `None` for an unauthenticated caller
    fn actor(&self, req: &Request) -> Option<String>;
}

/// Reads one claim of the request's [`Principal`].
#[derive(Debug, Clone)]
pub struct ClaimsIdentity {
    claim: String,
}

impl ClaimsIdentity {
    /// Read the given claim
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
        }
    }
}

impl Default for ClaimsIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CLAIM)
    }
}

impl IdentitySource for ClaimsIdentity {
    fn actor(&self, req: &Request) -> Option<String> {
        req.extensions()
            .get::<Principal>()
            .and_then(|principal| principal.claim(&self.claim))
            .map(str::to_string)
    }
}

impl<F> IdentitySource for F
where
    F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
{
    fn actor(&self, req: &Request) -> Option<String> {
        self(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_audit_core::empty;

    fn request() -> Request {
        let (parts, ()) = http::Request::builder()
            .uri("/me")
            .body(())
            .unwrap()
            .into_parts();
        Request::new(parts, empty())
    }

    #[test]
    fn test_reads_email_claim() {
        let mut req = request();
        req.extensions_mut()
            .insert(Principal::new().with_claim("email", "ada@example.com"));
        assert_eq!(
            ClaimsIdentity::default().actor(&req),
            Some("ada@example.com".to_string())
        );
    }

    #[test]
    fn test_unauthenticated_has_no_actor() {
        assert_eq!(ClaimsIdentity::default().actor(&request()), None);
    }

    #[test]
    fn test_missing_claim_has_no_actor() {
        let mut req = request();
        req.extensions_mut()
            .insert(Principal::new().with_claim("sub", "42"));
        assert_eq!(ClaimsIdentity::default().actor(&req), None);
        assert_eq!(ClaimsIdentity::new("sub").actor(&req), Some("42".to_string()));
    }

    #[test]
    fn test_closure_source() {
        let source = |_req: &Request| Some("service-account".to_string());
        assert_eq!(
            source.actor(&request()),
            Some("service-account".to_string())
        );
    }
}

//! Interceptor configuration
//!
//! [`AuditConfig`] is built once at startup, either with the builder or from
//! `EXCHANGE_AUDIT_*` environment variables, and then shared read-only by
//! every exchange.
//!
//! # Example
//!
//! ```rust,ignore
//! use exchange_audit::AuditConfig;
//!
//! let config = AuditConfig::builder()
//!     .service_name("orders-api")
//!     .skip_path("/health")
//!     .exclude_header("cookie")
//!     .max_body_capture(64 * 1024)
//!     .build();
//! ```
//!
//! | Variable | Field |
//! |----------|-------|
//! | `EXCHANGE_AUDIT_ENABLED` | `enabled` |
//! | `EXCHANGE_AUDIT_SERVICE_NAME` | `service_name` |
//! | `EXCHANGE_AUDIT_CORRELATION_HEADER` | `correlation_header` |
//! | `EXCHANGE_AUDIT_IDENTITY_CLAIM` | `identity_claim` |
//! | `EXCHANGE_AUDIT_EXCLUDED_HEADERS` | `excluded_headers` (comma separated) |
//! | `EXCHANGE_AUDIT_SKIP_PATHS` | `skip_paths` (comma separated) |
//! | `EXCHANGE_AUDIT_SAMPLE_RATE` | `sample_rate` |
//! | `EXCHANGE_AUDIT_MAX_BODY_CAPTURE` | `max_body_capture` |
//! | `EXCHANGE_AUDIT_MAX_BUFFERED_BODY` | `max_buffered_body` |
//! | `EXCHANGE_AUDIT_FAULT_PLACEHOLDER` | `fault_placeholder` |

use crate::correlation::DEFAULT_CARRIER_TOKEN;
use crate::identity::DEFAULT_IDENTITY_CLAIM;
use exchange_audit_core::DEFAULT_FAULT_PLACEHOLDER;
use rand::Rng;
use serde::Deserialize;

/// Prefix of every configuration variable.
pub const ENV_PREFIX: &str = "EXCHANGE_AUDIT_";

/// Default `recordedBy` stamp.
pub const DEFAULT_SERVICE_NAME: &str = "exchange-audit";

/// Error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable deserialization failed.
    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    /// A value was read but is out of range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Interceptor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Master switch; when off, exchanges pass through untouched
    pub enabled: bool,
    /// Stamped on each record as `recordedBy`
    pub service_name: String,
    /// Token a header name must contain (after normalisation) to carry the
    /// correlation id
    pub correlation_header: String,
    /// Principal claim recorded as the actor
    pub identity_claim: String,
    /// Extra header name fragments left out of the record. `authorization`
    /// is always left out.
    pub excluded_headers: Vec<String>,
    /// Paths that are never audited. An entry also covers its sub-paths.
    pub skip_paths: Vec<String>,
    /// Fraction of exchanges audited, in `[0.0, 1.0]`
    pub sample_rate: f64,
    /// Byte limit of the audit copy of each body
    pub max_body_capture: Option<usize>,
    /// Hard ceiling on the bytes held in memory for each body.
    ///
    /// Both bodies are buffered in full before they move on, so without a
    /// ceiling an endless response never reaches the caller. A request body
    /// over it replays to downstream as a failed stream; a response body over
    /// it turns the exchange into a fault.
    pub max_buffered_body: Option<usize>,
    /// Body sent (and recorded) when a fault carries no message
    pub fault_placeholder: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            correlation_header: DEFAULT_CARRIER_TOKEN.to_string(),
            identity_claim: DEFAULT_IDENTITY_CLAIM.to_string(),
            excluded_headers: Vec::new(),
            skip_paths: Vec::new(),
            sample_rate: 1.0,
            max_body_capture: None,
            max_buffered_body: None,
            fault_placeholder: DEFAULT_FAULT_PLACEHOLDER.to_string(),
        }
    }
}

impl AuditConfig {
    /// Create a new builder
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder::default()
    }

    /// Load from `EXCHANGE_AUDIT_*` variables, after loading `.env` if one
    /// exists. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: format!("{} is outside [0.0, 1.0]", self.sample_rate),
            });
        }
        if self.max_body_capture == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_body_capture",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_buffered_body == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_buffered_body",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `path` is excluded from auditing
    pub fn should_skip_path(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|skip| {
            let skip = skip.trim_end_matches('/');
            path == skip
                || (path.starts_with(skip) && path[skip.len()..].starts_with('/'))
        })
    }

    /// Roll the dice for one exchange.
    ///
    /// A NaN rate samples everything, the same as the builder treats it.
    pub fn should_sample(&self) -> bool {
        if self.sample_rate.is_nan() || self.sample_rate >= 1.0 {
            return true;
        }
        if self.sample_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.sample_rate)
    }

    /// Pull out-of-range values back into range.
    ///
    /// Fields are public, so a hand-built config can skip [`validate`]. The
    /// interceptor normalizes whatever it is given.
    ///
    /// [`validate`]: AuditConfig::validate
    pub fn normalized(mut self) -> Self {
        self.sample_rate = clamp_rate(self.sample_rate);
        self.max_body_capture = self.max_body_capture.map(|bytes| bytes.max(1));
        self.max_buffered_body = self.max_buffered_body.map(|bytes| bytes.max(1));
        self
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        1.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Builder for [`AuditConfig`].
#[derive(Debug, Clone, Default)]
pub struct AuditConfigBuilder {
    config: AuditConfig,
}

impl AuditConfigBuilder {
    /// Turn auditing on or off
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the `recordedBy` stamp
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the correlation carrier token
    pub fn correlation_header(mut self, token: impl Into<String>) -> Self {
        self.config.correlation_header = token.into();
        self
    }

    /// Set the claim recorded as the actor
    pub fn identity_claim(mut self, claim: impl Into<String>) -> Self {
        self.config.identity_claim = claim.into();
        self
    }

    /// Leave headers whose name contains `fragment` out of the record
    pub fn exclude_header(mut self, fragment: impl Into<String>) -> Self {
        self.config.excluded_headers.push(fragment.into());
        self
    }

    /// Never audit `path` or its sub-paths
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        self.config.skip_paths.push(path.into());
        self
    }

    /// Audit a fraction of exchanges; clamped to `[0.0, 1.0]`
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.sample_rate = clamp_rate(rate);
        self
    }

    /// Limit the audit copy of each body to `bytes` (at least one)
    pub fn max_body_capture(mut self, bytes: usize) -> Self {
        self.config.max_body_capture = Some(bytes.max(1));
        self
    }

    /// Hold at most `bytes` (at least one) of each body in memory
    pub fn max_buffered_body(mut self, bytes: usize) -> Self {
        self.config.max_buffered_body = Some(bytes.max(1));
        self
    }

    /// Set the body used for faults without a message
    pub fn fault_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.config.fault_placeholder = placeholder.into();
        self
    }

    /// Finish the configuration
    pub fn build(self) -> AuditConfig {
        self.config
    }
}

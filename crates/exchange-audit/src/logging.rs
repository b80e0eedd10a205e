//! Logging bootstrap
//!
//! One call installs a `tracing-subscriber` fmt subscriber filtered by
//! `RUST_LOG`. Records written by [`TracingSink`] then show up on stdout in
//! the chosen format.
//!
//! ```rust,ignore
//! use exchange_audit::logging::{self, LogFormat};
//!
//! logging::init(LogFormat::Json);
//! ```
//!
//! [`TracingSink`]: crate::sink::TracingSink

use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact format (one line per event)
    #[default]
    Compact,
    /// Pretty format (human-readable, for development)
    Pretty,
    /// JSON format (one object per event)
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// Returns `false` if a global subscriber was already set, in which case the
/// existing one is kept.
pub fn init(format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match format {
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init(),
    };
    result.is_ok()
}

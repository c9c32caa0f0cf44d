//! Log output setup.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the binary. [`init`] installs the usual one: a
//! `fmt` subscriber filtered by `RUST_LOG`, falling back to a default
//! directive when the variable is unset or malformed.

use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Output encoding of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Parse `"text"` or `"json"` (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Filter from `RUST_LOG`, or `default_directive` when unset or invalid.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed.
///
/// ```ignore
/// datakit::logging::init(LogFormat::Text, "info,datakit_storage=debug")?;
/// ```
pub fn init(format: LogFormat, default_directive: &str) -> Result<()> {
    let filter = env_filter(default_directive);
    let installed = match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_second_init_fails() {
        // The first call may lose to another test that installed a subscriber
        let _ = init(LogFormat::Text, "warn");
        assert!(init(LogFormat::Json, "warn").is_err());
    }
}

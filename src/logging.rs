//! Structured logging setup via tracing-subscriber.
//!
//! Configurable through the environment, overriding CLI flags:
//! - `TL_RELAY_LOG`: filter directive (`info`, `tl_relay=debug`, ...)
//! - `TL_RELAY_LOG_FORMAT`: `text` or `json`
//!
//! Logs go to stderr; stdout is left to the listing subcommands.

use anyhow::{Result, bail};
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "TL_RELAY_LOG";
pub const LOG_FORMAT_ENV: &str = "TL_RELAY_LOG_FORMAT";

/// Installs the global subscriber.
///
/// `TL_RELAY_LOG` takes precedence over `level`; an unparsable directive
/// falls back to `info`.
///
/// # Errors
///
/// Returns an error if the effective format is neither `text` nor `json`.
pub fn init(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| format.to_string());
    if !is_valid_format(&format) {
        bail!("Invalid log format: '{format}' (expected 'text' or 'json')");
    }

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if format == "json" {
        builder
            .json()
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init()
    } else {
        builder.try_init()
    };

    // A subscriber installed earlier (tests, embedding) stays in place.
    if let Err(e) = installed {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
    Ok(())
}

pub fn is_valid_format(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_formats() {
        assert!(is_valid_format("text"));
        assert!(is_valid_format("json"));
        assert!(!is_valid_format("xml"));
        assert!(!is_valid_format("JSON"));
    }

    #[test]
    #[serial]
    fn test_init_rejects_unknown_format() {
        unsafe { std::env::remove_var(LOG_FORMAT_ENV) };
        let err = init("info", "xml").unwrap_err();
        assert!(err.to_string().contains("Invalid log format"));
    }

    #[test]
    #[serial]
    fn test_init_env_format_overrides_flag() {
        unsafe { std::env::set_var(LOG_FORMAT_ENV, "yaml") };
        let result = init("info", "text");
        unsafe { std::env::remove_var(LOG_FORMAT_ENV) };
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_init_twice_is_harmless() {
        unsafe { std::env::remove_var(LOG_FORMAT_ENV) };
        init("debug", "text").unwrap();
        init("info", "json").unwrap();
    }
}

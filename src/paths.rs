//! XDG-style path resolution for the configuration directory.
//!
//! Prefers XDG Base Directory conventions over OS-specific locations, so
//! the config lives at `~/.config/tl-relay` on macOS too.

use anyhow::{Result, anyhow};
use std::path::PathBuf;

const APP_DIR: &str = "tl-relay";

/// Returns the configuration directory for tl-relay.
///
/// Resolution order:
/// 1. `$XDG_CONFIG_HOME/tl-relay` if `XDG_CONFIG_HOME` is set and non-empty
/// 2. `~/.config/tl-relay` otherwise
///
/// # Errors
///
/// Returns an error if `XDG_CONFIG_HOME` is unset and the home directory
/// cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => Ok(PathBuf::from(xdg).join(APP_DIR)),
        _ => Ok(home_dir()?.join(".config").join(APP_DIR)),
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        anyhow!("Failed to determine home directory; pass --config <path> instead")
    })
}

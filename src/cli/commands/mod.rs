//! Subcommand implementations.

/// Provider listing command handler.
pub mod providers;

/// Relay server command handler.
pub mod serve;

//! # tl-relay - Translating Chat Relay
//!
//! `tl-relay` is the server side of a text chat where every participant
//! reads in their own language. Clients log in with a display name and a
//! language; each chat is translated once per recipient before delivery.
//!
//! ## Features
//!
//! - **Length-prefixed JSON frames** over TCP
//! - **Direct and broadcast chats**, with presence updates on join and leave
//! - **Pluggable translation**: DeepL, OpenAI-compatible endpoints, or none
//! - **Failure isolation**: a slow peer or failed translation affects only
//!   its own delivery
//!
//! ## Quick Start
//!
//! ```bash
//! # Listen on 0.0.0.0:5505, relaying untranslated
//! tl-relay
//!
//! # Use a configured provider
//! tl-relay --provider deepl
//!
//! # List supported language codes
//! tl-relay languages
//! ```
//!
//! ## Configuration
//!
//! Settings are stored in `~/.config/tl-relay/config.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5505"
//!
//! [translation]
//! provider = "deepl"
//!
//! [providers.deepl]
//! kind = "deepl"
//! api_key_env = "DEEPL_AUTH_KEY"
//! ```

/// Command-line interface definitions and handlers.
pub mod cli;

/// Length-prefixed frame codec.
pub mod codec;

/// Configuration file management and provider settings.
pub mod config;

/// Error taxonomy shared across the relay.
pub mod error;

/// Tracing subscriber setup.
pub mod logging;

/// XDG-style path utilities for configuration.
pub mod paths;

/// Wire messages and the supported language set.
pub mod protocol;

/// Registry of live sessions.
pub mod registry;

/// Chat routing with per-recipient translation.
pub mod router;

/// Accept loop and per-connection lifecycle.
pub mod server;

/// Server-side record of one logged-in participant.
pub mod session;

/// Translation providers.
pub mod translation;

/// Terminal styling for listings.
pub mod ui;

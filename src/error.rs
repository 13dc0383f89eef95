//! Error taxonomy for the relay core.
//!
//! Errors fall into two groups: connection-fatal ones (framing, codec after
//! repeated failures, handshake policy, peer disconnect) that end a single
//! connection, and recoverable ones (routing misses, translation outages)
//! that are reported to the sender and leave the connection active.

use std::io;
use std::time::Duration;

/// Byte-stream framing failures. Always fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("stream closed mid-frame with {remaining} bytes buffered")]
    Truncated { remaining: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Every failure the relay core can produce.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("framing error: {0}")]
    Framing(FramingError),

    /// The frame arrived intact but its payload is not a known message.
    #[error("codec error: {0}")]
    Codec(String),

    #[error("display name '{0}' is already in use")]
    DuplicateName(String),

    #[error("invalid display name: {0}")]
    InvalidName(String),

    #[error("user {0} not found or offline")]
    RecipientNotFound(String),

    /// A delivered copy would exceed the frame limit of its recipient.
    #[error("message too large to deliver ({len} bytes, limit {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("translation unavailable: {0}")]
    TranslationUnavailable(String),

    /// The peer broke the login handshake or sent something out of order.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("peer disconnected")]
    PeerDisconnected,
}

impl RelayError {
    /// Returns `true` if this error must terminate the connection it occurred on.
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Framing(_)
                | Self::DuplicateName(_)
                | Self::InvalidName(_)
                | Self::Protocol(_)
                | Self::Timeout { .. }
                | Self::PeerDisconnected
        )
    }
}

impl From<FramingError> for RelayError {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::Io(e) => e.into(),
            other => Self::Framing(other),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => Self::PeerDisconnected,
            _ => Self::Framing(FramingError::Io(err)),
        }
    }
}

//! Per-connection session record and its serialized write path.

use futures_util::SinkExt;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, Notify};
use tokio_util::codec::FramedWrite;

use crate::codec::FrameCodec;
use crate::error::{FramingError, RelayError};
use crate::protocol::{Language, Message, PresenceEntry};

/// Write half of a connection, type-erased so sessions over TCP and over
/// in-memory streams look the same to the registry.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Framed outbound stream of one connection.
pub type FrameWriter = FramedWrite<BoxedWriter, FrameCodec>;

/// Opaque, process-unique connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Plain-data view of a session, safe to hold across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub display_name: String,
    pub language: Language,
}

impl SessionInfo {
    pub fn presence_entry(&self) -> PresenceEntry {
        PresenceEntry {
            display_name: self.display_name.clone(),
            language: self.language,
        }
    }
}

/// The outbound side of a connection before login.
///
/// Handed to the registry on successful registration, or used to send a
/// final `Error` frame when the handshake is rejected.
pub struct Outbound {
    writer: FrameWriter,
    write_timeout: Option<Duration>,
    closed: Arc<Notify>,
}

impl Outbound {
    pub fn new<W>(writer: W, codec: FrameCodec) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: FramedWrite::new(Box::new(writer) as BoxedWriter, codec),
            write_timeout: None,
            closed: Arc::new(Notify::new()),
        }
    }

    /// Bounds each frame write. A peer that stops reading is closed rather
    /// than stalling whoever is delivering to it.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Option<Duration>) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Notified once the session built from this outbound stream is closed,
    /// either by removal or by a failed write.
    pub fn close_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.closed)
    }

    /// Sends a final error frame and shuts the stream down.
    pub async fn reject(mut self, reason: impl Into<String>) {
        if let Err(e) = self.writer.send(Message::error(reason)).await {
            tracing::debug!(error = %e, "could not deliver rejection");
        }
        if let Err(e) = self.writer.close().await {
            tracing::debug!(error = %e, "error closing rejected stream");
        }
    }
}

/// A logged-in participant.
///
/// Owned by the [`Registry`](crate::registry::Registry); other components
/// borrow it for the duration of a single delivery.
pub struct Session {
    info: SessionInfo,
    writer: Mutex<FrameWriter>,
    write_timeout: Option<Duration>,
    closed: AtomicBool,
    close_signal: Arc<Notify>,
}

impl Session {
    pub(crate) fn new(info: SessionInfo, outbound: Outbound) -> Self {
        Self {
            info,
            writer: Mutex::new(outbound.writer),
            write_timeout: outbound.write_timeout,
            closed: AtomicBool::new(false),
            close_signal: outbound.closed,
        }
    }

    pub const fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub const fn id(&self) -> SessionId {
        self.info.id
    }

    pub fn display_name(&self) -> &str {
        &self.info.display_name
    }

    pub const fn language(&self) -> Language {
        self.info.language
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the session closed and wakes its connection task.
    pub(crate) fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_signal.notify_one();
        }
    }

    /// Writes one complete frame to this session's stream.
    ///
    /// Concurrent callers are serialized so frames never interleave. A write
    /// or timeout failure closes the session, since a partially written
    /// frame leaves the stream unusable. A message rejected by the encoder
    /// was never written and leaves the session open.
    pub async fn send(&self, message: Message) -> Result<(), RelayError> {
        let mut writer = self.writer.lock().await;
        if self.is_closed() {
            return Err(RelayError::PeerDisconnected);
        }

        let result = match self.write_timeout {
            Some(after) => tokio::time::timeout(after, writer.send(message))
                .await
                .unwrap_or(Err(RelayError::Timeout { op: "write", after })),
            None => writer.send(message).await,
        };

        if let Err(e) = &result
            && !leaves_stream_intact(e)
        {
            self.mark_closed();
        }
        result
    }

    /// Flushes and shuts down the outbound stream.
    pub async fn shutdown(&self) {
        self.mark_closed();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!(session = %self.info.id, error = %e, "error closing session stream");
        }
    }
}

/// Encoder rejections happen before any byte reaches the buffer.
const fn leaves_stream_intact(err: &RelayError) -> bool {
    matches!(
        err,
        RelayError::Codec(_) | RelayError::Framing(FramingError::FrameTooLarge { .. })
    )
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::next_message;
    use crate::protocol::ChatMessage;
    use tokio_util::codec::FramedRead;

    fn test_session(outbound: Outbound) -> Session {
        Session::new(
            SessionInfo {
                id: SessionId(1),
                display_name: "alice".to_string(),
                language: Language::En,
            },
            outbound,
        )
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (server_side, client_side) = tokio::io::duplex(256);
        let session = Arc::new(test_session(Outbound::new(
            server_side,
            FrameCodec::default(),
        )));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let session = Arc::clone(&session);
            tasks.push(tokio::spawn(async move {
                let content = format!("message {i} {}", "x".repeat(100));
                session
                    .send(Message::Chat(ChatMessage::broadcast(content)))
                    .await
                    .unwrap();
            }));
        }

        let reader = tokio::spawn(async move {
            let mut frames = FramedRead::new(client_side, FrameCodec::default());
            let mut count = 0;
            for _ in 0..20 {
                let msg = next_message(&mut frames).await.unwrap().unwrap();
                assert!(matches!(msg, Message::Chat(_)));
                count += 1;
            }
            count
        });

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(reader.await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_send_after_close_writes_nothing() {
        let (server_side, client_side) = tokio::io::duplex(256);
        let session = test_session(Outbound::new(server_side, FrameCodec::default()));
        session.mark_closed();

        let result = session.send(Message::error("late")).await;
        assert!(matches!(result, Err(RelayError::PeerDisconnected)));

        drop(session);
        let mut frames = FramedRead::new(client_side, FrameCodec::default());
        assert!(next_message(&mut frames).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out_and_closes() {
        // Tiny buffer and nobody reading: the write can never complete.
        let (server_side, _client_side) = tokio::io::duplex(8);
        let outbound = Outbound::new(server_side, FrameCodec::default())
            .with_write_timeout(Some(Duration::from_millis(50)));
        let signal = outbound.close_signal();
        let session = test_session(outbound);

        let result = session
            .send(Message::error("this frame is larger than eight bytes"))
            .await;
        assert!(matches!(result, Err(RelayError::Timeout { op: "write", .. })));
        assert!(session.is_closed());

        // The permit stored by notify_one completes this immediately.
        tokio::time::timeout(Duration::from_secs(1), signal.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_message_leaves_session_open() {
        let (server_side, client_side) = tokio::io::duplex(1024);
        let session = test_session(Outbound::new(server_side, FrameCodec::new(64)));

        let result = session
            .send(Message::Chat(ChatMessage::broadcast("x".repeat(200))))
            .await;
        assert!(matches!(
            result,
            Err(RelayError::Framing(FramingError::FrameTooLarge { .. }))
        ));
        assert!(!session.is_closed());

        session.send(Message::error("still here")).await.unwrap();
        let mut frames = FramedRead::new(client_side, FrameCodec::default());
        assert_eq!(
            next_message(&mut frames).await.unwrap(),
            Some(Message::error("still here"))
        );
    }

    #[tokio::test]
    async fn test_reject_sends_error_then_closes() {
        let (server_side, client_side) = tokio::io::duplex(256);
        let outbound = Outbound::new(server_side, FrameCodec::default());
        outbound.reject("display name 'alice' is already in use").await;

        let mut frames = FramedRead::new(client_side, FrameCodec::default());
        assert_eq!(
            next_message(&mut frames).await.unwrap(),
            Some(Message::error("display name 'alice' is already in use"))
        );
        assert!(next_message(&mut frames).await.unwrap().is_none());
    }
}

//! Per-connection state machine.
//!
//! `Connected → AwaitingLogin → Active → Closed`, with any failure before
//! `Active` going straight to `Closed`.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio_util::codec::FramedRead;
use tracing::Instrument;

use super::RelayServer;
use crate::codec::{FrameCodec, next_message};
use crate::error::RelayError;
use crate::protocol::Message;
use crate::session::{Outbound, SessionInfo};

type Frames<S> = FramedRead<ReadHalf<S>, FrameCodec>;

pub(super) async fn serve<S>(server: &RelayServer, stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let span = tracing::info_span!("conn", %peer, user = tracing::field::Empty);
    serve_inner(server, stream).instrument(span).await;
}

async fn serve_inner<S>(server: &RelayServer, stream: S)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let config = server.config();
    let codec = FrameCodec::new(config.max_frame_bytes);
    let (reader, writer) = tokio::io::split(stream);
    let mut frames = FramedRead::new(reader, codec);
    let outbound = Outbound::new(writer, codec).with_write_timeout(config.write_timeout);
    tracing::debug!("connection accepted, awaiting login");

    let close_signal = outbound.close_signal();
    let session = match login(server, &mut frames, outbound).await {
        Ok(session) => session,
        Err(e) => {
            match e {
                RelayError::PeerDisconnected => tracing::debug!("peer left before logging in"),
                e => tracing::info!(reason = %e, "login rejected"),
            }
            return;
        }
    };

    tracing::Span::current().record("user", session.display_name.as_str());
    tracing::info!(language = %session.language, "logged in");
    server.broadcast_presence().await;

    let reason = tokio::select! {
        reason = serve_active(server, &mut frames, &session) => reason,
        () = close_signal.notified() => RelayError::PeerDisconnected,
    };
    match reason {
        RelayError::PeerDisconnected => tracing::info!("disconnected"),
        reason => tracing::warn!(%reason, "closing connection"),
    }

    if let Some(removed) = server.registry().remove(session.id) {
        removed.shutdown().await;
    }
    server.broadcast_presence().await;
}

/// Reads the next message, bounded by the configured read timeout.
async fn read_next<S>(
    frames: &mut Frames<S>,
    read_timeout: Option<Duration>,
) -> Result<Option<Message>, RelayError>
where
    S: AsyncRead,
{
    match read_timeout {
        Some(after) => tokio::time::timeout(after, next_message(frames))
            .await
            .unwrap_or(Err(RelayError::Timeout { op: "read", after })),
        None => next_message(frames).await,
    }
}

/// `AwaitingLogin`: the first frame must be a `Login` that registers.
async fn login<S>(
    server: &RelayServer,
    frames: &mut Frames<S>,
    outbound: Outbound,
) -> Result<SessionInfo, RelayError>
where
    S: AsyncRead,
{
    let (display_name, language) = match read_next(frames, server.config().login_timeout).await {
        Ok(Some(Message::Login {
            display_name,
            language,
        })) => (display_name, language),
        Ok(Some(other)) => {
            let err = RelayError::Protocol(format!(
                "expected login as first message, got {}",
                other.kind()
            ));
            outbound.reject(err.to_string()).await;
            return Err(err);
        }
        Ok(None) => return Err(RelayError::PeerDisconnected),
        Err(e) => {
            outbound.reject(e.to_string()).await;
            return Err(e);
        }
    };

    match server
        .registry()
        .register(&display_name, language, outbound)
    {
        Ok(info) => Ok(info),
        Err(rejected) => {
            rejected.outbound.reject(rejected.error.to_string()).await;
            Err(rejected.error)
        }
    }
}

/// `Active`: hand chats to the router until the connection fails.
/// Returns the reason for leaving.
async fn serve_active<S>(
    server: &RelayServer,
    frames: &mut Frames<S>,
    session: &SessionInfo,
) -> RelayError
where
    S: AsyncRead,
{
    let config = server.config();
    let mut codec_errors = 0u32;

    loop {
        match read_next(frames, config.read_timeout).await {
            Ok(None) => return RelayError::PeerDisconnected,
            Ok(Some(Message::Chat(chat))) => {
                codec_errors = 0;
                let direct = chat.recipient.is_some();
                match server.router.route(session, chat).await {
                    Ok(delivered) => tracing::debug!(direct, delivered, "chat routed"),
                    Err(e) => tracing::debug!(direct, error = %e, "chat not delivered"),
                }
            }
            Ok(Some(other)) => {
                codec_errors = 0;
                tracing::debug!(kind = other.kind(), "ignoring message");
            }
            Err(RelayError::Codec(reason)) => {
                codec_errors += 1;
                tracing::warn!(%reason, codec_errors, "dropping undecodable frame");
                if codec_errors >= config.max_codec_errors {
                    return RelayError::Codec(format!(
                        "{codec_errors} consecutive undecodable frames"
                    ));
                }
            }
            Err(e) => return e,
        }
    }
}

//! Length-prefixed frame codec.
//!
//! Each frame is a 4-byte big-endian payload length followed by that many
//! bytes of UTF-8 JSON. Framing and payload parsing are separate steps:
//! a bad frame header is fatal to the stream, a bad payload is not, because
//! the next frame boundary is still known.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead};

use crate::error::{FramingError, RelayError};
use crate::protocol::Message;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX: usize = 4;

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// A tokio codec that splits a byte stream into frame payloads and
/// serializes outgoing [`Message`]s into frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub const fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub const fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;

        // Checked before buffering so a hostile header cannot make us allocate.
        if len > self.max_frame_bytes {
            return Err(FramingError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        let frame_len = LENGTH_PREFIX + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        Ok(Some(src.split_to(len)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(FramingError::Truncated {
                remaining: buf.len(),
            }),
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = RelayError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > self.max_frame_bytes {
            return Err(FramingError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_bytes,
            }
            .into());
        }

        dst.reserve(LENGTH_PREFIX + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Encodes a single message into a complete frame.
pub fn encode(message: &Message) -> Result<Bytes, RelayError> {
    let mut buf = BytesMut::new();
    FrameCodec::default().encode(message.clone(), &mut buf)?;
    Ok(buf.freeze())
}

/// Length of the payload `message` serializes to, without the prefix.
pub fn payload_len(message: &Message) -> Result<usize, RelayError> {
    Ok(serde_json::to_vec(message)?.len())
}

/// Parses one frame payload into a [`Message`].
pub fn decode_payload(payload: &[u8]) -> Result<Message, RelayError> {
    if payload.is_empty() {
        return Err(RelayError::Codec("empty payload".to_string()));
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Reads the next message from a framed stream.
///
/// Returns `Ok(None)` when the stream closed cleanly on a frame boundary.
/// A [`RelayError::Codec`] leaves the stream usable; any other error does not.
pub async fn next_message<R>(
    frames: &mut FramedRead<R, FrameCodec>,
) -> Result<Option<Message>, RelayError>
where
    R: AsyncRead + Unpin,
{
    match frames.next().await {
        None => Ok(None),
        Some(Err(e)) => Err(e.into()),
        Some(Ok(payload)) => decode_payload(&payload).map(Some),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::{ChatMessage, Language, PresenceEntry};
    use tokio::io::AsyncWriteExt;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::Login {
                display_name: "alice".to_string(),
                language: Language::En,
            },
            Message::Chat(ChatMessage::direct("hi", "bob")),
            Message::Chat(ChatMessage {
                content: "こんにちは".to_string(),
                recipient: None,
                sender: Some("alice".to_string()),
                private: false,
                translation_unavailable: true,
            }),
            Message::Presence {
                users: vec![
                    PresenceEntry {
                        display_name: "alice".to_string(),
                        language: Language::En,
                    },
                    PresenceEntry {
                        display_name: "bob".to_string(),
                        language: Language::Fr,
                    },
                ],
            },
            Message::error("user carol not found or offline"),
        ]
    }

    #[test]
    fn test_each_variant_survives_the_wire() {
        let mut codec = FrameCodec::default();
        for msg in sample_messages() {
            let mut buf = BytesMut::from(&encode(&msg).unwrap()[..]);
            let payload = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decode_payload(&payload).unwrap(), msg);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_length_prefix_is_big_endian() {
        let frame = encode(&Message::error("x")).unwrap();
        let payload_len = frame.len() - LENGTH_PREFIX;
        assert_eq!(&frame[..LENGTH_PREFIX], &(payload_len as u32).to_be_bytes());
    }

    #[test]
    fn test_decode_two_frames_in_one_read() {
        let messages = sample_messages();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(&messages[0]).unwrap());
        buf.extend_from_slice(&encode(&messages[1]).unwrap());

        let mut codec = FrameCodec::default();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decode_payload(&first).unwrap(), messages[0]);
        assert_eq!(decode_payload(&second).unwrap(), messages[1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_partial_header_and_body() {
        let msg = Message::Chat(ChatMessage::broadcast("hello there"));
        let frame = encode(&msg).unwrap();
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        // Header split across reads.
        buf.extend_from_slice(&frame[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Header complete, body partial.
        buf.extend_from_slice(&frame[2..8]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[8..]);
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decode_payload(&payload).unwrap(), msg);
    }

    #[test]
    fn test_oversized_header_rejected_before_body_arrives() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32(17);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FramingError::FrameTooLarge { len: 17, max: 16 }));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Message::error("far too long for eight bytes"), &mut buf)
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Framing(FramingError::FrameTooLarge { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_payload_len_matches_encoded_frame() {
        let message = Message::Chat(ChatMessage::direct("hello", "bob"));
        let frame = encode(&message).unwrap();
        assert_eq!(payload_len(&message).unwrap(), frame.len() - LENGTH_PREFIX);
    }

    #[test]
    fn test_eof_mid_frame_is_truncation() {
        let frame = encode(&Message::error("cut short")).unwrap();
        let mut buf = BytesMut::from(&frame[..frame.len() - 3]);
        let mut codec = FrameCodec::default();

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, FramingError::Truncated { .. }));
    }

    #[test]
    fn test_eof_on_boundary_is_clean() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_bad_payload_is_codec_error() {
        assert!(matches!(
            decode_payload(b"not json"),
            Err(RelayError::Codec(_))
        ));
        assert!(matches!(decode_payload(b""), Err(RelayError::Codec(_))));
        assert!(matches!(
            decode_payload(br#"{"type":"login","display_name":"a","language":"XX"}"#),
            Err(RelayError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_next_message_across_fragmented_writes() {
        let messages = sample_messages();
        let mut wire = Vec::new();
        for msg in &messages {
            wire.extend_from_slice(&encode(msg).unwrap());
        }

        let (mut client, server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            // Odd chunk size so frame and chunk boundaries never line up.
            for chunk in wire.chunks(7) {
                client.write_all(chunk).await.unwrap();
            }
        });

        let mut frames = FramedRead::new(server, FrameCodec::default());
        let mut received = Vec::new();
        while let Some(msg) = next_message(&mut frames).await.unwrap() {
            received.push(msg);
        }
        writer.await.unwrap();

        assert_eq!(received, messages);
    }

    #[tokio::test]
    async fn test_next_message_recovers_after_bad_payload() {
        let mut wire = Vec::new();
        wire.put_u32(3);
        wire.put_slice(b"???");
        wire.extend_from_slice(&encode(&Message::error("after")).unwrap());

        let mut frames = FramedRead::new(&wire[..], FrameCodec::default());
        assert!(matches!(
            next_message(&mut frames).await,
            Err(RelayError::Codec(_))
        ));
        assert_eq!(
            next_message(&mut frames).await.unwrap(),
            Some(Message::error("after"))
        );
        assert!(next_message(&mut frames).await.unwrap().is_none());
    }
}

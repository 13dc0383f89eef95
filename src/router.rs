//! Chat routing: directed and broadcast delivery with per-recipient translation.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::codec::{DEFAULT_MAX_FRAME_BYTES, payload_len};
use crate::error::RelayError;
use crate::protocol::{ChatMessage, Language, Message};
use crate::registry::Registry;
use crate::session::{Session, SessionInfo};
use crate::translation::Translator;

/// Decides where a chat goes and delivers a translated copy to each target.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
    translator: Arc<dyn Translator>,
    max_frame_bytes: usize,
}

impl Router {
    pub fn new(registry: Arc<Registry>, translator: Arc<dyn Translator>) -> Self {
        Self {
            registry,
            translator,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Sets the largest payload a delivered copy may have.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Routes one chat from `sender`. Returns the number of deliveries made.
    ///
    /// A missing recipient is reported to the sender as an `Error` frame and
    /// returned as [`RelayError::RecipientNotFound`]. A copy that would not
    /// fit in a frame is withheld and reported to the sender the same way.
    /// No outcome of routing is fatal to any connection.
    pub async fn route(&self, sender: &SessionInfo, chat: ChatMessage) -> Result<usize, RelayError> {
        if chat.content.trim().is_empty() {
            tracing::debug!(sender = %sender.display_name, "dropping empty chat");
            return Ok(0);
        }

        match chat.recipient {
            Some(recipient) => self.route_direct(sender, chat.content, &recipient).await,
            None => Ok(self.route_broadcast(sender, &chat.content).await),
        }
    }

    async fn route_direct(
        &self,
        sender: &SessionInfo,
        content: String,
        recipient: &str,
    ) -> Result<usize, RelayError> {
        let Some(target) = self.registry.lookup(recipient) else {
            let err = RelayError::RecipientNotFound(recipient.to_string());
            tracing::debug!(sender = %sender.display_name, recipient, "recipient not found");
            self.reply_error(sender, err.to_string()).await;
            return Err(err);
        };

        let message = self
            .localize(&sender.display_name, &content, target.language(), true)
            .await;
        if let Err(err) = self.check_size(&message) {
            tracing::debug!(sender = %sender.display_name, recipient, error = %err, "chat withheld");
            self.reply_error(sender, err.to_string()).await;
            return Err(err);
        }
        Ok(usize::from(deliver(&target, message).await))
    }

    async fn route_broadcast(&self, sender: &SessionInfo, content: &str) -> usize {
        let targets = self.registry.others(sender.id);

        let deliveries = targets.iter().map(|target| async move {
            let message = self
                .localize(&sender.display_name, content, target.language(), false)
                .await;
            match self.check_size(&message) {
                Ok(()) => Ok(deliver(target, message).await),
                Err(err) => {
                    tracing::debug!(
                        sender = %sender.display_name,
                        recipient = %target.display_name(),
                        error = %err,
                        "chat withheld"
                    );
                    Err(err)
                }
            }
        });

        let mut delivered = 0;
        let mut withheld = None;
        for outcome in join_all(deliveries).await {
            match outcome {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(err) => withheld = Some(err),
            }
        }

        if let Some(err) = withheld {
            self.reply_error(sender, err.to_string()).await;
        }
        delivered
    }

    /// Rejects a copy that would exceed the frame limit, so the recipient's
    /// stream never sees it.
    fn check_size(&self, message: &Message) -> Result<(), RelayError> {
        let len = payload_len(message)?;
        if len > self.max_frame_bytes {
            return Err(RelayError::MessageTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }
        Ok(())
    }

    /// Translates `content` for one recipient. On translation failure the
    /// original text is delivered with the `translation_unavailable` marker.
    async fn localize(&self, sender: &str, content: &str, target: Language, private: bool) -> Message {
        let (content, translation_unavailable) =
            match self.translator.translate(content, target).await {
                Ok(translated) => (translated, false),
                Err(e) => {
                    tracing::warn!(
                        target_language = %target,
                        error = %e,
                        "translation failed, delivering original text"
                    );
                    (content.to_string(), true)
                }
            };

        Message::Chat(ChatMessage {
            content,
            recipient: None,
            sender: Some(sender.to_string()),
            private,
            translation_unavailable,
        })
    }

    async fn reply_error(&self, sender: &SessionInfo, content: String) {
        if let Some(session) = self.registry.get(sender.id) {
            deliver(&session, Message::error(content)).await;
        }
    }
}

/// Writes to one session, logging rather than propagating failure: a dead
/// recipient is its own connection's problem.
async fn deliver(target: &Session, message: Message) -> bool {
    match target.send(message).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(recipient = %target.display_name(), error = %e, "delivery failed");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::{FrameCodec, next_message};
    use crate::session::Outbound;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio_util::codec::FramedRead;

    /// Prefixes text with the target code; fails for Spanish.
    struct FakeTranslator;

    #[async_trait]
    impl Translator for FakeTranslator {
        async fn translate(&self, text: &str, target: Language) -> Result<String, RelayError> {
            if target == Language::Es {
                return Err(RelayError::TranslationUnavailable("no spanish".to_string()));
            }
            Ok(format!("[{target}] {text}"))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct Peer {
        info: SessionInfo,
        frames: FramedRead<DuplexStream, FrameCodec>,
    }

    impl Peer {
        async fn next(&mut self) -> Message {
            tokio::time::timeout(Duration::from_secs(1), next_message(&mut self.frames))
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        }

        /// Passes on timeout or on a closed stream; fails on any frame.
        async fn assert_silent(&mut self) {
            let result =
                tokio::time::timeout(Duration::from_millis(50), next_message(&mut self.frames))
                    .await;
            match result {
                Err(_) | Ok(Ok(None)) => {}
                Ok(other) => panic!(
                    "{} received an unexpected frame: {other:?}",
                    self.info.display_name
                ),
            }
        }
    }

    fn join(registry: &Registry, name: &str, language: Language) -> Peer {
        let (server_side, client_side) = tokio::io::duplex(4096);
        let info = registry
            .register(name, language, Outbound::new(server_side, FrameCodec::default()))
            .unwrap();
        Peer {
            info,
            frames: FramedRead::new(client_side, FrameCodec::default()),
        }
    }

    fn router(registry: &Arc<Registry>) -> Router {
        Router::new(Arc::clone(registry), Arc::new(FakeTranslator))
    }

    #[tokio::test]
    async fn test_direct_message_translated_for_recipient_only() {
        let registry = Arc::new(Registry::new());
        let mut alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::Fr);
        let mut carol = join(&registry, "carol", Language::De);

        let delivered = router(&registry)
            .route(&alice.info, ChatMessage::direct("hi", "bob"))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let Message::Chat(chat) = bob.next().await else {
            panic!("expected chat");
        };
        assert_eq!(chat.content, "[FR] hi");
        assert_eq!(chat.sender.as_deref(), Some("alice"));
        assert!(chat.private);
        assert!(chat.recipient.is_none());
        assert!(!chat.translation_unavailable);

        alice.assert_silent().await;
        carol.assert_silent().await;
    }

    #[tokio::test]
    async fn test_unknown_recipient_reports_error_to_sender_only() {
        let registry = Arc::new(Registry::new());
        let mut alice = join(&registry, "alice", Language::En);
        let mut carol = join(&registry, "carol", Language::De);

        let result = router(&registry)
            .route(&alice.info, ChatMessage::direct("hi", "bob"))
            .await;
        assert!(matches!(result, Err(RelayError::RecipientNotFound(ref n)) if n == "bob"));

        assert_eq!(
            alice.next().await,
            Message::error("user bob not found or offline")
        );
        alice.assert_silent().await;
        carol.assert_silent().await;
    }

    #[tokio::test]
    async fn test_broadcast_translates_per_recipient_and_skips_sender() {
        let registry = Arc::new(Registry::new());
        let mut alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::De);
        let mut carol = join(&registry, "carol", Language::Ja);

        let delivered = router(&registry)
            .route(&alice.info, ChatMessage::broadcast("hi"))
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        let Message::Chat(to_bob) = bob.next().await else {
            panic!("expected chat");
        };
        assert_eq!(to_bob.content, "[DE] hi");
        assert!(!to_bob.private);
        assert_eq!(to_bob.sender.as_deref(), Some("alice"));

        let Message::Chat(to_carol) = carol.next().await else {
            panic!("expected chat");
        };
        assert_eq!(to_carol.content, "[JA] hi");

        alice.assert_silent().await;
    }

    #[tokio::test]
    async fn test_translation_failure_isolated_per_recipient() {
        let registry = Arc::new(Registry::new());
        let alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::De);
        let mut carol = join(&registry, "carol", Language::Es);

        let delivered = router(&registry)
            .route(&alice.info, ChatMessage::broadcast("hi"))
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        let Message::Chat(to_bob) = bob.next().await else {
            panic!("expected chat");
        };
        assert_eq!(to_bob.content, "[DE] hi");
        assert!(!to_bob.translation_unavailable);

        let Message::Chat(to_carol) = carol.next().await else {
            panic!("expected chat");
        };
        assert_eq!(to_carol.content, "hi");
        assert!(to_carol.translation_unavailable);
    }

    #[tokio::test]
    async fn test_direct_message_degrades_to_original_text() {
        let registry = Arc::new(Registry::new());
        let alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::Es);

        router(&registry)
            .route(&alice.info, ChatMessage::direct("hola?", "bob"))
            .await
            .unwrap();

        let Message::Chat(chat) = bob.next().await else {
            panic!("expected chat");
        };
        assert_eq!(chat.content, "hola?");
        assert!(chat.private);
        assert!(chat.translation_unavailable);
    }

    #[tokio::test]
    async fn test_removed_recipient_receives_nothing() {
        let registry = Arc::new(Registry::new());
        let alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::De);
        registry.remove(bob.info.id);

        let delivered = router(&registry)
            .route(&alice.info, ChatMessage::broadcast("hi"))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        bob.assert_silent().await;
    }

    #[tokio::test]
    async fn test_oversized_copy_withheld_and_reported_to_sender() {
        let registry = Arc::new(Registry::new());
        let mut alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::De);

        // Fits on the way in; the translated copy with sender does not.
        let router = router(&registry).with_max_frame_bytes(96);
        let content = "x".repeat(60);
        let delivered = router
            .route(&alice.info, ChatMessage::broadcast(content.clone()))
            .await
            .unwrap();
        assert_eq!(delivered, 0);

        match alice.next().await {
            Message::Error { content } => assert!(content.contains("too large")),
            other => panic!("expected error, got {other:?}"),
        }
        bob.assert_silent().await;
        assert!(!registry.get(bob.info.id).unwrap().is_closed());

        let result = router
            .route(&alice.info, ChatMessage::direct(content, "bob"))
            .await;
        assert!(matches!(result, Err(RelayError::MessageTooLarge { max: 96, .. })));
        assert!(matches!(alice.next().await, Message::Error { .. }));
        bob.assert_silent().await;
    }

    #[tokio::test]
    async fn test_empty_chat_dropped() {
        let registry = Arc::new(Registry::new());
        let alice = join(&registry, "alice", Language::En);
        let mut bob = join(&registry, "bob", Language::De);

        let delivered = router(&registry)
            .route(&alice.info, ChatMessage::broadcast("   "))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        bob.assert_silent().await;
    }
}

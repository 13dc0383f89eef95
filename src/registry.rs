//! Concurrency-safe set of live sessions.
//!
//! Every operation takes the registry lock once, touches the maps, and
//! releases it. No I/O happens under the lock: callers receive `Arc<Session>`
//! handles and write to them afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::RelayError;
use crate::protocol::{Language, PresenceEntry};
use crate::session::{Outbound, Session, SessionId, SessionInfo};

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 32;

/// A failed registration.
pub struct Rejected {
    pub error: RelayError,
    pub outbound: Outbound,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Inner {
    // Keyed by id, so iteration order is registration order.
    sessions: BTreeMap<SessionId, Arc<Session>>,
    by_name: HashMap<String, SessionId>,
}

/// The authoritative set of live sessions, keyed by display name.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Each operation is a single insert or remove, so a panic elsewhere
        // cannot leave the maps half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new session under `display_name`.
    ///
    /// Fails with [`RelayError::DuplicateName`] if the name is live, leaving
    /// the existing session untouched. On failure the outbound stream is
    /// handed back so the caller can report the rejection.
    pub fn register(
        &self,
        display_name: &str,
        language: Language,
        outbound: Outbound,
    ) -> Result<SessionInfo, Rejected> {
        if let Err(error) = validate_display_name(display_name) {
            return Err(Rejected { error, outbound });
        }

        let mut inner = self.lock();
        if inner.by_name.contains_key(display_name) {
            return Err(Rejected {
                error: RelayError::DuplicateName(display_name.to_string()),
                outbound,
            });
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = SessionInfo {
            id,
            display_name: display_name.to_string(),
            language,
        };
        inner.by_name.insert(info.display_name.clone(), id);
        inner
            .sessions
            .insert(id, Arc::new(Session::new(info.clone(), outbound)));

        Ok(info)
    }

    /// Removes a session. Removing an absent identity is a no-op.
    ///
    /// The removed session is marked closed before the lock is released, so
    /// no delivery can write to it afterwards.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut inner = self.lock();
        let session = inner.sessions.remove(&id)?;
        inner.by_name.remove(session.display_name());
        session.mark_closed();
        Some(session)
    }

    /// Looks up a live session by display name (case-sensitive).
    pub fn lookup(&self, display_name: &str) -> Option<Arc<Session>> {
        let inner = self.lock();
        let id = inner.by_name.get(display_name)?;
        inner.sessions.get(id).cloned()
    }

    /// Looks up a live session by identity.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().sessions.get(&id).cloned()
    }

    /// Live participants in registration order.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.lock()
            .sessions
            .values()
            .map(|s| s.info().presence_entry())
            .collect()
    }

    /// Presence list and the sessions to deliver it to, taken atomically.
    pub fn presence(&self) -> (Vec<PresenceEntry>, Vec<Arc<Session>>) {
        let inner = self.lock();
        let sessions: Vec<_> = inner.sessions.values().cloned().collect();
        let entries = sessions.iter().map(|s| s.info().presence_entry()).collect();
        (entries, sessions)
    }

    /// Every live session except `id`, in registration order.
    pub fn others(&self, id: SessionId) -> Vec<Arc<Session>> {
        self.lock()
            .sessions
            .iter()
            .filter(|(sid, _)| **sid != id)
            .map(|(_, s)| Arc::clone(s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.lock().by_name.contains_key(display_name)
    }
}

/// Checks a display name against the handshake policy.
pub fn validate_display_name(display_name: &str) -> Result<(), RelayError> {
    if display_name.trim().is_empty() {
        return Err(RelayError::InvalidName("display name is empty".to_string()));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(RelayError::InvalidName(format!(
            "display name is longer than {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    if display_name.chars().any(char::is_control) {
        return Err(RelayError::InvalidName(
            "display name contains control characters".to_string(),
        ));
    }
    Ok(())
}

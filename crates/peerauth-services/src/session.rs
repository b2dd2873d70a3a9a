//! Session management — tracks authenticated peer sessions.
//!
//! Two indexes live behind one lock:
//! - `sessions`:     session nonce → session record
//! - `by_identity`:  peer identity key → session nonces, in insertion order
//!
//! Every nonce listed under an identity resolves in `sessions`, and an
//! identity with no nonces left is removed. A peer may hold several live
//! sessions at once (one per connection); none of them overwrites another.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// One session between this server and a peer.
///
/// A record is a snapshot. To change it, build the new version and hand it
/// to [`SessionStore::update_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession {
    /// Handle for this session. `None` while still being negotiated.
    pub session_nonce: Option<String>,
    /// Hex identity key of the peer. `None` until the peer has named itself.
    pub peer_identity_key: Option<String>,
    /// Whether the peer has proven its identity on this session.
    pub is_authenticated: bool,
    /// When this record was last changed.
    pub last_update: Instant,
    /// Nonce the peer contributed to the handshake.
    pub peer_nonce: Option<String>,
    /// Handshake flag, carried through unchanged.
    pub certificates_required: bool,
    /// Handshake flag, carried through unchanged.
    pub certificates_validated: bool,
}

impl PeerSession {
    /// A fresh, unauthenticated session.
    pub fn new(session_nonce: Option<String>, peer_identity_key: Option<String>) -> Self {
        Self {
            session_nonce,
            peer_identity_key,
            is_authenticated: false,
            last_update: Instant::now(),
            peer_nonce: None,
            certificates_required: false,
            certificates_validated: false,
        }
    }

    /// Mark the record as changed now.
    pub fn touch(&mut self) {
        self.last_update = Instant::now();
    }

    /// Does this record win over `other` for the same identity?
    ///
    /// Authenticated beats unauthenticated regardless of age; otherwise the
    /// later update wins. Ties keep `other`.
    fn outranks(&self, other: &PeerSession) -> bool {
        match (self.is_authenticated, other.is_authenticated) {
            (true, false) => true,
            (false, true) => false,
            _ => self.last_update > other.last_update,
        }
    }
}

/// Contract for anything that indexes peer sessions.
///
/// None of the operations fail: a missing match is `None` / `false`, and a
/// record lacking a nonce or identity is simply not indexed on that side.
pub trait SessionStore: Send + Sync {
    /// Index a session by its nonce and, if known, its peer identity.
    fn add_session(&self, session: PeerSession);

    /// Replace the record stored under the session's nonce.
    fn update_session(&self, session: PeerSession);

    /// Like [`update_session`](Self::update_session), but only while the
    /// nonce is still indexed. Returns false, storing nothing, once the
    /// session has been removed.
    fn replace_session(&self, session: PeerSession) -> bool;

    /// Look up by session nonce, or else by identity key (best session).
    fn get_session(&self, identifier: &str) -> Option<PeerSession>;

    /// Forget a session under both indexes.
    fn remove_session(&self, session: &PeerSession);

    /// Whether `identifier` names a session nonce or an identity with sessions.
    fn has_session(&self, identifier: &str) -> bool;
}

#[derive(Debug, Default)]
struct Indexes {
    sessions: HashMap<String, PeerSession>,
    by_identity: HashMap<String, Vec<String>>,
}

impl Indexes {
    fn insert(&mut self, session: PeerSession) {
        let Some(nonce) = session.session_nonce.clone() else {
            tracing::debug!(
                peer = session.peer_identity_key.as_deref().unwrap_or("-"),
                "session has no nonce yet, not indexed"
            );
            return;
        };

        // The same nonce may come back under a different identity.
        let previous = self
            .sessions
            .get(&nonce)
            .and_then(|s| s.peer_identity_key.clone());
        if let Some(old) = previous {
            if session.peer_identity_key.as_deref() != Some(old.as_str()) {
                tracing::debug!(%nonce, from = %old, "session re-indexed to new identity");
                self.unlink(&old, &nonce);
            }
        }

        if let Some(identity) = &session.peer_identity_key {
            let nonces = self.by_identity.entry(identity.clone()).or_default();
            if !nonces.contains(&nonce) {
                nonces.push(nonce.clone());
            }
        }

        tracing::trace!(
            %nonce,
            authenticated = session.is_authenticated,
            "session indexed"
        );
        self.sessions.insert(nonce, session);
    }

    fn replace(&mut self, session: PeerSession) -> bool {
        let live = session
            .session_nonce
            .as_deref()
            .is_some_and(|nonce| self.sessions.contains_key(nonce));
        if !live {
            tracing::debug!(
                nonce = session.session_nonce.as_deref().unwrap_or("-"),
                "session no longer indexed, not replaced"
            );
            return false;
        }
        self.insert(session);
        true
    }

    fn remove(&mut self, session: &PeerSession) {
        let Some(nonce) = session.session_nonce.as_deref() else {
            return;
        };

        if let Some(stored) = self.sessions.remove(nonce) {
            if let Some(identity) = &stored.peer_identity_key {
                self.unlink(identity, nonce);
            }
            tracing::debug!(%nonce, "session removed");
        }
        if let Some(identity) = &session.peer_identity_key {
            self.unlink(identity, nonce);
        }
    }

    /// Drop `nonce` from an identity's list, and the identity if it empties.
    fn unlink(&mut self, identity: &str, nonce: &str) {
        let Some(nonces) = self.by_identity.get_mut(identity) else {
            return;
        };
        nonces.retain(|n| n != nonce);
        if nonces.is_empty() {
            self.by_identity.remove(identity);
        }
    }

    fn lookup(&mut self, identifier: &str) -> Option<PeerSession> {
        if let Some(session) = self.sessions.get(identifier) {
            return Some(session.clone());
        }
        self.best_session(identifier)
    }

    /// Pick the session to use when only the peer's identity is known.
    ///
    /// Nonces that no longer resolve are pruned from the list on the way.
    fn best_session(&mut self, identity: &str) -> Option<PeerSession> {
        let nonces = self.by_identity.get_mut(identity)?;

        let before = nonces.len();
        let sessions = &self.sessions;
        nonces.retain(|n| sessions.contains_key(n));
        if nonces.len() != before {
            tracing::warn!(
                %identity,
                pruned = before - nonces.len(),
                "pruned stale session nonces"
            );
        }

        let best = nonces
            .iter()
            .filter_map(|n| sessions.get(n))
            .fold(None::<&PeerSession>, |best, candidate| match best {
                Some(current) if !candidate.outranks(current) => Some(current),
                _ => Some(candidate),
            })
            .cloned();

        if nonces.is_empty() {
            self.by_identity.remove(identity);
        }
        best
    }

    fn contains(&self, identifier: &str) -> bool {
        self.sessions.contains_key(identifier)
            || self
                .by_identity
                .get(identifier)
                .is_some_and(|nonces| !nonces.is_empty())
    }
}

/// In-memory session store guarded by a single mutex.
///
/// Every operation holds the lock for its whole duration, so the two
/// indexes are never seen out of step. Operations are short and never
/// block on I/O.
#[derive(Debug, Default)]
pub struct SessionManager {
    inner: Mutex<Indexes>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Indexes> {
        // Index updates never panic part way, so a poisoned lock still
        // guards consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identity keys that currently have at least one session.
    pub fn identities(&self) -> Vec<String> {
        self.lock().by_identity.keys().cloned().collect()
    }

    /// Session nonces recorded for `identity`, oldest first.
    pub fn nonces_for(&self, identity: &str) -> Vec<String> {
        self.lock()
            .by_identity
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of sessions addressable by nonce.
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}

impl SessionStore for SessionManager {
    fn add_session(&self, session: PeerSession) {
        self.lock().insert(session);
    }

    fn update_session(&self, session: PeerSession) {
        self.lock().insert(session);
    }

    fn replace_session(&self, session: PeerSession) -> bool {
        self.lock().replace(session)
    }

    fn get_session(&self, identifier: &str) -> Option<PeerSession> {
        self.lock().lookup(identifier)
    }

    fn remove_session(&self, session: &PeerSession) {
        self.lock().remove(session);
    }

    fn has_session(&self, identifier: &str) -> bool {
        self.lock().contains(identifier)
    }
}

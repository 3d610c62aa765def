//! Sessions for abbreviated handshakes.
//!
//! A completed full handshake yields a [`Session`]: the session id, the
//! cipher suite and the master secret. The server keeps them in a
//! [`SessionCache`] shared by all its connections; the client keeps the
//! session of each peer and offers it on the next handshake.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::message::{CipherSuite, SessionId};

#[derive(Clone)]
pub struct Session {
    id: SessionId,
    cipher_suite: CipherSuite,
    master_secret: Zeroizing<Vec<u8>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, cipher_suite: CipherSuite, master_secret: &[u8]) -> Self {
        Session {
            id,
            cipher_suite,
            master_secret: Zeroizing::new(master_secret.to_vec()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// The 48-byte master secret. Secret key material.
    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    /// Whether the session can be resumed. Servers with caching disabled
    /// hand out empty ids.
    pub fn is_resumable(&self) -> bool {
        !self.id.is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("cipher_suite", &self.cipher_suite)
            .finish()
    }
}

/// Bounded server-side session store, oldest evicted first.
///
/// Shared between connections as `Arc<SessionCache>`.
pub struct SessionCache {
    capacity: usize,
    sessions: Mutex<VecDeque<Session>>,
}

impl SessionCache {
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        SessionCache {
            capacity,
            sessions: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn insert(&self, session: Session) {
        if !self.is_enabled() || !session.is_resumable() {
            return;
        }

        let mut sessions = self.lock();
        sessions.retain(|s| s.id != session.id);
        while sessions.len() >= self.capacity {
            if let Some(evicted) = sessions.pop_front() {
                trace!("Evict session {:?}", evicted.id);
            }
        }
        sessions.push_back(session);
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        if id.is_empty() {
            return None;
        }
        self.lock().iter().find(|s| s.id == *id).cloned()
    }

    pub fn remove(&self, id: &SessionId) {
        self.lock().retain(|s| s.id != *id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Session>> {
        // A panic while holding the lock leaves the queue intact.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(n: u8) -> Session {
        Session::new(
            SessionId::try_new(&[n; 32]).unwrap(),
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            &[n; 48],
        )
    }

    #[test]
    fn evicts_oldest_first() {
        let cache = SessionCache::new(2);
        cache.insert(session(1));
        cache.insert(session(2));
        cache.insert(session(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(session(1).id()).is_none());
        assert_eq!(cache.get(session(3).id()).unwrap().master_secret(), &[3; 48]);
    }

    #[test]
    fn zero_capacity_disables() {
        let cache = SessionCache::new(0);
        cache.insert(session(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_id_is_never_stored() {
        let cache = SessionCache::new(4);
        cache.insert(Session::new(
            SessionId::empty(),
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            &[0; 48],
        ));
        assert!(cache.is_empty());
        assert!(cache.get(&SessionId::empty()).is_none());
    }

    #[test]
    fn reinsert_refreshes() {
        let cache = SessionCache::new(2);
        cache.insert(session(1));
        cache.insert(session(2));
        cache.insert(session(1));
        cache.insert(session(3));
        assert!(cache.get(session(1).id()).is_some());
        assert!(cache.get(session(2).id()).is_none());
    }

    #[test]
    fn debug_hides_secret() {
        let s = format!("{:?}", session(9));
        assert!(!s.contains("master_secret"));
    }
}

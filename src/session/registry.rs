use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::broker::topic::SubscriberId;
use crate::session::connection::Session;

/// Maps a connection identity to its live session.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<SubscriberId, Arc<Session>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `identity`. The first registration wins: if
    /// the identity is taken, nothing changes and `false` is returned.
    pub fn put(&self, identity: &str, session: Arc<Session>) -> bool {
        match self.sessions.entry(identity.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(session);
                true
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions.get(identity).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions.remove(identity).map(|(_, session)| session)
    }

    /// Remove the entry for `session`'s identity only if it still refers to
    /// that exact session.
    pub fn release(&self, session: &Session) -> bool {
        self.sessions
            .remove_if(session.identity(), |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), session)
            })
            .is_some()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn identities(&self) -> Vec<SubscriberId> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }
}

use std::collections::BTreeMap;

use pibble_types::models::{PresenceEntry, User};

use crate::dispatcher::ConnectionId;

/// Who is online right now: one entry per open, authenticated connection.
///
/// Rebuilt from nothing on every process start. The dispatcher owns the only
/// instance and serializes access to it.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: BTreeMap<ConnectionId, User>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, conn_id: ConnectionId, user: User) {
        self.entries.insert(conn_id, user);
    }

    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<User> {
        self.entries.remove(&conn_id)
    }

    /// Online users in connection order. A user connected twice appears twice.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.entries.values().map(User::presence_entry).collect()
    }
}

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, trace};

use pibble_types::events::ServerEvent;
use pibble_types::models::{PresenceEntry, User};

use crate::presence::PresenceRegistry;
use crate::rooms::RoomId;

/// Identifies one physical connection. Assigned in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Manages all connected clients, their room memberships and presence.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    next_conn_id: AtomicU64,

    /// Per-connection outbound channels
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,

    /// Room -> member connections
    rooms: RwLock<HashMap<RoomId, BTreeSet<ConnectionId>>>,

    /// Held across the users_update fan-out so snapshots leave in mutation order.
    /// Lock order: presence, then rooms, then connections.
    presence: Mutex<PresenceRegistry>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                next_conn_id: AtomicU64::new(1),
                connections: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
                presence: Mutex::new(PresenceRegistry::new()),
            }),
        }
    }

    /// Register a new connection. Returns its id and the receiver of events
    /// addressed to it.
    pub async fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = ConnectionId(self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection's channel and every room membership it held.
    pub async fn unregister(&self, conn_id: ConnectionId) {
        {
            let mut rooms = self.inner.rooms.write().await;
            rooms.retain(|_, members| {
                members.remove(&conn_id);
                !members.is_empty()
            });
        }
        self.inner.connections.write().await.remove(&conn_id);
    }

    pub async fn join(&self, conn_id: ConnectionId, room: RoomId) {
        debug!("{} joined room {}", conn_id, room);
        self.inner
            .rooms
            .write()
            .await
            .entry(room)
            .or_default()
            .insert(conn_id);
    }

    pub async fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.inner
            .rooms
            .read()
            .await
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Send a targeted event to one connection. Returns false if the
    /// connection is gone.
    pub async fn send_to(&self, conn_id: ConnectionId, event: ServerEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver an event to every member of a room, optionally skipping one
    /// connection. Returns the number of connections reached.
    pub async fn emit_to_room(
        &self,
        room: &RoomId,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let members = self.members(room).await;
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for conn_id in members {
            if Some(conn_id) == except {
                continue;
            }
            if let Some(tx) = connections.get(&conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!("{} -> room {} reached {} connections", event.name(), room, delivered);
        delivered
    }

    /// Record an authenticated connection in the presence registry.
    pub async fn user_online(&self, conn_id: ConnectionId, user: User) {
        self.inner.presence.lock().await.put(conn_id, user);
    }

    /// Remove a connection from the presence registry, returning its user if
    /// it had authenticated.
    pub async fn user_offline(&self, conn_id: ConnectionId) -> Option<User> {
        self.inner.presence.lock().await.remove(conn_id)
    }

    /// Send the current online list to the public room.
    pub async fn broadcast_presence(&self) {
        let presence = self.inner.presence.lock().await;
        let users = presence.snapshot();
        self.emit_to_room(&RoomId::Public, ServerEvent::UsersUpdate { users }, None)
            .await;
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<PresenceEntry> {
        self.inner.presence.lock().await.snapshot()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

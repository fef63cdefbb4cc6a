//! In-memory room membership.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::message::ConnectionId;

#[derive(Default)]
struct Registry {
    /// room id -> joined connections
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// connection -> joined rooms
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

/// Tracks which live connections belong to which rooms.
///
/// Rooms exist only while they have members. Nothing here is persisted;
/// clients re-join after a reconnect.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Returns `false` if it was already a member.
    pub async fn join(&self, connection: &ConnectionId, room_id: &str) -> bool {
        let mut registry = self.inner.write().await;
        let added = registry
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection.clone());
        registry
            .memberships
            .entry(connection.clone())
            .or_default()
            .insert(room_id.to_string());

        debug!(connection = %connection, room_id, added, "joined room");
        added
    }

    /// Remove a connection from a room. Returns `false` if it was not a member.
    pub async fn leave(&self, connection: &ConnectionId, room_id: &str) -> bool {
        let mut registry = self.inner.write().await;
        let removed = Self::remove_member(&mut registry.rooms, room_id, connection);

        if let Some(rooms) = registry.memberships.get_mut(connection) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                registry.memberships.remove(connection);
            }
        }

        debug!(connection = %connection, room_id, removed, "left room");
        removed
    }

    /// Drop a connection from every room it joined, returning those rooms.
    pub async fn leave_all(&self, connection: &ConnectionId) -> Vec<String> {
        let mut registry = self.inner.write().await;
        let Some(rooms) = registry.memberships.remove(connection) else {
            return Vec::new();
        };

        let mut left: Vec<String> = rooms.into_iter().collect();
        left.sort();
        for room_id in &left {
            Self::remove_member(&mut registry.rooms, room_id, connection);
        }
        left
    }

    /// Current members of a room.
    pub async fn members_of(&self, room_id: &str) -> HashSet<ConnectionId> {
        let registry = self.inner.read().await;
        registry.rooms.get(room_id).cloned().unwrap_or_default()
    }

    /// Rooms a connection has joined, sorted.
    pub async fn rooms_of(&self, connection: &ConnectionId) -> Vec<String> {
        let registry = self.inner.read().await;
        let mut rooms: Vec<String> = registry
            .memberships
            .get(connection)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    fn remove_member(
        rooms: &mut HashMap<String, HashSet<ConnectionId>>,
        room_id: &str,
        connection: &ConnectionId,
    ) -> bool {
        let Some(members) = rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(connection);
        if members.is_empty() {
            rooms.remove(room_id);
        }
        removed
    }
}

//! Group registry — board-scoped fan-out over per-connection channels.
//!
//! DESIGN
//! ======
//! Purely a runtime index, never persisted: connections register an outbound
//! sender on upgrade, join and leave board groups, and `deliver` pushes an
//! event to every current member. Authorization happens in the gateway
//! before `join` is called; this layer only tracks membership.
//!
//! Delivery is best-effort `try_send`. Senders are looked up per member at
//! send time, so a leave or disconnect racing a delivery at worst misses
//! that one event; it can never fail the loop for the remaining members. A
//! connection whose channel is full or closed is skipped, not retried.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::BoardEvent;

/// Outbound channel capacity per connection. A viewer that falls this far
/// behind starts losing events rather than stalling fan-out.
pub const CONNECTION_CHANNEL_CAPACITY: usize = 256;

pub struct GroupRegistry {
    /// Connection id -> outbound sender.
    connections: DashMap<Uuid, mpsc::Sender<BoardEvent>>,
    /// Board id -> member connection ids.
    groups: DashMap<Uuid, HashSet<Uuid>>,
    /// Connection id -> joined board ids, for implicit disconnect cleanup.
    memberships: DashMap<Uuid, HashSet<Uuid>>,
}

impl GroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { connections: DashMap::new(), groups: DashMap::new(), memberships: DashMap::new() }
    }

    /// Track a newly upgraded connection and its outbound channel.
    pub fn register(&self, conn_id: Uuid, tx: mpsc::Sender<BoardEvent>) {
        self.connections.insert(conn_id, tx);
    }

    /// Add a registered connection to a board's group. Returns `false` if
    /// the connection is unknown (already disconnected).
    pub fn join(&self, board_id: Uuid, conn_id: Uuid) -> bool {
        if !self.connections.contains_key(&conn_id) {
            return false;
        }
        self.groups.entry(board_id).or_default().insert(conn_id);
        self.memberships.entry(conn_id).or_default().insert(board_id);
        info!(%board_id, %conn_id, members = self.group_len(board_id), "connection joined group");
        true
    }

    /// Remove a connection from a board's group. Idempotent.
    pub fn leave(&self, board_id: Uuid, conn_id: Uuid) {
        if !self.is_member(board_id, conn_id) {
            return;
        }
        self.remove_member(board_id, conn_id);
        if let Some(mut boards) = self.memberships.get_mut(&conn_id) {
            boards.remove(&board_id);
        }
        debug!(%board_id, %conn_id, "connection left group");
    }

    /// Remove a connection from every group it joined and drop its sender.
    /// Called on transport teardown; clients never leave group-by-group.
    pub fn disconnect(&self, conn_id: Uuid) {
        self.connections.remove(&conn_id);
        let boards = self
            .memberships
            .remove(&conn_id)
            .map(|(_, boards)| boards)
            .unwrap_or_default();
        for board_id in boards {
            self.remove_member(board_id, conn_id);
        }
        info!(%conn_id, "connection removed from registry");
    }

    /// Fan one event out to every connection in the board's group. Returns
    /// the number of connections the event was handed to.
    pub fn deliver(&self, board_id: Uuid, event: &BoardEvent) -> usize {
        debug_assert_eq!(event.board_id(), board_id, "event scoped to a different board");

        let members: Vec<Uuid> = match self.groups.get(&board_id) {
            Some(group) => group.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for conn_id in members {
            let Some(tx) = self.connections.get(&conn_id).map(|entry| entry.value().clone()) else {
                continue;
            };
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(%conn_id, %board_id, kind = event.kind(), error = %e, "skipping connection on delivery");
                }
            }
        }
        delivered
    }

    /// Current member count of a board's group.
    #[must_use]
    pub fn group_len(&self, board_id: Uuid) -> usize {
        self.groups.get(&board_id).map_or(0, |group| group.len())
    }

    /// Whether a connection is currently in a board's group.
    #[must_use]
    pub fn is_member(&self, board_id: Uuid, conn_id: Uuid) -> bool {
        self.groups
            .get(&board_id)
            .is_some_and(|group| group.contains(&conn_id))
    }

    fn remove_member(&self, board_id: Uuid, conn_id: Uuid) {
        if let Some(mut group) = self.groups.get_mut(&board_id) {
            group.remove(&conn_id);
        }
        // Evict empty groups so the index tracks only active boards.
        self.groups.remove_if(&board_id, |_, group| group.is_empty());
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

//! Per-poll subscriber registry used to fan tally updates out to WebSocket clients.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{PollUpdate, ServerMessage},
    state::poll::TallySnapshot,
};

/// Identifier assigned to each WebSocket connection.
pub type ConnectionId = Uuid;

/// Outbound queue of a connection, drained by its writer task.
pub type Outbound = mpsc::UnboundedSender<Message>;

#[derive(Default)]
/// Rooms keyed by poll id, plus the reverse index used on disconnect.
pub struct RoomBroadcaster {
    rooms: DashMap<String, HashMap<ConnectionId, Outbound>>,
    memberships: DashMap<ConnectionId, HashSet<String>>,
}

impl RoomBroadcaster {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `connection` to `poll_id`. Joining twice is harmless.
    pub fn join(&self, poll_id: &str, connection: ConnectionId, tx: Outbound) {
        self.rooms
            .entry(poll_id.to_owned())
            .or_default()
            .insert(connection, tx);
        self.memberships
            .entry(connection)
            .or_default()
            .insert(poll_id.to_owned());
        debug!(poll_id, %connection, "joined room");
    }

    /// Unsubscribe `connection` from `poll_id`. Returns whether it was a member.
    pub fn leave(&self, poll_id: &str, connection: ConnectionId) -> bool {
        let removed = self.remove_member(poll_id, connection);
        if let Some(mut polls) = self.memberships.get_mut(&connection) {
            polls.remove(poll_id);
        }
        self.memberships
            .remove_if(&connection, |_, polls| polls.is_empty());
        removed
    }

    /// Drop `connection` from every room it joined. Returns how many rooms it left.
    pub fn leave_all(&self, connection: ConnectionId) -> usize {
        let Some((_, polls)) = self.memberships.remove(&connection) else {
            return 0;
        };
        polls
            .iter()
            .filter(|poll_id| self.remove_member(poll_id, connection))
            .count()
    }

    /// Send `snapshot` to every current member of the poll's room.
    ///
    /// Members whose queue is closed are removed. Returns the number of
    /// connections the update was queued for.
    pub fn publish(&self, poll_id: &str, snapshot: &TallySnapshot) -> usize {
        let message = ServerMessage::PollUpdated(PollUpdate::from(snapshot));
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(poll_id, error = %err, "failed to serialize poll update");
                return 0;
            }
        };

        let mut closed = Vec::new();
        let mut delivered = 0;
        if let Some(mut room) = self.rooms.get_mut(poll_id) {
            room.retain(|connection, tx| {
                if tx.send(Message::Text(payload.as_str().into())).is_ok() {
                    delivered += 1;
                    true
                } else {
                    closed.push(*connection);
                    false
                }
            });
        }
        self.rooms.remove_if(poll_id, |_, room| room.is_empty());

        for connection in closed {
            debug!(poll_id, %connection, "dropping closed connection from room");
            if let Some(mut polls) = self.memberships.get_mut(&connection) {
                polls.remove(poll_id);
            }
            self.memberships
                .remove_if(&connection, |_, polls| polls.is_empty());
        }

        delivered
    }

    /// Number of connections subscribed to `poll_id`.
    pub fn room_size(&self, poll_id: &str) -> usize {
        self.rooms.get(poll_id).map_or(0, |room| room.len())
    }

    /// Number of polls with at least one subscriber.
    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Whether `connection` is subscribed to `poll_id`.
    pub fn is_member(&self, poll_id: &str, connection: ConnectionId) -> bool {
        self.rooms
            .get(poll_id)
            .is_some_and(|room| room.contains_key(&connection))
    }

    fn remove_member(&self, poll_id: &str, connection: ConnectionId) -> bool {
        let removed = self
            .rooms
            .get_mut(poll_id)
            .is_some_and(|mut room| room.remove(&connection).is_some());
        self.rooms.remove_if(poll_id, |_, room| room.is_empty());
        removed
    }
}

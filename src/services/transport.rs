//! Outbound delivery to connected clients, addressed by connection id or by group.
//!
//! Session runners, matchmaking and presence only talk to [`Transport`]; the WebSocket edge
//! owns the sockets and registers their writer channels with [`ChannelTransport`].

use std::collections::HashSet;

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{dto::ws::ServerMessage, state::UserId};

/// Identifier of one WebSocket connection.
pub type ConnectionId = Uuid;

/// Writer side of a connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// Group every identified connection belongs to.
pub const LOBBY_GROUP: &str = "lobby";

/// Group of the connections seated in a session.
pub fn game_group(session_id: Uuid) -> String {
    format!("game_{session_id}")
}

/// Private channel between two users; identical for both argument orders.
pub fn dm_group(a: UserId, b: UserId) -> String {
    format!("dm_{}_{}", a.min(b), a.max(b))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection `{0}` is not registered")]
    UnknownConnection(ConnectionId),
    #[error("connection `{0}` is closed")]
    ConnectionClosed(ConnectionId),
}

pub trait Transport: Send + Sync {
    /// Deliver `message` to a single connection.
    fn send(&self, connection: ConnectionId, message: &ServerMessage)
    -> Result<(), TransportError>;
    /// Deliver `message` to every member of `group`, returning how many received it.
    fn broadcast(&self, group: &str, message: &ServerMessage) -> usize;
    /// Best-effort [`Transport::send`]; a failed delivery is logged and otherwise ignored.
    fn notify(&self, connection: ConnectionId, message: &ServerMessage) {
        if let Err(err) = self.send(connection, message) {
            warn!(%connection, error = %err, "notification not delivered");
        }
    }
    fn join_group(&self, connection: ConnectionId, group: &str);
    fn leave_group(&self, connection: ConnectionId, group: &str);
    /// Remove every member from `group`.
    fn dissolve_group(&self, group: &str);
}

/// [`Transport`] backed by the per-connection writer channels.
#[derive(Default)]
pub struct ChannelTransport {
    connections: DashMap<ConnectionId, OutboundSender>,
    groups: DashMap<String, HashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, HashSet<String>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ConnectionId, sender: OutboundSender) {
        self.connections.insert(connection, sender);
    }

    /// Drop the connection and all of its group memberships.
    pub fn unregister(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
        let Some((_, groups)) = self.memberships.remove(&connection) else {
            return;
        };
        for group in groups {
            self.remove_member(&group, connection);
        }
    }

    pub fn is_live(&self, connection: ConnectionId) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|sender| !sender.is_closed())
    }

    pub fn group_size(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }

    pub fn is_member(&self, connection: ConnectionId, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(&connection))
    }

    fn remove_member(&self, group: &str, connection: ConnectionId) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(&connection);
        }
        self.groups.remove_if(group, |_, members| members.is_empty());
    }

    fn deliver(&self, connection: ConnectionId, payload: &Utf8Bytes) -> Result<(), TransportError> {
        let sender = self
            .connections
            .get(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        sender
            .send(Message::Text(payload.clone()))
            .map_err(|_| TransportError::ConnectionClosed(connection))
    }
}

/// Serialize once so a broadcast shares the same frame across its recipients.
fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload.into()),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}

impl Transport for ChannelTransport {
    fn send(
        &self,
        connection: ConnectionId,
        message: &ServerMessage,
    ) -> Result<(), TransportError> {
        let Some(payload) = encode(message) else {
            return Ok(());
        };
        self.deliver(connection, &payload)
    }

    fn broadcast(&self, group: &str, message: &ServerMessage) -> usize {
        let members: Vec<ConnectionId> = self
            .groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        if members.is_empty() {
            return 0;
        }
        let Some(payload) = encode(message) else {
            return 0;
        };
        members
            .into_iter()
            .filter(|connection| match self.deliver(*connection, &payload) {
                Ok(()) => true,
                Err(err) => {
                    debug!(group, error = %err, "skipping unreachable group member");
                    false
                }
            })
            .count()
    }

    fn join_group(&self, connection: ConnectionId, group: &str) {
        // The occupied entry pins the connection until both indexes are written, so a
        // concurrent unregister either runs first or sees the new membership.
        let Entry::Occupied(_registered) = self.connections.entry(connection) else {
            debug!(%connection, group, "ignoring group join for unknown connection");
            return;
        };
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(connection);
        self.memberships
            .entry(connection)
            .or_default()
            .insert(group.to_string());
    }

    fn leave_group(&self, connection: ConnectionId, group: &str) {
        self.remove_member(group, connection);
        if let Some(mut groups) = self.memberships.get_mut(&connection) {
            groups.remove(group);
        }
    }

    fn dissolve_group(&self, group: &str) {
        let Some((_, members)) = self.groups.remove(group) else {
            return;
        };
        for connection in members {
            if let Some(mut groups) = self.memberships.get_mut(&connection) {
                groups.remove(group);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(transport: &ChannelTransport) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        transport.register(id, tx);
        (id, rx)
    }

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.as_str().to_owned(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn dm_group_is_order_independent() {
        assert_eq!(dm_group(9, 3), "dm_3_9");
        assert_eq!(dm_group(3, 9), "dm_3_9");
    }

    #[test]
    fn broadcast_reaches_only_group_members() {
        let transport = ChannelTransport::new();
        let (a, mut rx_a) = connect(&transport);
        let (_b, mut rx_b) = connect(&transport);
        transport.join_group(a, "game_x");

        let delivered = transport.broadcast("game_x", &ServerMessage::Pong);

        assert_eq!(delivered, 1);
        assert_eq!(text(rx_a.try_recv().unwrap()), r#"{"type":"pong"}"#);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn unregister_clears_memberships() {
        let transport = ChannelTransport::new();
        let (a, _rx) = connect(&transport);
        transport.join_group(a, LOBBY_GROUP);
        transport.join_group(a, "dm_1_2");

        transport.unregister(a);

        assert_eq!(transport.group_size(LOBBY_GROUP), 0);
        assert_eq!(transport.group_size("dm_1_2"), 0);
        assert_eq!(
            transport.send(a, &ServerMessage::Pong),
            Err(TransportError::UnknownConnection(a))
        );
    }

    #[test]
    fn leaving_a_group_stops_its_broadcasts() {
        let transport = ChannelTransport::new();
        let (a, mut rx_a) = connect(&transport);
        let (b, _rx_b) = connect(&transport);
        transport.join_group(a, "game_z");
        transport.join_group(b, "game_z");

        transport.leave_group(a, "game_z");

        assert_eq!(transport.broadcast("game_z", &ServerMessage::Pong), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(!transport.is_member(a, "game_z"));
    }

    #[test]
    fn dissolve_group_keeps_other_memberships() {
        let transport = ChannelTransport::new();
        let (a, _rx) = connect(&transport);
        transport.join_group(a, LOBBY_GROUP);
        transport.join_group(a, "game_y");

        transport.dissolve_group("game_y");

        assert!(!transport.is_member(a, "game_y"));
        assert!(transport.is_member(a, LOBBY_GROUP));
    }

    #[test]
    fn notify_tolerates_gone_connections() {
        let transport = ChannelTransport::new();
        let (a, mut rx_a) = connect(&transport);
        let (b, rx_b) = connect(&transport);
        drop(rx_b);

        transport.notify(a, &ServerMessage::Pong);
        transport.notify(b, &ServerMessage::Pong);
        transport.notify(Uuid::new_v4(), &ServerMessage::Pong);

        assert_eq!(text(rx_a.try_recv().unwrap()), r#"{"type":"pong"}"#);
    }

    #[test]
    fn join_racing_unregister_leaves_no_membership() {
        let transport = ChannelTransport::new();
        for _ in 0..200 {
            let (a, _rx) = connect(&transport);
            std::thread::scope(|scope| {
                scope.spawn(|| transport.join_group(a, "game_race"));
                scope.spawn(|| transport.unregister(a));
            });

            assert!(!transport.is_member(a, "game_race"));
            assert!(!transport.memberships.contains_key(&a));
        }
        assert_eq!(transport.group_size("game_race"), 0);
    }

    #[test]
    fn closed_connection_is_not_live() {
        let transport = ChannelTransport::new();
        let (a, rx) = connect(&transport);
        drop(rx);

        assert!(!transport.is_live(a));
        assert_eq!(
            transport.send(a, &ServerMessage::Pong),
            Err(TransportError::ConnectionClosed(a))
        );
    }
}

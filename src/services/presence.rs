//! Lobby presence: who is online, pushed to every lobby member and the SSE feed.

use tracing::debug;

use crate::{
    dto::ws::{PresenceEntry, ServerMessage},
    services::{
        identity::Identity,
        sse_events,
        transport::{ConnectionId, LOBBY_GROUP, TransportError},
    },
    state::SharedState,
};

/// Announce a newly registered connection and hand it the current roster.
pub fn on_connect(
    state: &SharedState,
    identity: &Identity,
    connection_id: ConnectionId,
) -> Result<(), TransportError> {
    let transport = state.transport();
    let notified = transport.broadcast(
        LOBBY_GROUP,
        &ServerMessage::Presence {
            user_id: identity.user_id,
            username: identity.username.clone(),
            online: true,
        },
    );
    transport.join_group(connection_id, LOBBY_GROUP);
    debug!(user_id = identity.user_id, notified, "presence online");

    let users = state
        .players()
        .online()
        .into_iter()
        .map(|(user_id, username)| PresenceEntry { user_id, username })
        .collect();
    transport.send(connection_id, &ServerMessage::PresenceList { users })?;
    sse_events::broadcast_presence_changed(state, identity.user_id, &identity.username, true);
    Ok(())
}

/// Tell the lobby a user went offline. The connection must already be unregistered.
pub fn on_disconnect(state: &SharedState, identity: &Identity) {
    let notified = state.transport().broadcast(
        LOBBY_GROUP,
        &ServerMessage::Presence {
            user_id: identity.user_id,
            username: identity.username.clone(),
            online: false,
        },
    );
    debug!(user_id = identity.user_id, notified, "presence offline");
    sse_events::broadcast_presence_changed(state, identity.user_id, &identity.username, false);
}

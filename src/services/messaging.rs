//! Direct messages between two online users over their private channel group.

use thiserror::Error;
use tracing::debug;

use crate::{
    dto::{validation::escape_html, ws::ServerMessage},
    services::{
        identity::Identity,
        transport::{ConnectionId, dm_group},
    },
    state::{SharedState, UserId},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("user `{0}` is not online")]
    UserNotFound(String),
    #[error("user {0} cannot message themselves")]
    SelfMessage(UserId),
}

/// Deliver `content` to `to_username` and echo it back to the sender.
///
/// Both connections join the pair's channel group on first use. Returns how many
/// connections received the message.
pub fn send_direct(
    state: &SharedState,
    from: &Identity,
    from_connection: ConnectionId,
    to_username: &str,
    content: &str,
) -> Result<usize, MessagingError> {
    let target = state
        .players()
        .find_by_username(to_username)
        .ok_or_else(|| MessagingError::UserNotFound(to_username.to_string()))?;
    if target.user_id == from.user_id {
        return Err(MessagingError::SelfMessage(from.user_id));
    }

    let channel = dm_group(from.user_id, target.user_id);
    let transport = state.transport();
    transport.join_group(from_connection, &channel);
    transport.join_group(target.connection_id, &channel);

    let delivered = transport.broadcast(
        &channel,
        &ServerMessage::DirectMessage {
            from_user_id: from.user_id,
            from_username: from.username.clone(),
            channel: channel.clone(),
            content: escape_html(content),
        },
    );
    debug!(from = from.user_id, to = target.user_id, %channel, delivered, "direct message");
    Ok(delivered)
}

//! Who is online, and through which connection.

use std::time::Instant;

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

use crate::services::{identity::Identity, transport::ConnectionId};

use super::UserId;

/// The live connection of an identified user.
#[derive(Debug, Clone)]
pub struct PlayerConnection {
    pub user_id: UserId,
    pub username: String,
    pub connection_id: ConnectionId,
    pub connected_at: Instant,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("user {0} already has a live connection")]
    AlreadyConnected(UserId),
    #[error("username `{0}` is held by another connected user")]
    UsernameTaken(String),
}

/// At most one live connection per user, plus a case-insensitive username index.
#[derive(Default)]
pub struct PlayerRegistry {
    by_user: DashMap<UserId, PlayerConnection>,
    by_name: DashMap<String, UserId>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the user's single connection slot.
    ///
    /// A second connection for the same user is refused; the first one keeps the slot.
    pub fn register(
        &self,
        identity: &Identity,
        connection_id: ConnectionId,
    ) -> Result<(), RegistrationError> {
        match self.by_user.entry(identity.user_id) {
            Entry::Occupied(_) => Err(RegistrationError::AlreadyConnected(identity.user_id)),
            Entry::Vacant(slot) => {
                match self.by_name.entry(username_key(&identity.username)) {
                    Entry::Occupied(owner) if *owner.get() != identity.user_id => {
                        return Err(RegistrationError::UsernameTaken(identity.username.clone()));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(name) => {
                        name.insert(identity.user_id);
                    }
                }
                slot.insert(PlayerConnection {
                    user_id: identity.user_id,
                    username: identity.username.clone(),
                    connection_id,
                    connected_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Release the slot if it is still held by `connection_id`.
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let Some((_, player)) = self
            .by_user
            .remove_if(&user_id, |_, player| player.connection_id == connection_id)
        else {
            return false;
        };
        self.by_name
            .remove_if(&username_key(&player.username), |_, owner| *owner == user_id);
        true
    }

    pub fn get(&self, user_id: UserId) -> Option<PlayerConnection> {
        self.by_user.get(&user_id).map(|entry| entry.clone())
    }

    pub fn connection_of(&self, user_id: UserId) -> Option<ConnectionId> {
        self.by_user.get(&user_id).map(|entry| entry.connection_id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<PlayerConnection> {
        let user_id = *self.by_name.get(&username_key(username))?;
        self.get(user_id)
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.by_user.contains_key(&user_id)
    }

    /// Everyone online, ordered by user id.
    pub fn online(&self) -> Vec<(UserId, String)> {
        let mut users: Vec<_> = self
            .by_user
            .iter()
            .map(|entry| (entry.user_id, entry.username.clone()))
            .collect();
        users.sort_unstable_by_key(|(user_id, _)| *user_id);
        users
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

fn username_key(username: &str) -> String {
    username.to_lowercase()
}

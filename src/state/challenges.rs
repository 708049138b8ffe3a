//! Pending direct challenges between two online users.

use std::time::Instant;

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use uuid::Uuid;

use super::{UserId, sessions::PairKey};

/// A challenge waiting for the target's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: Uuid,
    pub from: UserId,
    pub from_username: String,
    pub to: UserId,
    pub to_username: String,
    pub issued_at: Instant,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("a challenge between users {0} and {1} is already pending")]
    AlreadyPending(UserId, UserId),
    #[error("users cannot challenge themselves")]
    SelfChallenge,
}

/// At most one pending challenge per pair of users, whatever its direction.
#[derive(Default)]
pub struct ChallengeBook {
    pending: DashMap<PairKey, Challenge>,
}

impl ChallengeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, challenge: Challenge) -> Result<(), ChallengeError> {
        if challenge.from == challenge.to {
            return Err(ChallengeError::SelfChallenge);
        }
        match self.pending.entry(PairKey::new(challenge.from, challenge.to)) {
            Entry::Occupied(_) => Err(ChallengeError::AlreadyPending(challenge.from, challenge.to)),
            Entry::Vacant(slot) => {
                slot.insert(challenge);
                Ok(())
            }
        }
    }

    /// Remove and return the challenge `from` sent to `to`. A challenge in the other
    /// direction is left alone.
    pub fn take(&self, from: UserId, to: UserId) -> Option<Challenge> {
        self.pending
            .remove_if(&PairKey::new(from, to), |_, challenge| {
                challenge.from == from && challenge.to == to
            })
            .map(|(_, challenge)| challenge)
    }

    /// Remove the challenge with `id` if it is still the pending one for its pair.
    pub fn expire(&self, from: UserId, to: UserId, id: Uuid) -> Option<Challenge> {
        self.pending
            .remove_if(&PairKey::new(from, to), |_, challenge| challenge.id == id)
            .map(|(_, challenge)| challenge)
    }

    /// Drop every challenge involving `user`.
    pub fn drop_user(&self, user: UserId) -> Vec<Challenge> {
        let keys: Vec<PairKey> = self
            .pending
            .iter()
            .filter(|entry| entry.from == user || entry.to == user)
            .map(|entry| *entry.key())
            .collect();
        keys.into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|(_, challenge)| challenge))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

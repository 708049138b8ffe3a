use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::{
    engine::{Difficulty, GameMode},
    state::{
        UserId,
        state_machine::{FinishReason, GameStatus},
    },
};

/// Lifecycle of a persisted session record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoredStatus {
    Waiting,
    Countdown,
    Playing,
    Finished,
}

/// Durable view of one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Identifier shared with the in-memory session.
    pub id: Uuid,
    pub mode: GameMode,
    /// Only set for single-player sessions.
    pub difficulty: Option<Difficulty>,
    /// User seated on the left.
    pub player1_id: UserId,
    /// User seated on the right; `None` when the right paddle is the AI.
    pub player2_id: Option<UserId>,
    pub status: StoredStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Final outcome, written exactly once.
    pub result: Option<SessionResultEntity>,
}

/// Outcome of a finished match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResultEntity {
    pub session_id: Uuid,
    pub mode: GameMode,
    pub player1_id: UserId,
    pub player2_id: Option<UserId>,
    /// `None` when nobody won (abandoned single-player match) or the AI won.
    pub winner_id: Option<UserId>,
    pub score_left: u32,
    pub score_right: u32,
    pub reason: FinishReason,
    pub finished_at: SystemTime,
}

impl SessionResultEntity {
    /// Session document to create when the result arrives before the session was ever stored.
    pub fn to_session(&self) -> SessionEntity {
        SessionEntity {
            id: self.session_id,
            mode: self.mode,
            difficulty: None,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            status: StoredStatus::Finished,
            created_at: self.finished_at,
            updated_at: self.finished_at,
            result: Some(self.clone()),
        }
    }
}

impl From<GameStatus> for StoredStatus {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::Waiting => StoredStatus::Waiting,
            GameStatus::Countdown => StoredStatus::Countdown,
            GameStatus::Playing => StoredStatus::Playing,
            GameStatus::Finished(_) => StoredStatus::Finished,
        }
    }
}

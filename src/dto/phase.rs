use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::state_machine::GameStatus;

/// Session status exposed to clients (WebSocket, REST and SSE).
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleGameStatus {
    /// Waiting for both players.
    Waiting,
    /// Counting down to the serve.
    Countdown,
    /// Ball in play.
    Playing,
    /// Match over.
    Finished,
}

impl From<GameStatus> for VisibleGameStatus {
    fn from(value: GameStatus) -> Self {
        match value {
            GameStatus::Waiting => VisibleGameStatus::Waiting,
            GameStatus::Countdown => VisibleGameStatus::Countdown,
            GameStatus::Playing => VisibleGameStatus::Playing,
            GameStatus::Finished(_) => VisibleGameStatus::Finished,
        }
    }
}

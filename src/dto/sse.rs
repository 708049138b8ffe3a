use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    engine::{Difficulty, GameMode, Side},
    state::{UserId, state_machine::FinishReason},
};

use super::game::FinalScore;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    pub stream: String,
    pub message: String,
    /// Whether results are currently being kept in memory only.
    pub degraded: bool,
    pub online: usize,
    pub queue_size: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceChangedEvent {
    pub user_id: UserId,
    pub username: String,
    pub online: bool,
    pub online_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchStartedEvent {
    pub session_id: Uuid,
    pub mode: GameMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    pub player1_id: UserId,
    pub player2_id: Option<UserId>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchFinishedEvent {
    pub session_id: Uuid,
    pub winner: Option<Side>,
    pub winner_id: Option<UserId>,
    pub reason: FinishReason,
    pub final_score: FinalScore,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueSizeEvent {
    pub size: usize,
}

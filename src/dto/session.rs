use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    engine::{Difficulty, GameMode},
    state::{
        UserId,
        sessions::SessionInfo,
        state_machine::{FinishReason, GameStatus},
    },
};

use super::{format_system_time, phase::VisibleGameStatus};

/// One live (or not yet persisted) session as listed by `GET /sessions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub mode: GameMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    pub player1_id: UserId,
    pub player2_id: Option<UserId>,
    pub status: VisibleGameStatus,
    /// Why the session ended, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FinishReason>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// The result is held in memory until storage accepts it.
    pub pending_persistence: bool,
}

impl From<SessionInfo> for SessionSummary {
    fn from(info: SessionInfo) -> Self {
        let reason = match info.status {
            GameStatus::Finished(reason) => Some(reason),
            _ => None,
        };
        Self {
            id: info.id,
            mode: info.mode,
            difficulty: info.difficulty,
            player1_id: info.seats.left,
            player2_id: info.seats.right,
            status: info.status.into(),
            reason,
            created_at: format_system_time(info.created_at),
            pending_persistence: info.pending_persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::sessions::Seats;

    #[test]
    fn finished_sessions_expose_their_reason() {
        let info = SessionInfo {
            id: Uuid::nil(),
            mode: GameMode::Multiplayer,
            difficulty: None,
            seats: Seats::pair(4, 9),
            status: GameStatus::Finished(FinishReason::Desertion),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(86_400),
            pending_persistence: true,
        };

        let json = serde_json::to_value(SessionSummary::from(info)).unwrap();

        assert_eq!(json["status"], "finished");
        assert_eq!(json["reason"], "desertion");
        assert_eq!(json["player2_id"], 9);
        assert_eq!(json["created_at"], "1970-01-02T00:00:00Z");
        assert!(json.get("difficulty").is_none());
    }
}

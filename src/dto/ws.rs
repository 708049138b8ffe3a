use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::{
    engine::{Difficulty, GameMode, Side},
    state::{UserId, state_machine::FinishReason},
};

use super::{
    game::{BallPrediction, FinalScore, GameStateSnapshot},
    validation::{
        validate_direction, validate_message_content, validate_timestamp, validate_username,
    },
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame of every connection.
    Identify { token: String },
    JoinQueue,
    LeaveQueue,
    /// Confirms the last `match_found` proposal.
    Ready,
    StartSinglePlayer {
        #[serde(default)]
        difficulty: Difficulty,
    },
    PaddleMove {
        /// Claimed side; ignored unless it matches the sender's seat.
        #[serde(default)]
        side: Option<Side>,
        #[serde(default)]
        direction: i8,
        timestamp: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Option<Object>)]
        message_id: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<UserId>,
    },
    ForceStop {
        #[serde(default)]
        side: Option<Side>,
        #[serde(default)]
        timestamp: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<UserId>,
    },
    Challenge {
        from_user_id: UserId,
        to_username: String,
    },
    Accept {
        from_user_id: UserId,
        to_username: String,
    },
    Reject {
        from_user_id: UserId,
        to_username: String,
    },
    /// Ask for a resync of the sender's running session.
    Rejoin,
    LeaveGame,
    DirectMessage { to_username: String, content: String },
    Ping,
    #[serde(other)]
    Unknown,
}

/// Why an inbound frame was dropped before dispatch.
#[derive(Debug, Error)]
pub enum MessageDecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, MessageDecodeError> {
        let message: Self = serde_json::from_str(raw)?;
        message.validate_payload()?;
        Ok(message)
    }

    pub fn identify_token(&self) -> Option<&str> {
        match self {
            Self::Identify { token } => Some(token.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "identify",
            Self::JoinQueue => "join_queue",
            Self::LeaveQueue => "leave_queue",
            Self::Ready => "ready",
            Self::StartSinglePlayer { .. } => "start_single_player",
            Self::PaddleMove { .. } => "paddle_move",
            Self::ForceStop { .. } => "force_stop",
            Self::Challenge { .. } => "challenge",
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::Rejoin => "rejoin",
            Self::LeaveGame => "leave_game",
            Self::DirectMessage { .. } => "direct_message",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        }
    }

    fn validate_payload(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut check = |field: &'static str, outcome: Result<(), ValidationError>| {
            if let Err(err) = outcome {
                errors.add(field, err);
            }
        };
        match self {
            Self::PaddleMove {
                direction,
                timestamp,
                ..
            } => {
                check("direction", validate_direction(*direction));
                check("timestamp", validate_timestamp(*timestamp));
            }
            Self::ForceStop { timestamp, .. } => {
                check("timestamp", validate_timestamp(*timestamp));
            }
            Self::Challenge { to_username, .. }
            | Self::Accept { to_username, .. }
            | Self::Reject { to_username, .. } => {
                check("to_username", validate_username(to_username));
            }
            Self::DirectMessage {
                to_username,
                content,
            } => {
                check("to_username", validate_username(to_username));
                check("content", validate_message_content(content));
            }
            _ => {}
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One online user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Queued,
    /// Put back at the head of the queue after an unconfirmed proposal.
    Requeued,
    Left,
}

/// Machine-readable failure categories carried by `error` messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    IdentificationRequired,
    IdentificationFailed,
    AlreadyConnected,
    InvalidMessage,
    IdentityMismatch,
    AlreadyQueued,
    AlreadyInGame,
    NotInGame,
    UserNotFound,
    ChallengeNotFound,
    ChallengeConflict,
    ServiceUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Identified {
        user_id: UserId,
        username: String,
    },
    /// Sent once after identification.
    PresenceList {
        users: Vec<PresenceEntry>,
    },
    Presence {
        user_id: UserId,
        username: String,
        online: bool,
    },
    QueueStatus {
        status: QueueState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    MatchFound {
        match_id: Uuid,
        opponent_id: UserId,
        opponent_username: String,
        /// Time left to answer with `ready`.
        expires_in_ms: u64,
    },
    GameStart {
        session_id: Uuid,
        player1_id: UserId,
        player2_id: Option<UserId>,
        /// Side controlled by the recipient.
        side: Side,
        mode: GameMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
    },
    GameState {
        state: GameStateSnapshot,
    },
    /// Full state plus upcoming ball positions, for a reconnecting client.
    Resync {
        session_id: Uuid,
        side: Side,
        state: GameStateSnapshot,
        prediction: BallPrediction,
    },
    GameFinished {
        winner: Option<Side>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_id: Option<UserId>,
        reason: FinishReason,
        final_score: FinalScore,
    },
    ChallengeReceived {
        from_user_id: UserId,
        from_username: String,
    },
    ChallengeRejected {
        by_user_id: UserId,
        by_username: String,
    },
    ChallengeExpired {
        username: String,
    },
    DirectMessage {
        from_user_id: UserId,
        from_username: String,
        channel: String,
        /// HTML-escaped text.
        content: String,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

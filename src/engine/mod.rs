//! Authoritative Pong simulation: ball and paddle entities, collision and scoring rules,
//! the single-player AI and the per-match [`GameSession`].
//!
//! Everything here is synchronous and owned by exactly one session task at runtime.

pub mod ai;
pub mod ball;
pub mod collision;
pub mod paddle;
pub mod session;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use ai::{AiController, DifficultyPreset};
pub use ball::{Ball, ServeSpread};
pub use paddle::Paddle;
pub use session::{GameResult, GameSession, InputRejected, PaddleInput, TickOutcome};

/// Which half of the court a paddle defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opponent(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// Whether the right paddle is driven by a second human or by the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    SinglePlayer,
    Multiplayer,
}

/// AI strength for single-player matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Nightmare,
}

impl Difficulty {
    /// Tuning knobs for this difficulty.
    pub fn preset(self) -> DifficultyPreset {
        match self {
            Difficulty::Easy => DifficultyPreset {
                randomness: 60.0,
                miss_chance: 0.25,
                reaction_delay: 0.45,
                ball_speed: 5.0,
            },
            Difficulty::Medium => DifficultyPreset {
                randomness: 35.0,
                miss_chance: 0.12,
                reaction_delay: 0.30,
                ball_speed: 6.0,
            },
            Difficulty::Hard => DifficultyPreset {
                randomness: 15.0,
                miss_chance: 0.05,
                reaction_delay: 0.15,
                ball_speed: 7.5,
            },
            Difficulty::Nightmare => DifficultyPreset {
                randomness: 4.0,
                miss_chance: 0.01,
                reaction_delay: 0.05,
                ball_speed: 9.0,
            },
        }
    }
}

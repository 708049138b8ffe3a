use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::{Ball, GameResult, GameSession, Paddle};

use super::phase::VisibleGameStatus;

/// Number of future ball positions sent with a resync.
pub const PREDICTION_TICKS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct BallState {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub speed_x: f64,
    pub speed_y: f64,
}

impl From<&Ball> for BallState {
    fn from(ball: &Ball) -> Self {
        Self {
            x: ball.x,
            y: ball.y,
            radius: ball.radius,
            speed_x: ball.speed_x,
            speed_y: ball.speed_y,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct PaddleState {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub score: u32,
    pub moving: bool,
}

impl From<&Paddle> for PaddleState {
    fn from(paddle: &Paddle) -> Self {
        Self {
            x: paddle.x,
            y: paddle.y,
            width: paddle.width,
            height: paddle.height,
            score: paddle.score,
            moving: paddle.moving,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct PaddlesState {
    pub left: PaddleState,
    pub right: PaddleState,
}

/// Everything a client needs to draw one frame.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct GameStateSnapshot {
    pub ball: BallState,
    pub paddles: PaddlesState,
    pub status: VisibleGameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<u8>,
    /// Physics is frozen while a seat is vacant.
    #[serde(default)]
    pub paused: bool,
    pub tick: u64,
}

impl From<&GameSession> for GameStateSnapshot {
    fn from(session: &GameSession) -> Self {
        Self {
            ball: BallState::from(&session.ball),
            paddles: PaddlesState {
                left: PaddleState::from(&session.left),
                right: PaddleState::from(&session.right),
            },
            status: session.status().into(),
            countdown: session.countdown(),
            paused: session.is_suspended(),
            tick: session.ticks(),
        }
    }
}

/// Extrapolated ball path handed to a reconnecting client.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct BallPrediction {
    /// Upcoming `[x, y]` positions, one per tick.
    #[schema(value_type = Vec<Vec<f64>>)]
    pub path: Vec<[f64; 2]>,
    pub tick: u64,
    pub tick_rate: u32,
}

impl From<&GameSession> for BallPrediction {
    fn from(session: &GameSession) -> Self {
        Self {
            path: session
                .predict_ball_path(PREDICTION_TICKS)
                .into_iter()
                .map(|(x, y)| [x, y])
                .collect(),
            tick: session.ticks(),
            tick_rate: session.settings().tick_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FinalScore {
    pub left: u32,
    pub right: u32,
}

impl From<&GameResult> for FinalScore {
    fn from(result: &GameResult) -> Self {
        Self {
            left: result.score_left,
            right: result.score_right,
        }
    }
}

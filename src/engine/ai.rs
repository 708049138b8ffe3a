//! Single-player opponent.
//!
//! The AI sees only what a player sees: the ball's current position and velocity. It
//! extrapolates the trajectory (walls included) to its paddle, then blurs the result with
//! difficulty-dependent jitter, reaction latency and the occasional deliberate miss.

use rand::Rng;

use super::{Ball, Difficulty, Paddle, Side};

/// Seconds of simulated time between two trajectory predictions.
pub const PREDICTION_INTERVAL: f64 = 1.0 / 30.0;
/// Upper bound on simulated steps per prediction.
pub const MAX_PREDICTION_STEPS: usize = 500;

/// Tuning knobs of a [`Difficulty`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyPreset {
    /// Maximum positional error added to a prediction, in pixels.
    pub randomness: f64,
    /// Probability of ignoring the prediction for a whole approach.
    pub miss_chance: f64,
    /// Seconds between the ball turning toward the AI and the AI reacting.
    pub reaction_delay: f64,
    /// Ball base speed for matches at this difficulty, in pixels per tick.
    pub ball_speed: f64,
}

/// Decisions frozen for the duration of one approach of the ball.
#[derive(Debug, Clone, Copy)]
struct Approach {
    started_at: f64,
    offset: f64,
    miss_y: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AiController {
    side: Side,
    difficulty: Difficulty,
    preset: DifficultyPreset,
    last_prediction_at: Option<f64>,
    approach: Option<Approach>,
}

impl AiController {
    pub fn new(difficulty: Difficulty, side: Side) -> Self {
        Self {
            side,
            difficulty,
            preset: difficulty.preset(),
            last_prediction_at: None,
            approach: None,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn preset(&self) -> DifficultyPreset {
        self.preset
    }

    /// Re-aim `paddle` if a prediction is due at simulated time `now` (seconds).
    pub fn update<R: Rng>(
        &mut self,
        ball: &Ball,
        paddle: &mut Paddle,
        canvas_height: f64,
        now: f64,
        rng: &mut R,
    ) {
        if self
            .last_prediction_at
            .is_some_and(|last| now - last < PREDICTION_INTERVAL)
        {
            return;
        }
        self.last_prediction_at = Some(now);

        let approaching = match self.side {
            Side::Left => ball.speed_x < 0.0,
            Side::Right => ball.speed_x > 0.0,
        };
        if !approaching {
            self.approach = None;
            paddle.set_target(paddle.max_y(canvas_height) / 2.0, canvas_height);
            return;
        }

        let preset = self.preset;
        let approach = *self.approach.get_or_insert_with(|| Approach {
            started_at: now,
            offset: if preset.randomness > 0.0 {
                rng.random_range(-preset.randomness..=preset.randomness)
            } else {
                0.0
            },
            miss_y: rng
                .random_bool(preset.miss_chance.clamp(0.0, 1.0))
                .then(|| rng.random_range(0.0..=canvas_height)),
        });
        if now - approach.started_at < preset.reaction_delay {
            return;
        }

        let face_x = match self.side {
            Side::Left => paddle.x + paddle.width,
            Side::Right => paddle.x,
        };
        let target_center = match predict_intercept(ball, face_x, canvas_height) {
            Some(y) => approach.miss_y.unwrap_or(y + approach.offset),
            None => canvas_height / 2.0,
        };
        paddle.set_target(target_center - paddle.height / 2.0, canvas_height);
    }
}

/// Extrapolate the ball until its center reaches `target_x`, reflecting off the walls.
///
/// Returns `None` when the ball is not moving horizontally or does not get there within
/// [`MAX_PREDICTION_STEPS`] steps.
pub fn predict_intercept(ball: &Ball, target_x: f64, canvas_height: f64) -> Option<f64> {
    if ball.speed_x.abs() <= f64::EPSILON {
        return None;
    }
    let reached = |x: f64| {
        if ball.speed_x > 0.0 {
            x >= target_x
        } else {
            x <= target_x
        }
    };

    let (mut x, mut y, mut speed_y) = (ball.x, ball.y, ball.speed_y);
    for _ in 0..MAX_PREDICTION_STEPS {
        if reached(x) {
            return Some(y);
        }
        x += ball.speed_x;
        y += speed_y;
        if y - ball.radius < 0.0 {
            y = ball.radius;
            speed_y = speed_y.abs();
        } else if y + ball.radius > canvas_height {
            y = canvas_height - ball.radius;
            speed_y = -speed_y.abs();
        }
    }
    None
}

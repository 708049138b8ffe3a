use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::GameSettings,
    state::state_machine::{
        FinishReason, GameEvent, GameStateMachine, GameStatus, InvalidTransition,
    },
};

use super::{AiController, Ball, Difficulty, GameMode, Paddle, ServeSpread, Side, collision};

/// What a single [`GameSession::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing changed (waiting, suspended, finished, or mid countdown step).
    Idle,
    /// The countdown moved to a new value.
    Countdown(u8),
    /// GO: the ball was served and the match is playing.
    Started,
    /// Physics advanced without a point.
    Advanced,
    /// `side` scored; the ball was served again.
    Scored(Side),
    /// The match ended during this tick.
    Finished(GameResult),
}

/// Outcome of a finished match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameResult {
    pub winner: Option<Side>,
    pub reason: FinishReason,
    pub score_left: u32,
    pub score_right: u32,
}

/// A paddle command after decoding and ownership checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleInput {
    pub direction: i8,
    /// Client clock, used only to order commands of the same side.
    pub timestamp: f64,
    pub force_stop: bool,
}

/// Why a paddle command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InputRejected {
    #[error("session is finished")]
    Finished,
    #[error("paddle {0:?} is not accepting input")]
    NotReady(Side),
    #[error("stale command for {side:?}: {timestamp} is older than {last}")]
    Stale { side: Side, timestamp: f64, last: f64 },
    #[error("side {0:?} is not controlled by this player")]
    WrongSide(Side),
}

/// Authoritative state of one match: ball, paddles, score, countdown and status.
#[derive(Debug, Clone)]
pub struct GameSession {
    settings: GameSettings,
    mode: GameMode,
    winning_score: u32,
    machine: GameStateMachine,
    pub ball: Ball,
    pub left: Paddle,
    pub right: Paddle,
    ai: Option<AiController>,
    countdown: Option<u8>,
    countdown_elapsed: f64,
    last_input: [Option<f64>; 2],
    /// Simulated seconds spent playing; drives the AI cadence.
    clock: f64,
    ticks: u64,
    suspended: bool,
    result: Option<GameResult>,
    rng: StdRng,
}

impl GameSession {
    /// Build a session in `waiting`. Single-player sessions get an AI on the right side and
    /// use the difficulty's ball speed.
    pub fn new(settings: &GameSettings, mode: GameMode, difficulty: Option<Difficulty>) -> Self {
        Self::with_rng(settings, mode, difficulty, StdRng::from_rng(&mut rand::rng()))
    }

    pub fn with_rng(
        settings: &GameSettings,
        mode: GameMode,
        difficulty: Option<Difficulty>,
        rng: StdRng,
    ) -> Self {
        let height = settings.canvas_height;
        let left = Paddle::new(
            settings.paddle_margin,
            height,
            settings.paddle_width,
            settings.paddle_height,
            settings.paddle_speed,
        );
        let right = Paddle::new(
            settings.canvas_width - settings.paddle_margin - settings.paddle_width,
            height,
            settings.paddle_width,
            settings.paddle_height,
            settings.paddle_speed,
        );

        let (ai, ball_speed) = match mode {
            GameMode::SinglePlayer => {
                let difficulty = difficulty.unwrap_or_default();
                (
                    Some(AiController::new(difficulty, Side::Right)),
                    difficulty.preset().ball_speed,
                )
            }
            GameMode::Multiplayer => (None, settings.ball_speed),
        };

        Self {
            settings: settings.clone(),
            mode,
            winning_score: settings.winning_score.max(1),
            machine: GameStateMachine::new(),
            ball: Ball::new(
                settings.canvas_width / 2.0,
                height / 2.0,
                settings.ball_radius,
                ball_speed,
            ),
            left,
            right,
            ai,
            countdown: None,
            countdown_elapsed: 0.0,
            last_input: [None, None],
            clock: 0.0,
            ticks: 0,
            suspended: false,
            result: None,
            rng,
        }
    }

    pub fn status(&self) -> GameStatus {
        self.machine.status()
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.ai.as_ref().map(AiController::difficulty)
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn winning_score(&self) -> u32 {
        self.winning_score
    }

    pub fn countdown(&self) -> Option<u8> {
        self.countdown
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Seats are filled: re-center everything, open the input gates and start the countdown.
    pub fn start_countdown(&mut self) -> Result<(), InvalidTransition> {
        self.machine.apply(GameEvent::PlayersReady)?;
        let height = self.settings.canvas_height;
        for side in Side::BOTH {
            let paddle = self.paddle_mut(side);
            paddle.center(height);
            paddle.reset_state();
        }
        self.recenter_ball();
        self.countdown = Some(self.settings.countdown_from);
        self.countdown_elapsed = 0.0;
        if self.settings.countdown_from == 0 {
            self.begin_play();
        }
        Ok(())
    }

    /// Advance the session by `dt` seconds of simulated time.
    pub fn tick(&mut self, dt: f64) -> TickOutcome {
        if self.suspended {
            return TickOutcome::Idle;
        }
        match self.status() {
            GameStatus::Waiting | GameStatus::Finished(_) => TickOutcome::Idle,
            GameStatus::Countdown => self.advance_countdown(dt),
            GameStatus::Playing => self.step_physics(dt),
        }
    }

    fn advance_countdown(&mut self, dt: f64) -> TickOutcome {
        let Some(value) = self.countdown else {
            return TickOutcome::Idle;
        };
        self.countdown_elapsed += dt;
        let step = self.settings.countdown_step.as_secs_f64();
        if self.countdown_elapsed < step {
            return TickOutcome::Idle;
        }
        self.countdown_elapsed -= step;

        let next = value.saturating_sub(1);
        if next == 0 {
            self.begin_play();
            TickOutcome::Started
        } else {
            self.countdown = Some(next);
            TickOutcome::Countdown(next)
        }
    }

    fn begin_play(&mut self) {
        if self.machine.apply(GameEvent::CountdownElapsed).is_err() {
            return;
        }
        self.countdown = None;
        let toward = if self.rng.random_bool(0.5) {
            Side::Left
        } else {
            Side::Right
        };
        self.serve(toward);
    }

    fn step_physics(&mut self, dt: f64) -> TickOutcome {
        let width = self.settings.canvas_width;
        let height = self.settings.canvas_height;
        self.clock += dt;
        self.ticks += 1;

        self.ball.update(height);
        if let Some(ai) = self.ai.as_mut() {
            ai.update(&self.ball, &mut self.right, height, self.clock, &mut self.rng);
        }
        self.left.update(height);
        self.right.update(height);

        collision::resolve_paddle_hit(&mut self.ball, &self.left, Side::Left, &mut self.rng);
        collision::resolve_paddle_hit(&mut self.ball, &self.right, Side::Right, &mut self.rng);

        let Some(scorer) = collision::scoring_side(&self.ball, width) else {
            return TickOutcome::Advanced;
        };

        let score = {
            let paddle = self.paddle_mut(scorer);
            paddle.score += 1;
            paddle.score
        };
        if score >= self.winning_score {
            self.recenter_ball();
            return match self.finish(FinishReason::Victory, Some(scorer)) {
                Some(result) => TickOutcome::Finished(result),
                None => TickOutcome::Advanced,
            };
        }
        self.serve(scorer.opponent());
        TickOutcome::Scored(scorer)
    }

    /// Apply a paddle command for `side`. Ownership is checked by the caller.
    pub fn apply_input(&mut self, side: Side, input: PaddleInput) -> Result<(), InputRejected> {
        if self.status().is_finished() {
            return Err(InputRejected::Finished);
        }
        if self.mode == GameMode::SinglePlayer && side == Side::Right {
            return Err(InputRejected::WrongSide(side));
        }

        let height = self.settings.canvas_height;
        if input.force_stop {
            self.paddle_mut(side).force_stop();
            return Ok(());
        }

        if let Some(last) = self.last_input[side.index()] {
            if input.timestamp < last {
                return Err(InputRejected::Stale {
                    side,
                    timestamp: input.timestamp,
                    last,
                });
            }
        }
        if !self.paddle(side).ready_for_input {
            return Err(InputRejected::NotReady(side));
        }

        self.last_input[side.index()] = Some(input.timestamp);
        self.paddle_mut(side).move_by(input.direction, height);
        Ok(())
    }

    /// `side` left the match: the opponent wins by desertion.
    pub fn forfeit(&mut self, side: Side) -> Option<GameResult> {
        self.finish(FinishReason::Desertion, Some(side.opponent()))
    }

    /// End the match without a winner.
    pub fn abandon(&mut self) -> Option<GameResult> {
        self.finish(FinishReason::Abandoned, None)
    }

    /// Freeze physics and countdown until [`GameSession::resume`].
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Positions of the ball over the next `ticks` ticks, assuming no paddle contact.
    pub fn predict_ball_path(&self, ticks: usize) -> Vec<(f64, f64)> {
        if self.status() != GameStatus::Playing {
            return Vec::new();
        }
        let height = self.settings.canvas_height;
        let mut ball = self.ball.clone();
        (0..ticks)
            .map(|_| {
                ball.update(height);
                (ball.x, ball.y)
            })
            .collect()
    }

    fn finish(&mut self, reason: FinishReason, winner: Option<Side>) -> Option<GameResult> {
        self.machine.apply(GameEvent::Finish(reason)).ok()?;
        self.countdown = None;
        self.suspended = false;
        self.ball.halt();
        for side in Side::BOTH {
            let paddle = self.paddle_mut(side);
            paddle.target_y = None;
            paddle.moving = false;
            paddle.ready_for_input = false;
        }
        let result = GameResult {
            winner,
            reason,
            score_left: self.left.score,
            score_right: self.right.score,
        };
        self.result = Some(result);
        Some(result)
    }

    fn serve(&mut self, toward: Side) {
        let (x, y) = self.center();
        let spread = ServeSpread::for_mode(self.mode);
        self.ball.reset(x, y, None, toward, spread, &mut self.rng);
    }

    fn recenter_ball(&mut self) {
        let (x, y) = self.center();
        self.ball.x = x;
        self.ball.y = y;
        self.ball.prev_x = x;
        self.ball.prev_y = y;
        self.ball.halt();
    }

    fn center(&self) -> (f64, f64) {
        (
            self.settings.canvas_width / 2.0,
            self.settings.canvas_height / 2.0,
        )
    }
}

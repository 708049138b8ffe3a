use serde::{Deserialize, Serialize};

/// Distance (px) under which a paddle stops chasing its target instead of jittering around it.
pub const DEAD_ZONE: f64 = 7.0;

/// A paddle. `x` is fixed for the whole match; `y` is the top edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Maximum travel per command or per tick, in pixels.
    pub speed: f64,
    pub score: u32,
    /// Where smoothed movement is heading, if anywhere.
    pub target_y: Option<f64>,
    pub moving: bool,
    /// Gate for regular movement commands; `force_stop` ignores it.
    pub ready_for_input: bool,
}

impl Paddle {
    /// A vertically centered paddle that does not accept input yet.
    pub fn new(x: f64, canvas_height: f64, width: f64, height: f64, speed: f64) -> Self {
        let mut paddle = Self {
            x,
            y: 0.0,
            width,
            height,
            speed,
            score: 0,
            target_y: None,
            moving: false,
            ready_for_input: false,
        };
        paddle.center(canvas_height);
        paddle
    }

    /// Highest legal value of `y`.
    pub fn max_y(&self, canvas_height: f64) -> f64 {
        (canvas_height - self.height).max(0.0)
    }

    /// Vertical center of the paddle.
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn center(&mut self, canvas_height: f64) {
        self.y = self.max_y(canvas_height) / 2.0;
    }

    /// Step by one `speed` unit in `direction` (only its sign counts). `0` halts and cancels
    /// any in-flight target.
    pub fn move_by(&mut self, direction: i8, canvas_height: f64) {
        self.target_y = None;
        if direction == 0 {
            self.moving = false;
            return;
        }
        let step = f64::from(direction.signum()) * self.speed;
        self.y = (self.y + step).clamp(0.0, self.max_y(canvas_height));
        self.moving = true;
    }

    /// Arm smoothed movement toward `y` (clamped to the court).
    pub fn set_target(&mut self, y: f64, canvas_height: f64) {
        self.target_y = Some(y.clamp(0.0, self.max_y(canvas_height)));
    }

    /// Advance smoothed movement by one tick.
    pub fn update(&mut self, canvas_height: f64) {
        let Some(target) = self.target_y else {
            return;
        };
        let delta = target - self.y;
        if delta.abs() <= DEAD_ZONE {
            self.target_y = None;
            self.moving = false;
            return;
        }
        let step = delta.signum() * delta.abs().min(self.speed);
        self.y = (self.y + step).clamp(0.0, self.max_y(canvas_height));
        self.moving = true;
    }

    /// Halt immediately, whatever state the paddle was in.
    pub fn force_stop(&mut self) {
        self.reset_state();
    }

    /// Reinitialize the movement state and reopen the input gate. Position and score stay.
    pub fn reset_state(&mut self) {
        self.target_y = None;
        self.moving = false;
        self.ready_for_input = true;
    }
}

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{GameMode, Side, collision};

/// Allowed drift between the ball's speed and its base speed before it is renormalized.
pub const SPEED_TOLERANCE: f64 = 0.1;
/// Smallest serve angle (degrees) so rallies never start flat.
pub const MIN_SERVE_ANGLE_DEG: f64 = 10.0;

/// Width of the random serve-angle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSpread {
    /// ±30°, used against the AI.
    Narrow,
    /// ±45°, used between two humans.
    Wide,
}

impl ServeSpread {
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::SinglePlayer => ServeSpread::Narrow,
            GameMode::Multiplayer => ServeSpread::Wide,
        }
    }

    pub fn max_angle_deg(self) -> f64 {
        match self {
            ServeSpread::Narrow => 30.0,
            ServeSpread::Wide => 45.0,
        }
    }
}

/// The ball. Position is its center; speeds are pixels per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub speed_x: f64,
    pub speed_y: f64,
    /// Target magnitude of the velocity vector.
    pub base_speed: f64,
    pub prev_x: f64,
    pub prev_y: f64,
}

impl Ball {
    /// A ball at rest at `(x, y)`; it starts moving on the first [`Ball::reset`].
    pub fn new(x: f64, y: f64, radius: f64, base_speed: f64) -> Self {
        Self {
            x,
            y,
            radius,
            speed_x: 0.0,
            speed_y: 0.0,
            base_speed,
            prev_x: x,
            prev_y: y,
        }
    }

    /// Magnitude of the current velocity.
    pub fn speed(&self) -> f64 {
        self.speed_x.hypot(self.speed_y)
    }

    /// Advance one tick: move, renormalize the speed and bounce off the top and bottom walls.
    ///
    /// Crossing the left or right bound is a scoring event and is left to the session.
    pub fn update(&mut self, canvas_height: f64) {
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.x += self.speed_x;
        self.y += self.speed_y;
        self.normalize_speed();
        collision::bounce_off_walls(self, canvas_height);
    }

    /// Rescale the velocity to `base_speed` when it drifted more than [`SPEED_TOLERANCE`].
    pub fn normalize_speed(&mut self) {
        let speed = self.speed();
        if speed <= f64::EPSILON || (speed - self.base_speed).abs() <= SPEED_TOLERANCE {
            return;
        }
        let factor = self.base_speed / speed;
        self.speed_x *= factor;
        self.speed_y *= factor;
    }

    /// Re-center the ball at `(x, y)` and serve it toward `toward`.
    ///
    /// The vertical component comes from an angle drawn in `[MIN_SERVE_ANGLE_DEG, spread]`
    /// with a random sign, so `|speed_y|` is never near zero. `base_speed` replaces the
    /// configured speed when given.
    pub fn reset<R: Rng>(
        &mut self,
        x: f64,
        y: f64,
        base_speed: Option<f64>,
        toward: Side,
        spread: ServeSpread,
        rng: &mut R,
    ) {
        if let Some(speed) = base_speed {
            self.base_speed = speed;
        }
        self.x = x;
        self.y = y;
        self.prev_x = x;
        self.prev_y = y;

        let min = MIN_SERVE_ANGLE_DEG.to_radians();
        let max = spread.max_angle_deg().to_radians();
        let magnitude = rng.random_range(min..=max);
        let angle = if rng.random_bool(0.5) {
            magnitude
        } else {
            -magnitude
        };
        let direction = match toward {
            Side::Left => -1.0,
            Side::Right => 1.0,
        };

        self.speed_x = direction * self.base_speed * angle.cos();
        self.speed_y = self.base_speed * angle.sin();
    }

    /// Stop the ball in place (between points while waiting, or once the match is over).
    pub fn halt(&mut self) {
        self.speed_x = 0.0;
        self.speed_y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn update_moves_by_velocity() {
        let mut ball = Ball::new(100.0, 100.0, 4.0, 5.0);
        ball.speed_x = 3.0;
        ball.speed_y = 4.0;

        ball.update(600.0);

        assert_eq!((ball.x, ball.y), (103.0, 104.0));
        assert_eq!((ball.prev_x, ball.prev_y), (100.0, 100.0));
    }

    #[test]
    fn drifted_speed_is_renormalized() {
        let mut ball = Ball::new(100.0, 300.0, 4.0, 6.0);
        ball.speed_x = 3.0;
        ball.speed_y = 0.5;

        ball.update(600.0);

        assert!((ball.speed() - 6.0).abs() < 1e-9);
        assert!(ball.speed_x > 0.0 && ball.speed_y > 0.0);
    }

    #[test]
    fn small_drift_is_tolerated() {
        let mut ball = Ball::new(100.0, 300.0, 4.0, 6.0);
        ball.speed_x = 6.05;

        ball.update(600.0);

        assert_eq!(ball.speed_x, 6.05);
    }

    #[test]
    fn bottom_wall_reflects_vertical_speed() {
        let mut ball = Ball::new(100.0, 594.0, 4.0, 5.0);
        ball.speed_x = 3.0;
        ball.speed_y = 4.0;

        ball.update(600.0);

        assert!(ball.speed_y < 0.0);
        assert!(ball.y + ball.radius <= 600.0);
    }

    #[test]
    fn reset_serves_within_angle_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ball = Ball::new(0.0, 0.0, 4.0, 6.0);

        for toward in [Side::Left, Side::Right].into_iter().cycle().take(200) {
            ball.reset(400.0, 300.0, None, toward, ServeSpread::Narrow, &mut rng);

            assert_eq!((ball.x, ball.y), (400.0, 300.0));
            assert!((ball.speed() - 6.0).abs() < 1e-9);
            match toward {
                Side::Left => assert!(ball.speed_x < 0.0),
                Side::Right => assert!(ball.speed_x > 0.0),
            }
            let angle = (ball.speed_y / ball.speed_x.abs()).atan().to_degrees().abs();
            assert!(angle >= MIN_SERVE_ANGLE_DEG - 1e-9);
            assert!(angle <= 30.0 + 1e-9);
        }
    }

    #[test]
    fn reset_can_override_base_speed() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ball = Ball::new(0.0, 0.0, 4.0, 6.0);

        ball.reset(400.0, 300.0, Some(9.0), Side::Right, ServeSpread::Wide, &mut rng);

        assert_eq!(ball.base_speed, 9.0);
        assert!((ball.speed() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn reset_survives_serialization_round_trip() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut ball = Ball::new(0.0, 0.0, 4.0, 6.0);
        ball.reset(400.0, 300.0, None, Side::Left, ServeSpread::Wide, &mut rng);

        let json = serde_json::to_string(&ball).unwrap();
        let restored: Ball = serde_json::from_str(&json).unwrap();

        assert_eq!((restored.x, restored.y), (400.0, 300.0));
        assert!(restored.speed_x < 0.0);
        assert!(restored.speed_y.abs() >= 6.0 * MIN_SERVE_ANGLE_DEG.to_radians().sin() - 1e-9);
    }
}

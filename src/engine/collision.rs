//! Per-tick collision resolution and point detection.

use rand::Rng;

use super::{Ball, Paddle, Side};

/// Largest bounce angle off a paddle, reached when the ball strikes a paddle tip.
pub const MAX_BOUNCE_ANGLE_DEG: f64 = 45.0;
/// Random spread added to every paddle bounce.
pub const BOUNCE_JITTER_DEG: f64 = 2.0;

/// Reflect the ball off the top and bottom walls, clamping it back in bounds.
///
/// Returns `true` when a wall was hit.
pub fn bounce_off_walls(ball: &mut Ball, canvas_height: f64) -> bool {
    if ball.y - ball.radius < 0.0 {
        ball.y = ball.radius;
        ball.speed_y = ball.speed_y.abs();
        true
    } else if ball.y + ball.radius > canvas_height {
        ball.y = canvas_height - ball.radius;
        ball.speed_y = -ball.speed_y.abs();
        true
    } else {
        false
    }
}

/// Resolve a hit between the ball and the paddle defending `side`.
///
/// A hit needs the ball's leading edge to overlap the paddle's facing edge, the ball to be
/// travelling toward that paddle, and the ball to overlap the paddle vertically. On a hit the
/// ball is placed flush against the paddle face and relaunched at an angle proportional to
/// where it struck, at exactly `base_speed`.
pub fn resolve_paddle_hit<R: Rng>(
    ball: &mut Ball,
    paddle: &Paddle,
    side: Side,
    rng: &mut R,
) -> bool {
    let (approaching, edge_overlap) = match side {
        Side::Left => {
            let face = paddle.x + paddle.width;
            (
                ball.speed_x < 0.0,
                ball.x - ball.radius <= face && ball.x + ball.radius >= paddle.x,
            )
        }
        Side::Right => {
            let face = paddle.x;
            (
                ball.speed_x > 0.0,
                ball.x + ball.radius >= face && ball.x - ball.radius <= paddle.x + paddle.width,
            )
        }
    };
    let vertical_overlap =
        ball.y + ball.radius >= paddle.y && ball.y - ball.radius <= paddle.y + paddle.height;

    if !(approaching && edge_overlap && vertical_overlap) {
        return false;
    }

    let half_height = paddle.height / 2.0;
    let relative_intersect_y = (paddle.y + half_height) - ball.y;
    let normalized = (relative_intersect_y / half_height).clamp(-1.0, 1.0);
    let jitter = rng.random_range(-BOUNCE_JITTER_DEG..=BOUNCE_JITTER_DEG);
    let angle = (normalized * MAX_BOUNCE_ANGLE_DEG + jitter).to_radians();

    let (direction, flush_x) = match side {
        Side::Left => (1.0, paddle.x + paddle.width + ball.radius),
        Side::Right => (-1.0, paddle.x - ball.radius),
    };
    ball.x = flush_x;
    ball.speed_x = direction * ball.base_speed * angle.cos();
    // Screen coordinates: a hit above the paddle center sends the ball upward.
    ball.speed_y = -ball.base_speed * angle.sin();
    true
}

/// The side that wins a point when the ball has fully left the court, if any.
pub fn scoring_side(ball: &Ball, canvas_width: f64) -> Option<Side> {
    if ball.x + ball.radius < 0.0 {
        Some(Side::Right)
    } else if ball.x - ball.radius > canvas_width {
        Some(Side::Left)
    } else {
        None
    }
}

// THEORY:
// The `ball` module is the ground truth of a session. It owns the one moving
// object's state and advances it a single tick at a time. The server renders a
// frame from it and the evaluator scores client reports against it, so the
// simulator is deliberately tiny and fully deterministic: integer arithmetic,
// no clock, no randomness.
//
// Bounce policy: the position is moved first and only then checked against the
// walls. A wall hit flips the velocity for the *next* tick, which means the
// drawn disc may overshoot an edge by at most one tick's velocity. This exact
// ordering is the contract; do not "fix" it by clamping.

use std::sync::Arc;

use parking_lot::Mutex;

/// Position, velocity and size of the tracked ball, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BallState {
    pub position: (i32, i32),
    /// Pixels per tick along each axis.
    pub velocity: (i32, i32),
    pub radius: i32,
}

impl BallState {
    pub fn new(position: (i32, i32), velocity: (i32, i32), radius: i32) -> Self {
        Self {
            position,
            velocity,
            radius,
        }
    }
}

/// Advances a `BallState` one tick at a time, bouncing off the frame edges.
#[derive(Debug, Clone)]
pub struct PhysicsSimulator {
    state: BallState,
}

/// The simulator as shared between the frame source and the error evaluator
/// of one server session.
pub type SharedSimulator = Arc<Mutex<PhysicsSimulator>>;

impl PhysicsSimulator {
    pub fn new(state: BallState) -> Self {
        debug_assert!(state.radius > 0, "ball radius must be positive");
        Self { state }
    }

    pub fn into_shared(self) -> SharedSimulator {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> BallState {
        self.state
    }

    pub fn position(&self) -> (i32, i32) {
        self.state.position
    }

    /// Moves the ball by its velocity, then inverts each velocity component
    /// whose axis touched or crossed a frame edge.
    pub fn tick(&mut self, frame_width: u32, frame_height: u32) {
        let s = &mut self.state;
        s.position.0 += s.velocity.0;
        s.position.1 += s.velocity.1;

        if hits_edge(s.position.0, s.radius, frame_width) {
            s.velocity.0 = -s.velocity.0;
        }
        if hits_edge(s.position.1, s.radius, frame_height) {
            s.velocity.1 = -s.velocity.1;
        }
    }
}

fn hits_edge(center: i32, radius: i32, dimension: u32) -> bool {
    center - radius <= 0 || center + radius >= dimension as i32
}

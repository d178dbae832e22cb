// THEORY:
// The `FrameSource` is the server's only clock. Every call to `next_frame`
// advances the simulation by exactly one tick and renders the result, so
// simulation time and video time cannot drift apart. Timestamps come from a
// counter in the transport's time base, never from the wall clock.

use crate::config::TrackerConfig;
use crate::core_modules::ball::SharedSimulator;
use crate::core_modules::frame::{self, BALL_COLOR, Frame, TimeBase};

/// Renders the shared simulator into timestamped frames on demand.
pub struct FrameSource {
    simulator: SharedSimulator,
    width: u32,
    height: u32,
    time_base: TimeBase,
    /// Time-base units between two consecutive frames.
    pts_step: i64,
    next_pts: i64,
}

impl FrameSource {
    pub fn new(simulator: SharedSimulator, config: &TrackerConfig) -> Self {
        let time_base = TimeBase::per_second(config.time_base_denominator);
        Self {
            simulator,
            width: config.frame_width,
            height: config.frame_height,
            time_base,
            pts_step: (config.time_base_denominator / config.frame_rate.max(1)) as i64,
            next_pts: 0,
        }
    }

    pub fn simulator(&self) -> &SharedSimulator {
        &self.simulator
    }

    /// Ticks the simulator once and renders its new state.
    pub fn next_frame(&mut self) -> Frame {
        let state = {
            let mut sim = self.simulator.lock();
            sim.tick(self.width, self.height);
            sim.state()
        };

        let mut image = frame::blank(self.width, self.height);
        frame::fill_circle(&mut image, state.position, state.radius, BALL_COLOR);

        let pts = self.next_pts;
        self.next_pts += self.pts_step;
        Frame::new(image, pts, self.time_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::ball::{BallState, PhysicsSimulator};

    fn source(state: BallState, width: u32, height: u32) -> FrameSource {
        let config = TrackerConfig {
            frame_width: width,
            frame_height: height,
            initial_ball: state,
            ..TrackerConfig::default()
        };
        FrameSource::new(PhysicsSimulator::new(state).into_shared(), &config)
    }

    #[test]
    fn frame_has_configured_size() {
        let mut src = source(BallState::new((320, 240), (2, 2), 30), 800, 600);
        let frame = src.next_frame();
        assert_eq!((frame.width(), frame.height()), (800, 600));
    }

    #[test]
    fn ball_is_drawn_at_ticked_position() {
        let mut src = source(BallState::new((50, 50), (0, 0), 50), 640, 480);
        let frame = src.next_frame();
        assert_eq!(*frame.image().get_pixel(50, 50), BALL_COLOR);
        assert!(frame.image().pixels().any(|p| *p == BALL_COLOR));
    }

    #[test]
    fn rendering_advances_the_simulation() {
        let mut src = source(BallState::new((320, 240), (10, 10), 30), 640, 480);
        let first = src.next_frame();
        let second = src.next_frame();
        assert_ne!(first.image(), second.image());
        assert_eq!(src.simulator().lock().position(), (340, 260));
    }

    #[test]
    fn timestamps_step_by_one_frame_of_the_time_base() {
        let mut src = source(BallState::new((320, 240), (2, 2), 30), 640, 480);
        let pts: Vec<i64> = (0..4).map(|_| src.next_frame().pts()).collect();
        assert_eq!(pts, vec![0, 3000, 6000, 9000]);
        assert_eq!(src.next_frame().time_base(), TimeBase::per_second(90_000));
    }
}

//! Server-side session state.
//!
//! One simulator per session, shared by the frame source (which ticks it) and
//! the error evaluator (which reads it). Both are driven from the server's
//! event loop; the lock only exists because transport callbacks must be `Send`.

use crate::config::TrackerConfig;
use crate::core_modules::ball::{PhysicsSimulator, SharedSimulator};
use crate::core_modules::evaluator::ErrorEvaluator;
use crate::core_modules::frame_source::FrameSource;

pub struct ServerSession {
    pub simulator: SharedSimulator,
    pub source: FrameSource,
    pub evaluator: ErrorEvaluator,
}

impl ServerSession {
    pub fn new(config: &TrackerConfig) -> Self {
        let simulator = PhysicsSimulator::new(config.initial_ball).into_shared();
        Self {
            source: FrameSource::new(simulator.clone(), config),
            evaluator: ErrorEvaluator::new(simulator.clone()),
            simulator,
        }
    }
}

// THEORY:
// This file is the entry point for the `ball_tracker` library crate. It exposes
// the real-time tracking-and-telemetry core of a bouncing-ball session:
//
// Server side: `PhysicsSimulator` -> `FrameSource` renders frames, and the
// `ErrorEvaluator` scores incoming coordinate reports against the simulator.
// Client side: `FrameIngestor` -> hand-off queue -> `Detector` thread ->
// `CoordinateStore` -> `CoordinateBroadcaster`.
//
// The transport that carries frames and telemetry between the two is not part
// of this crate; it plugs in through `Frame` on one side and the
// `TelemetryChannel` trait on the other.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;

pub use config::TrackerConfig;
pub use core_modules::ball::{BallState, PhysicsSimulator, SharedSimulator};
pub use core_modules::broadcaster::{BroadcastOutcome, BroadcastReport, CoordinateBroadcaster};
pub use core_modules::coordinate_store::{CoordinateStore, Coordinates};
pub use core_modules::detector::{Detector, DetectorReport, find_ball_coordinates};
pub use core_modules::evaluator::{ErrorEvaluator, ErrorSample, ErrorStats};
pub use core_modules::frame::{EncodedFrame, Frame, TimeBase};
pub use core_modules::frame_source::FrameSource;
pub use core_modules::handoff::{Offer, OverflowPolicy, QueuedFrame};
pub use core_modules::telemetry::{ChannelState, TelemetryChannel, TelemetryMessage};
pub use error::{ConfigError, PipelineError, TelemetryError, TransportError};
pub use pipeline::{ClientPipeline, FrameIngestor, PipelineReport};
pub use session::ServerSession;

pub mod ball;
pub mod blob_detector;
pub mod broadcaster;
pub mod coordinate_store;
pub mod detector;
pub mod evaluator;
pub mod frame;
pub mod frame_source;
pub mod handoff;
pub mod telemetry;

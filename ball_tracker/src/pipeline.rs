// THEORY:
// The `pipeline` module is the client's top-level API. It wires the hand-off
// queue, the detector thread and the coordinate store together and gives the
// transport layer two narrow handles:
// - a `FrameIngestor`, called from the transport's frame callback, which only
//   ever does a non-blocking enqueue;
// - the shared `CoordinateStore`, from which a `CoordinateBroadcaster` is built
//   once the telemetry channel shows up.
//
// Teardown is ordered: close the intake, enqueue the sentinel, then wait
// (bounded) for the detector to drain everything queued before it and exit.
// With the intake closed first, no frame can ever be offered behind the
// sentinel through an ingestor.

use crate::config::TrackerConfig;
use crate::core_modules::broadcaster::CoordinateBroadcaster;
use crate::core_modules::coordinate_store::CoordinateStore;
use crate::core_modules::detector::{Detector, DetectorHandle, DetectorReport};
use crate::core_modules::handoff::{FrameSender, Offer, QueuedFrame, handoff_queue};
use crate::core_modules::telemetry::TelemetryChannel;
use crate::error::PipelineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Non-blocking entry point for frames, decoded or still compressed. Cheap to
/// clone into callbacks.
#[derive(Clone)]
pub struct FrameIngestor {
    sender: Arc<FrameSender>,
}

impl FrameIngestor {
    /// Hands a frame to the detector without waiting on it.
    pub fn ingest(&self, frame: impl Into<QueuedFrame>) -> Result<Offer, PipelineError> {
        self.sender.try_send(frame).inspect_err(|e| {
            if *e == PipelineError::ShutdownInProgress {
                error!("frame ingested after detector shutdown was requested");
                debug_assert!(false, "frame ingested behind the shutdown sentinel");
            }
        })
    }
}

/// What the client pipeline did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub detector: DetectorReport,
    /// Frames discarded by the hand-off overflow policy.
    pub dropped_frames: u64,
}

/// Client-side detection pipeline: hand-off queue, detector thread, store.
pub struct ClientPipeline {
    store: Arc<CoordinateStore>,
    sender: Arc<FrameSender>,
    detector: DetectorHandle,
    broadcast_interval: Duration,
    shutdown_timeout: Duration,
}

impl ClientPipeline {
    /// Spawns the detector thread and returns the running pipeline.
    pub fn start(config: &TrackerConfig) -> Result<Self, PipelineError> {
        let store = Arc::new(CoordinateStore::new());
        let (sender, receiver) = handoff_queue(config.overflow_policy);
        let detector = Detector::new(config.brightness_threshold, store.clone()).spawn(receiver)?;
        info!(policy = ?config.overflow_policy, "client pipeline started");

        Ok(Self {
            store,
            sender: Arc::new(sender),
            detector,
            broadcast_interval: config.broadcast_interval,
            shutdown_timeout: config.detector_shutdown_timeout,
        })
    }

    pub fn ingestor(&self) -> FrameIngestor {
        FrameIngestor {
            sender: self.sender.clone(),
        }
    }

    pub fn store(&self) -> Arc<CoordinateStore> {
        self.store.clone()
    }

    /// A broadcaster sampling this pipeline's store onto `channel`.
    pub fn broadcaster(&self, channel: Arc<dyn TelemetryChannel>) -> CoordinateBroadcaster {
        CoordinateBroadcaster::new(self.store.clone(), channel, self.broadcast_interval)
    }

    /// Closes the intake, queues the sentinel, then waits (bounded) for the
    /// detector to drain and exit.
    pub async fn shutdown(self) -> Result<PipelineReport, PipelineError> {
        self.sender.close_intake();
        self.sender.request_shutdown();
        let detector = self.detector.join(self.shutdown_timeout).await?;
        let report = PipelineReport {
            detector,
            dropped_frames: self.sender.dropped(),
        };
        info!(
            frames = report.detector.frames_processed,
            dropped = report.dropped_frames,
            "client pipeline stopped"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::ball::{BallState, PhysicsSimulator};
    use crate::core_modules::coordinate_store::Coordinates;
    use crate::core_modules::frame_source::FrameSource;
    use crate::core_modules::handoff::OverflowPolicy;

    fn config(policy: OverflowPolicy) -> TrackerConfig {
        TrackerConfig {
            overflow_policy: policy,
            initial_ball: BallState::new((320, 240), (3, -2), 30),
            ..TrackerConfig::default()
        }
    }

    #[tokio::test]
    async fn rendered_frames_are_detected_at_the_simulated_position() {
        let config = config(OverflowPolicy::Unbounded);
        let simulator = PhysicsSimulator::new(config.initial_ball).into_shared();
        let mut source = FrameSource::new(simulator.clone(), &config);
        let pipeline = ClientPipeline::start(&config).unwrap();
        let ingestor = pipeline.ingestor();
        let store = pipeline.store();

        for _ in 0..20 {
            ingestor.ingest(source.next_frame()).unwrap();
        }
        let report = pipeline.shutdown().await.unwrap();

        assert_eq!(report.detector.frames_processed, 20);
        assert_eq!(report.detector.detections, 20);
        assert_eq!(report.dropped_frames, 0);
        let (x, y) = simulator.lock().position();
        assert_eq!(store.latest(), Some(Coordinates::new(x, y)));
    }

    #[tokio::test]
    async fn frames_racing_teardown_are_refused_quietly() {
        let pipeline = ClientPipeline::start(&config(OverflowPolicy::Unbounded)).unwrap();
        let ingestor = pipeline.ingestor();
        let simulator = PhysicsSimulator::new(BallState::new((100, 100), (1, 1), 10)).into_shared();
        let mut source = FrameSource::new(simulator, &TrackerConfig::default());

        ingestor.ingest(source.next_frame()).unwrap();
        let report = pipeline.shutdown().await.unwrap();
        assert_eq!(ingestor.ingest(source.next_frame()), Ok(Offer::IntakeClosed));
        assert_eq!(report.detector.frames_processed, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "behind the shutdown sentinel")]
    fn frame_behind_the_sentinel_fails_loudly_in_debug_builds() {
        let (sender, _receiver) = handoff_queue(OverflowPolicy::Unbounded);
        sender.request_shutdown();
        let ingestor = FrameIngestor {
            sender: Arc::new(sender),
        };
        let simulator = PhysicsSimulator::new(BallState::new((100, 100), (1, 1), 10)).into_shared();
        let mut source = FrameSource::new(simulator, &TrackerConfig::default());
        let _ = ingestor.ingest(source.next_frame());
    }

    #[tokio::test]
    async fn dropping_a_pipeline_without_shutdown_does_not_strand_the_detector() {
        let pipeline = ClientPipeline::start(&config(OverflowPolicy::Unbounded)).unwrap();
        let ClientPipeline { sender, detector, .. } = pipeline;
        drop(sender);
        let report = detector.join(Duration::from_secs(2)).await.unwrap();
        assert_eq!(report.frames_processed, 0);
    }

    #[tokio::test]
    async fn bounded_policy_counts_drops() {
        let config = config(OverflowPolicy::DropNewest { capacity: 1 });
        let simulator = PhysicsSimulator::new(config.initial_ball).into_shared();
        let mut source = FrameSource::new(simulator, &config);
        let pipeline = ClientPipeline::start(&config).unwrap();
        let ingestor = pipeline.ingestor();

        let mut dropped = 0;
        for _ in 0..50 {
            if ingestor.ingest(source.next_frame()).unwrap() == Offer::DroppedNewest {
                dropped += 1;
            }
        }
        let report = pipeline.shutdown().await.unwrap();
        assert_eq!(report.dropped_frames, dropped);
        assert_eq!(report.detector.frames_processed + dropped, 50);
    }
}

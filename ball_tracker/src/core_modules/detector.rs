// THEORY:
// The `Detector` is the CPU-bound half of the client. It runs on its own OS
// thread so that per-pixel work never stalls the async loop that receives
// frames and sends telemetry. It pulls frames off the hand-off queue one at a
// time, locates the ball, and publishes the centre into the `CoordinateStore`.
// A frame without a ball is a normal outcome: the store is left as it was.
// Frames that are still PNG-compressed are decoded here, not on the network
// loop.
//
// The loop ends on the shutdown sentinel. Because the sentinel is queued
// behind every earlier frame, all of those are processed first.

use crate::core_modules::blob_detector::{self, Circle};
use crate::core_modules::coordinate_store::{Coordinates, CoordinateStore};
use crate::core_modules::frame::Frame;
use crate::core_modules::handoff::{FrameReceiver, Handoff};
use crate::error::PipelineError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

const DETECTOR_THREAD_NAME: &str = "ball-detector";

/// Locates the ball in a frame: grayscale, threshold, largest region, and the
/// centre of that region's minimum enclosing circle, truncated toward zero.
pub fn find_ball_coordinates(frame: &Frame, threshold: u8) -> Option<Coordinates> {
    fit_ball(frame, threshold)
        .map(|circle| Coordinates::new(to_pixel(circle.center.0), to_pixel(circle.center.1)))
}

/// Truncates toward zero. Values within float noise of an integer snap to it
/// first, so 319.9999999 stays 320.
fn to_pixel(v: f64) -> i32 {
    let nearest = v.round();
    if (v - nearest).abs() < 1e-6 {
        nearest as i32
    } else {
        v.trunc() as i32
    }
}

/// Like `find_ball_coordinates` but keeps the fitted radius.
pub fn fit_ball(frame: &Frame, threshold: u8) -> Option<Circle> {
    let mask = blob_detector::binarize(frame.image(), threshold);
    let blobs = blob_detector::find_blobs(&mask);
    let largest = blob_detector::largest_blob(&blobs)?;
    blob_detector::min_enclosing_circle(&largest.outline)
}

/// Counters returned when the detector loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorReport {
    pub frames_processed: u64,
    pub detections: u64,
    pub misses: u64,
    /// Compressed frames that failed to decode. Not counted as processed.
    pub undecodable: u64,
}

pub struct Detector {
    threshold: u8,
    store: Arc<CoordinateStore>,
}

impl Detector {
    pub fn new(threshold: u8, store: Arc<CoordinateStore>) -> Self {
        Self { threshold, store }
    }

    /// Detects in one frame and publishes a hit. Returns what was found.
    pub fn process(&self, frame: &Frame) -> Option<Coordinates> {
        let found = find_ball_coordinates(frame, self.threshold);
        match found {
            Some(coordinates) => {
                trace!(pts = frame.pts(), x = coordinates.x, y = coordinates.y, "ball detected");
                self.store.publish(coordinates);
            }
            None => trace!(pts = frame.pts(), "no ball in frame"),
        }
        found
    }

    /// Processes frames until the shutdown sentinel arrives.
    pub fn run(&self, receiver: &FrameReceiver) -> DetectorReport {
        let mut report = DetectorReport::default();
        loop {
            match receiver.recv() {
                Handoff::Frame(item) => {
                    let pts = item.pts();
                    let frame = match item.into_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(pts, error = %e, "dropping undecodable frame");
                            report.undecodable += 1;
                            continue;
                        }
                    };
                    report.frames_processed += 1;
                    if self.process(&frame).is_some() {
                        report.detections += 1;
                    } else {
                        report.misses += 1;
                    }
                }
                Handoff::Shutdown => break,
            }
        }
        report
    }

    /// Moves the detector onto a dedicated thread.
    pub fn spawn(self, receiver: FrameReceiver) -> Result<DetectorHandle, PipelineError> {
        let (report_tx, report_rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name(DETECTOR_THREAD_NAME.to_string())
            .spawn(move || {
                info!("detector started");
                let report = self.run(&receiver);
                info!(
                    frames = report.frames_processed,
                    detections = report.detections,
                    misses = report.misses,
                    undecodable = report.undecodable,
                    "detector stopped"
                );
                let _ = report_tx.send(report);
            })
            .map_err(|e| PipelineError::WorkerSpawn(e.to_string()))?;

        Ok(DetectorHandle { thread, report_rx })
    }
}

/// Owner's view of a running detector thread.
pub struct DetectorHandle {
    thread: thread::JoinHandle<()>,
    report_rx: oneshot::Receiver<DetectorReport>,
}

impl DetectorHandle {
    /// Waits up to `timeout` for the thread to finish. On timeout the thread is
    /// left detached.
    pub async fn join(self, timeout: Duration) -> Result<DetectorReport, PipelineError> {
        match tokio::time::timeout(timeout, self.report_rx).await {
            Ok(Ok(report)) => {
                if self.thread.join().is_err() {
                    warn!("detector thread panicked after reporting");
                }
                Ok(report)
            }
            Ok(Err(_)) => {
                // Sender dropped without a report: the loop unwound.
                let _ = self.thread.join();
                Err(PipelineError::WorkerJoin)
            }
            Err(_) => {
                debug!(?timeout, "detector still busy at shutdown deadline");
                Err(PipelineError::ShutdownTimedOut(timeout))
            }
        }
    }

    /// Blocking join for callers outside an async context.
    pub fn join_blocking(self) -> Result<DetectorReport, PipelineError> {
        let report = self.report_rx.blocking_recv();
        self.thread.join().map_err(|_| PipelineError::WorkerJoin)?;
        report.map_err(|_| PipelineError::WorkerJoin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::{BALL_COLOR, EncodedFrame, TimeBase, blank, fill_circle};
    use crate::core_modules::handoff::{OverflowPolicy, handoff_queue};

    fn frame_with(balls: &[((i32, i32), i32)]) -> Frame {
        let mut img = blank(640, 480);
        for (center, radius) in balls {
            fill_circle(&mut img, *center, *radius, BALL_COLOR);
        }
        Frame::new(img, 0, TimeBase::per_second(90_000))
    }

    #[test]
    fn single_ball_centre_is_exact() {
        let frame = frame_with(&[((320, 240), 30)]);
        assert_eq!(find_ball_coordinates(&frame, 250), Some(Coordinates::new(320, 240)));
        for (center, radius) in [((101, 57), 12), ((500, 400), 45), ((33, 450), 7)] {
            let frame = frame_with(&[(center, radius)]);
            assert_eq!(
                find_ball_coordinates(&frame, 250),
                Some(Coordinates::new(center.0, center.1))
            );
        }
    }

    #[test]
    fn largest_of_two_balls_wins() {
        let frame = frame_with(&[((100, 100), 20), ((200, 200), 30)]);
        assert_eq!(find_ball_coordinates(&frame, 250), Some(Coordinates::new(200, 200)));
        let frame = frame_with(&[((100, 100), 40), ((400, 300), 30)]);
        assert_eq!(find_ball_coordinates(&frame, 250), Some(Coordinates::new(100, 100)));
    }

    #[test]
    fn empty_frame_is_not_found() {
        assert_eq!(find_ball_coordinates(&frame_with(&[]), 250), None);
    }

    #[test]
    fn ball_on_or_past_the_edge_is_still_found() {
        assert!(find_ball_coordinates(&frame_with(&[((639, 1), 30)]), 250).is_some());
        assert!(find_ball_coordinates(&frame_with(&[((630, 30), 30)]), 250).is_some());
    }

    #[test]
    fn miss_leaves_store_stale() {
        let store = Arc::new(CoordinateStore::new());
        let detector = Detector::new(250, store.clone());
        detector.process(&frame_with(&[((320, 240), 30)]));
        assert_eq!(detector.process(&frame_with(&[])), None);
        assert_eq!(store.latest(), Some(Coordinates::new(320, 240)));
        assert_eq!(store.update_count(), 1);
    }

    #[test]
    fn processes_exactly_the_frames_before_the_sentinel() {
        let store = Arc::new(CoordinateStore::new());
        let (tx, rx) = handoff_queue(OverflowPolicy::Unbounded);
        let handle = Detector::new(250, store.clone()).spawn(rx).unwrap();

        let n = 7;
        for i in 0..n {
            let frame = if i == 3 { frame_with(&[]) } else { frame_with(&[((100 + i, 100), 20)]) };
            tx.try_send(frame).unwrap();
        }
        tx.request_shutdown();

        let report = handle.join_blocking().unwrap();
        assert_eq!(report.frames_processed, n as u64);
        assert_eq!(report.detections, n as u64 - 1);
        assert_eq!(report.misses, 1);
        assert_eq!(store.latest(), Some(Coordinates::new(106, 100)));
    }

    #[tokio::test]
    async fn async_join_returns_report() {
        let store = Arc::new(CoordinateStore::new());
        let (tx, rx) = handoff_queue(OverflowPolicy::Unbounded);
        let handle = Detector::new(250, store).spawn(rx).unwrap();
        tx.try_send(frame_with(&[((50, 60), 10)])).unwrap();
        tx.request_shutdown();
        let report = handle.join(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.frames_processed, 1);
    }

    #[tokio::test]
    async fn join_times_out_while_detector_is_waiting() {
        let (_tx, rx) = handoff_queue(OverflowPolicy::Unbounded);
        let handle = Detector::new(250, Arc::new(CoordinateStore::new())).spawn(rx).unwrap();
        let err = handle.join(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, PipelineError::ShutdownTimedOut(Duration::from_millis(20)));
    }

    #[test]
    fn clipped_disc_centre_is_truncated() {
        // Fitted centre (624.5, 15.5).
        assert_eq!(
            find_ball_coordinates(&frame_with(&[((639, 1), 30)]), 250),
            Some(Coordinates::new(624, 15))
        );
    }

    #[test]
    fn pixel_conversion_truncates_but_absorbs_float_noise() {
        assert_eq!(to_pixel(624.5), 624);
        assert_eq!(to_pixel(15.999), 15);
        assert_eq!(to_pixel(319.999_999_999), 320);
        assert_eq!(to_pixel(240.000_000_001), 240);
    }

    #[tokio::test]
    async fn dropped_sender_lets_the_detector_exit() {
        let (tx, rx) = handoff_queue(OverflowPolicy::Unbounded);
        let handle = Detector::new(250, Arc::new(CoordinateStore::new())).spawn(rx).unwrap();
        tx.try_send(frame_with(&[((50, 60), 10)])).unwrap();
        drop(tx);
        let report = handle.join(Duration::from_secs(2)).await.unwrap();
        assert_eq!(report.frames_processed, 1);
    }

    #[test]
    fn compressed_frames_are_decoded_on_the_detector_thread() {
        let store = Arc::new(CoordinateStore::new());
        let (tx, rx) = handoff_queue(OverflowPolicy::Unbounded);
        let handle = Detector::new(250, store.clone()).spawn(rx).unwrap();

        let frame = frame_with(&[((200, 100), 25)]);
        let png = frame.encode_png().unwrap();
        tx.try_send(EncodedFrame::new(png, 3000, frame.time_base())).unwrap();
        tx.try_send(EncodedFrame::new(vec![0; 16], 6000, frame.time_base())).unwrap();
        tx.request_shutdown();

        let report = handle.join_blocking().unwrap();
        assert_eq!(report.frames_processed, 1);
        assert_eq!(report.undecodable, 1);
        assert_eq!(store.latest(), Some(Coordinates::new(200, 100)));
    }
}

use ball_tracker::TrackerConfig;
use ball_tracker_rtc::{SessionConfig, client, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let tracker = TrackerConfig::from_env()?;
    let session = SessionConfig::from_env()?;
    tracing::info!(?tracker, signaling = %session.signaling_addr, "starting ball client");

    let report = client::run(tracker, session).await?;
    tracing::info!(
        frames = report.detector.frames_processed,
        detections = report.detector.detections,
        misses = report.detector.misses,
        undecodable = report.detector.undecodable,
        dropped = report.dropped_frames,
        "client finished"
    );
    Ok(())
}

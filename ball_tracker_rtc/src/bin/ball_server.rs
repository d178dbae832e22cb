use ball_tracker::TrackerConfig;
use ball_tracker_rtc::{SessionConfig, init_tracing, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let tracker = TrackerConfig::from_env()?;
    let session = SessionConfig::from_env()?;
    tracing::info!(?tracker, signaling = %session.signaling_addr, "starting ball server");

    server::run(tracker, session).await?;
    Ok(())
}

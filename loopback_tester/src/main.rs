//! Runs a server session and a client pipeline in one process with no network
//! in between, then prints how far the reported positions were from the truth.
//!
//! Usage: loopback_tester [ticks] [snapshot_dir] [every_k]

use anyhow::Context;
use ball_tracker::{
    ChannelState, ClientPipeline, Coordinates, ErrorStats, Frame, ServerSession, TelemetryChannel,
    TrackerConfig, TransportError,
};
use image::Rgb;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u64 = 300;
const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_RADIUS: i32 = 3;

/// Telemetry channel that is always open and delivers into the evaluator task.
struct LoopbackChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl TelemetryChannel for LoopbackChannel {
    fn state(&self) -> ChannelState {
        if self.tx.is_closed() {
            ChannelState::Closed
        } else {
            ChannelState::Open
        }
    }

    fn send(&self, payload: String) -> Result<(), TransportError> {
        self.tx.send(payload).map_err(|_| TransportError::NotOpen)
    }
}

struct Args {
    ticks: u64,
    snapshot_dir: Option<PathBuf>,
    every: u64,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let ticks = match args.get(1) {
        Some(t) => t.parse().with_context(|| format!("bad tick count {t:?}"))?,
        None => DEFAULT_TICKS,
    };
    let every = match args.get(3) {
        Some(k) => k.parse().with_context(|| format!("bad snapshot interval {k:?}"))?,
        None => 1,
    };
    anyhow::ensure!(every > 0, "snapshot interval must be positive");
    Ok(Args {
        ticks,
        snapshot_dir: args.get(2).map(PathBuf::from),
        every,
    })
}

/// Writes the frame with a marker at `published`, the value the broadcaster
/// would send right now. Detection runs behind rendering, so the marker
/// trails the ball by the pipeline's lag.
fn save_snapshot(dir: &Path, frame: &Frame, published: Option<Coordinates>) -> anyhow::Result<()> {
    let mut image = frame.image().clone();
    if let Some(c) = published {
        ball_tracker::core_modules::frame::fill_circle(&mut image, (c.x, c.y), MARKER_RADIUS, MARKER_COLOR);
    }
    let path = dir.join(format!("frame_{:08}.png", frame.pts()));
    image
        .save(&path)
        .with_context(|| format!("writing snapshot {}", path.display()))?;
    Ok(())
}

fn print_summary(stats: &ErrorStats, frames: u64, dropped: u64) {
    println!("frames rendered:   {frames}");
    println!("frames dropped:    {dropped}");
    println!("reports scored:    {}", stats.samples);
    println!("decode failures:   {}", stats.decode_failures);
    match stats.mean_deviation() {
        Some(mean) => {
            println!("mean error:        {mean:.2}");
            println!("max error:         {:.2}", stats.max_deviation);
        }
        None => println!("no reports were scored"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 1. Argument Parsing & Setup ---
    let args = parse_args()?;
    let config = TrackerConfig::from_env()?;
    if let Some(dir) = &args.snapshot_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // --- 2. Server Side ---
    let ServerSession {
        mut source,
        mut evaluator,
        ..
    } = ServerSession::new(&config);
    let (telemetry_tx, mut telemetry_rx) = mpsc::unbounded_channel::<String>();
    let evaluation = tokio::spawn(async move {
        while let Some(text) = telemetry_rx.recv().await {
            evaluator.on_message(&text);
        }
        evaluator.stats()
    });

    // --- 3. Client Side ---
    let pipeline = ClientPipeline::start(&config)?;
    let ingestor = pipeline.ingestor();
    let store = pipeline.store();
    let (stop_tx, stop_rx) = watch::channel(false);
    let broadcast = pipeline
        .broadcaster(Arc::new(LoopbackChannel { tx: telemetry_tx }))
        .spawn(stop_rx);

    // --- 4. Main Loop ---
    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    for tick in 0..args.ticks {
        ticker.tick().await;
        let frame = source.next_frame();
        if let Some(dir) = &args.snapshot_dir {
            if tick % args.every == 0 {
                if let Err(e) = save_snapshot(dir, &frame, store.latest()) {
                    warn!(error = %e, "snapshot failed");
                }
            }
        }
        ingestor.ingest(frame)?;
    }

    // --- 5. Teardown ---
    let _ = stop_tx.send(true);
    let report = pipeline.shutdown().await?;
    let broadcast = broadcast.await.context("broadcaster task")?;
    let stats = evaluation.await.context("evaluator task")?;
    info!(sent = broadcast.sent, nothing_to_send = broadcast.nothing_to_send, "broadcaster stopped");

    print_summary(&stats, args.ticks, report.dropped_frames);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ball_tracker::TimeBase;
    use ball_tracker::core_modules::frame::blank;

    #[test]
    fn snapshot_marks_the_published_position_only() {
        let dir = env::temp_dir().join(format!("loopback_snapshots_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let tb = TimeBase::per_second(90_000);

        let frame = Frame::new(blank(64, 48), 3000, tb);
        save_snapshot(&dir, &frame, Some(Coordinates::new(20, 30))).unwrap();
        let saved = image::open(dir.join("frame_00003000.png")).unwrap().to_rgb8();
        assert_eq!(*saved.get_pixel(20, 30), MARKER_COLOR);

        let frame = Frame::new(blank(64, 48), 6000, tb);
        save_snapshot(&dir, &frame, None).unwrap();
        let saved = image::open(dir.join("frame_00006000.png")).unwrap().to_rgb8();
        assert!(saved.pixels().all(|p| *p != MARKER_COLOR));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

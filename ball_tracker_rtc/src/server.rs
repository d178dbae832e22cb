// THEORY:
// The server owns the ground truth. It renders frames from the simulator at a
// fixed rate onto the `frames` channel and scores every telemetry record that
// comes back on the `coordinates` channel against wherever the ball is at that
// moment.
//
// The frame pump only starts once `frames` opens, and stops as soon as it is
// no longer open. Simulation only advances when a frame is produced.

use crate::config::SessionConfig;
use crate::packet::encode_frame;
use crate::signaling::{SignalMessage, SignalingListener};
use crate::{COORDINATES_LABEL, FRAMES_LABEL, new_peer_connection};
use anyhow::Context;
use ball_tracker::{ErrorEvaluator, ErrorStats, FrameSource, ServerSession, TrackerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Runs one server session until ctrl-c or until the peer connection dies.
pub async fn run(tracker: TrackerConfig, session: SessionConfig) -> anyhow::Result<ErrorStats> {
    let ServerSession { source, evaluator, .. } = ServerSession::new(&tracker);
    let evaluator = Arc::new(Mutex::new(evaluator));

    let pc = new_peer_connection(&session).await?;

    let frames_dc = pc
        .create_data_channel(
            FRAMES_LABEL,
            Some(RTCDataChannelInit {
                ordered: Some(false),
                max_retransmits: Some(0),
                ..Default::default()
            }),
        )
        .await
        .context("creating frames channel")?;
    let coords_dc = pc
        .create_data_channel(COORDINATES_LABEL, None)
        .await
        .context("creating coordinates channel")?;

    let frames_open = Arc::new(Notify::new());
    {
        let frames_open = frames_open.clone();
        frames_dc.on_open(Box::new(move || {
            info!("frames channel open");
            frames_open.notify_one();
            Box::pin(async {})
        }));
    }
    frames_dc.on_close(Box::new(|| {
        info!("frames channel closed");
        Box::pin(async {})
    }));
    attach_evaluator(&coords_dc, evaluator.clone());

    let (pc_state_tx, mut pc_state_rx) = watch::channel(RTCPeerConnectionState::New);
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        info!(%state, "peer connection state changed");
        let _ = pc_state_tx.send(state);
        Box::pin(async {})
    }));

    let listener = SignalingListener::bind(&session.signaling_addr).await?;
    info!(addr = %session.signaling_addr, "waiting for a client");
    let mut signaling = listener.accept().await?;

    let offer = pc.create_offer(None).await.context("creating offer")?;
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await.context("setting local description")?;
    let _ = gathered.recv().await;
    let local = pc
        .local_description()
        .await
        .context("local description missing after gathering")?;
    signaling.send(&SignalMessage::Offer { sdp: local.sdp }).await?;

    match signaling.receive().await? {
        Some(SignalMessage::Answer { sdp }) => {
            let answer = RTCSessionDescription::answer(sdp).context("parsing answer")?;
            pc.set_remote_description(answer)
                .await
                .context("setting remote description")?;
        }
        other => anyhow::bail!("expected an answer from the client, got {other:?}"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pump = tokio::spawn(pump_frames(
        source,
        frames_dc.clone(),
        frames_open,
        tracker.frame_interval(),
        shutdown_rx,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
        _ = peer_gone(&mut pc_state_rx) => warn!("peer connection ended"),
    }

    let _ = shutdown_tx.send(true);
    match pump.await {
        Ok(sent) => info!(frames = sent, "frame pump stopped"),
        Err(e) => error!(error = %e, "frame pump panicked"),
    }
    if let Err(e) = pc.close().await {
        warn!(error = %e, "closing peer connection");
    }
    signaling.close().await;

    let stats = evaluator.lock().stats();
    log_summary(&stats);
    Ok(stats)
}

/// Scores every message arriving on `dc`.
pub fn attach_evaluator(dc: &Arc<RTCDataChannel>, evaluator: Arc<Mutex<ErrorEvaluator>>) {
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let text = String::from_utf8_lossy(&msg.data);
        evaluator.lock().on_message(&text);
        Box::pin(async {})
    }));
}

async fn pump_frames(
    mut source: FrameSource,
    dc: Arc<RTCDataChannel>,
    opened: Arc<Notify>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    if dc.ready_state() != RTCDataChannelState::Open {
        tokio::select! {
            _ = opened.notified() => {}
            _ = shutdown.changed() => return 0,
        }
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if dc.ready_state() != RTCDataChannelState::Open {
            info!("frames channel no longer open");
            break;
        }
        let frame = source.next_frame();
        let packet = match encode_frame(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                error!(error = %e, pts = frame.pts(), "encoding frame");
                continue;
            }
        };
        match dc.send(&packet).await {
            Ok(_) => {
                sent += 1;
                debug!(pts = frame.pts(), bytes = packet.len(), "frame sent");
            }
            Err(e) => warn!(error = %e, "sending frame"),
        }
    }
    sent
}

async fn peer_gone(rx: &mut watch::Receiver<RTCPeerConnectionState>) {
    loop {
        if matches!(
            *rx.borrow_and_update(),
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
        ) {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn log_summary(stats: &ErrorStats) {
    match stats.mean_deviation() {
        Some(mean) => info!(
            samples = stats.samples,
            decode_failures = stats.decode_failures,
            mean = %format!("{mean:.2}"),
            max = %format!("{:.2}", stats.max_deviation),
            "session error summary"
        ),
        None => info!(
            decode_failures = stats.decode_failures,
            "session ended without any telemetry"
        ),
    }
}

// THEORY:
// The client never touches the simulator. It answers the server's offer,
// hands every frame that arrives on `frames` to the detection pipeline still
// PNG-compressed (the detector thread decodes it), and once `coordinates` shows up starts a broadcaster that samples
// the latest detection onto it at a fixed interval.
//
// Transport callbacks only do non-blocking work. Teardown runs in order:
// stop accepting frames, drain the detector, stop the broadcasters, close
// the peer connection, then hang up signaling.

use crate::config::SessionConfig;
use crate::packet::unpack_frame;
use crate::signaling::{SignalMessage, Signaling};
use crate::{COORDINATES_LABEL, FRAMES_LABEL, RtcTelemetryChannel, new_peer_connection};
use anyhow::Context;
use ball_tracker::{
    BroadcastReport, ClientPipeline, CoordinateBroadcaster, CoordinateStore, FrameIngestor,
    PipelineReport, TimeBase, TrackerConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Runs one client session until ctrl-c.
pub async fn run(tracker: TrackerConfig, session: SessionConfig) -> anyhow::Result<PipelineReport> {
    let pipeline = ClientPipeline::start(&tracker)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let broadcasters: Arc<Mutex<Vec<JoinHandle<BroadcastReport>>>> = Arc::default();

    let mut signaling = Signaling::connect(&session.signaling_addr).await?;
    let pc = new_peer_connection(&session).await?;

    let router = ChannelRouter {
        ingestor: pipeline.ingestor(),
        store: pipeline.store(),
        time_base: TimeBase::per_second(tracker.time_base_denominator),
        broadcast_interval: tracker.broadcast_interval,
        stop: stop_rx,
        broadcasters: broadcasters.clone(),
    };
    pc.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
        info!(%state, "peer connection state changed");
        Box::pin(async {})
    }));
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        router.route(dc);
        Box::pin(async {})
    }));

    let offer = match signaling.receive().await? {
        Some(SignalMessage::Offer { sdp }) => RTCSessionDescription::offer(sdp).context("parsing offer")?,
        other => anyhow::bail!("expected an offer from the server, got {other:?}"),
    };
    pc.set_remote_description(offer)
        .await
        .context("setting remote description")?;
    let answer = pc.create_answer(None).await.context("creating answer")?;
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(answer).await.context("setting local description")?;
    let _ = gathered.recv().await;
    let local = pc
        .local_description()
        .await
        .context("local description missing after gathering")?;
    signaling.send(&SignalMessage::Answer { sdp: local.sdp }).await?;
    info!("answer sent, session established");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("interrupted, shutting down");

    let _ = stop_tx.send(true);
    let report = pipeline.shutdown().await;
    if let Err(e) = &report {
        error!(error = %e, "detector did not stop cleanly");
    }

    let handles: Vec<_> = broadcasters.lock().drain(..).collect();
    for handle in handles {
        match handle.await {
            Ok(r) => info!(sent = r.sent, not_ready = r.not_ready, failed = r.failed, "broadcaster stopped"),
            Err(e) => error!(error = %e, "broadcaster task panicked"),
        }
    }

    if let Err(e) = pc.close().await {
        warn!(error = %e, "closing peer connection");
    }
    signaling.close().await;
    report.map_err(anyhow::Error::from)
}

/// Everything the data-channel callback needs, cloned once per channel.
#[derive(Clone)]
struct ChannelRouter {
    ingestor: FrameIngestor,
    store: Arc<CoordinateStore>,
    time_base: TimeBase,
    broadcast_interval: Duration,
    stop: watch::Receiver<bool>,
    broadcasters: Arc<Mutex<Vec<JoinHandle<BroadcastReport>>>>,
}

impl ChannelRouter {
    fn route(&self, dc: Arc<RTCDataChannel>) {
        let label = dc.label().to_string();
        info!(%label, "data channel announced");
        match label.as_str() {
            FRAMES_LABEL => self.attach_frames(&dc),
            COORDINATES_LABEL => self.attach_coordinates(dc),
            other => warn!(label = other, "ignoring unknown data channel"),
        }
    }

    fn attach_frames(&self, dc: &Arc<RTCDataChannel>) {
        let ingestor = self.ingestor.clone();
        let stop = self.stop.clone();
        let time_base = self.time_base;
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            if *stop.borrow() {
                trace!("stopping, frame ignored");
            } else {
                match unpack_frame(&msg.data, time_base) {
                    Ok(frame) => {
                        let pts = frame.pts();
                        // A frame racing teardown comes back as `Offer::IntakeClosed`.
                        match ingestor.ingest(frame) {
                            Ok(offer) => debug!(pts, ?offer, "frame handed off"),
                            Err(e) => warn!(pts, error = %e, "frame not handed off"),
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed frame packet"),
                }
            }
            Box::pin(async {})
        }));
    }

    fn attach_coordinates(&self, dc: Arc<RTCDataChannel>) {
        let channel = Arc::new(RtcTelemetryChannel::new(dc));
        let broadcaster = CoordinateBroadcaster::new(self.store.clone(), channel, self.broadcast_interval);
        let handle = broadcaster.spawn(self.stop.clone());
        self.broadcasters.lock().push(handle);
    }
}

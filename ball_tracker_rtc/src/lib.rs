//! WebRTC transport for the ball tracker.
//!
//! Two data channels carry a session, both created by the server:
//! - `frames`: unordered, no retransmits. One PNG frame packet per message.
//! - `coordinates`: telemetry records from client to server.

pub mod client;
pub mod config;
pub mod packet;
pub mod server;
pub mod signaling;

use anyhow::Context;
use ball_tracker::{ChannelState, TelemetryChannel, TransportError};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use webrtc::api::APIBuilder;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;

pub use config::SessionConfig;

pub const FRAMES_LABEL: &str = "frames";
pub const COORDINATES_LABEL: &str = "coordinates";

/// Installs the global `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Builds a data-channel-only peer connection from the session settings.
pub async fn new_peer_connection(cfg: &SessionConfig) -> anyhow::Result<Arc<RTCPeerConnection>> {
    let mut se = SettingEngine::default();
    if let Some(ip) = cfg.nat_public_ip.clone() {
        se.set_nat_1to1_ips(vec![ip], RTCIceCandidateType::Host);
    }
    if let (Some(start), Some(end)) = (cfg.udp_port_start, cfg.udp_port_end) {
        let ephemeral = EphemeralUDP::new(start, end).context("invalid ICE port range")?;
        se.set_udp_network(UDPNetwork::Ephemeral(ephemeral));
    }
    let api = APIBuilder::new().with_setting_engine(se).build();

    let ice_servers = cfg
        .stun_url
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .collect();
    let config = RTCConfiguration {
        ice_servers,
        ..Default::default()
    };
    let pc = api
        .new_peer_connection(config)
        .await
        .context("creating peer connection")?;
    Ok(Arc::new(pc))
}

/// The `coordinates` data channel seen through the broadcaster's seam.
pub struct RtcTelemetryChannel {
    dc: Arc<RTCDataChannel>,
}

impl RtcTelemetryChannel {
    pub fn new(dc: Arc<RTCDataChannel>) -> Self {
        Self { dc }
    }
}

impl TelemetryChannel for RtcTelemetryChannel {
    fn state(&self) -> ChannelState {
        map_state(self.dc.ready_state())
    }

    fn send(&self, payload: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let dc = self.dc.clone();
        // Fire and forget; delivery is never awaited.
        handle.spawn(async move {
            if let Err(e) = dc.send_text(payload).await {
                debug!(error = %e, "coordinates send failed");
            }
        });
        Ok(())
    }
}

fn map_state(state: RTCDataChannelState) -> ChannelState {
    match state {
        RTCDataChannelState::Open => ChannelState::Open,
        RTCDataChannelState::Closing => ChannelState::Closing,
        RTCDataChannelState::Closed => ChannelState::Closed,
        RTCDataChannelState::Connecting | RTCDataChannelState::Unspecified => ChannelState::Connecting,
    }
}

// THEORY:
// The `CoordinateBroadcaster` samples the `CoordinateStore` on a fixed timer
// and pushes whatever it finds onto the telemetry channel. It runs on the same
// async loop as the transport and is not synchronised with the detector.
// Sampling and detection run at unrelated rates, so an unchanged value may be
// sent twice and a short-lived detection may never be sent at all. Both are
// fine for a live gauge.
//
// A channel that is not open yet, or no longer open, is skipped silently and
// retried on the next tick. Sends are fire-and-forget.

use crate::core_modules::coordinate_store::{Coordinates, CoordinateStore};
use crate::core_modules::telemetry::{TelemetryChannel, TelemetryMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Result of a single broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Sent(Coordinates),
    ChannelNotReady,
    /// Nothing has been detected yet.
    NothingToSend,
    Failed,
}

/// Tallies of every tick, returned when the broadcaster stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: u64,
    pub not_ready: u64,
    pub nothing_to_send: u64,
    pub failed: u64,
}

impl BroadcastReport {
    fn record(&mut self, outcome: BroadcastOutcome) {
        match outcome {
            BroadcastOutcome::Sent(_) => self.sent += 1,
            BroadcastOutcome::ChannelNotReady => self.not_ready += 1,
            BroadcastOutcome::NothingToSend => self.nothing_to_send += 1,
            BroadcastOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct CoordinateBroadcaster {
    store: Arc<CoordinateStore>,
    channel: Arc<dyn TelemetryChannel>,
    interval: Duration,
}

impl CoordinateBroadcaster {
    pub fn new(store: Arc<CoordinateStore>, channel: Arc<dyn TelemetryChannel>, interval: Duration) -> Self {
        Self {
            store,
            channel,
            interval,
        }
    }

    /// One iteration: check readiness, sample the store, send.
    pub fn broadcast_once(&self) -> BroadcastOutcome {
        if !self.channel.is_open() {
            trace!(state = ?self.channel.state(), "telemetry channel not ready, skipping");
            return BroadcastOutcome::ChannelNotReady;
        }
        let Some(coordinates) = self.store.latest() else {
            trace!("no detection yet, skipping");
            return BroadcastOutcome::NothingToSend;
        };

        let payload = match TelemetryMessage::from(coordinates).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode coordinates");
                return BroadcastOutcome::Failed;
            }
        };
        debug!(%payload, "sending coordinates");
        match self.channel.send(payload) {
            Ok(()) => BroadcastOutcome::Sent(coordinates),
            Err(e) => {
                warn!(error = %e, "telemetry send failed");
                BroadcastOutcome::Failed
            }
        }
    }

    /// Ticks every `interval` until `shutdown` turns true or its sender goes
    /// away. The first send happens one interval after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.interval.as_millis() as u64, "coordinate broadcaster started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => report.record(self.broadcast_once()),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(
            sent = report.sent,
            not_ready = report.not_ready,
            failed = report.failed,
            "coordinate broadcaster stopped"
        );
        report
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<BroadcastReport> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::telemetry::ChannelState;
    use crate::error::TransportError;
    use parking_lot::Mutex;

    struct RecordingChannel {
        state: Mutex<ChannelState>,
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingChannel {
        fn new(state: ChannelState) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(state),
                sent: Mutex::new(Vec::new()),
                fail: false,
            })
        }
    }

    impl TelemetryChannel for RecordingChannel {
        fn state(&self) -> ChannelState {
            *self.state.lock()
        }

        fn send(&self, payload: String) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Send("boom".into()));
            }
            self.sent.lock().push(payload);
            Ok(())
        }
    }

    fn broadcaster(store: &Arc<CoordinateStore>, channel: &Arc<RecordingChannel>) -> CoordinateBroadcaster {
        CoordinateBroadcaster::new(store.clone(), channel.clone(), Duration::from_millis(100))
    }

    #[test]
    fn skips_until_channel_is_open() {
        let store = Arc::new(CoordinateStore::new());
        store.publish(Coordinates::new(5, 6));
        let channel = RecordingChannel::new(ChannelState::Connecting);
        let b = broadcaster(&store, &channel);

        assert_eq!(b.broadcast_once(), BroadcastOutcome::ChannelNotReady);
        assert!(channel.sent.lock().is_empty());

        *channel.state.lock() = ChannelState::Open;
        assert_eq!(b.broadcast_once(), BroadcastOutcome::Sent(Coordinates::new(5, 6)));
        assert_eq!(*channel.sent.lock(), vec![r#"{"x":5,"y":6}"#.to_string()]);
    }

    #[test]
    fn unset_store_sends_nothing() {
        let store = Arc::new(CoordinateStore::new());
        let channel = RecordingChannel::new(ChannelState::Open);
        assert_eq!(broadcaster(&store, &channel).broadcast_once(), BroadcastOutcome::NothingToSend);
    }

    #[test]
    fn send_errors_are_contained() {
        let store = Arc::new(CoordinateStore::new());
        store.publish(Coordinates::new(1, 1));
        let channel = Arc::new(RecordingChannel {
            state: Mutex::new(ChannelState::Open),
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        assert_eq!(broadcaster(&store, &channel).broadcast_once(), BroadcastOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn resends_latest_value_every_interval() {
        let store = Arc::new(CoordinateStore::new());
        store.publish(Coordinates::new(320, 240));
        let channel = RecordingChannel::new(ChannelState::Open);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = broadcaster(&store, &channel).spawn(stop_rx);

        tokio::time::sleep(Duration::from_millis(350)).await;
        stop_tx.send(true).unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report.sent, 3);
        let sent = channel.sent.lock();
        assert!(sent.iter().all(|s| s == r#"{"x":320,"y":240}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_shutdown_sender_is_dropped() {
        let store = Arc::new(CoordinateStore::new());
        let channel = RecordingChannel::new(ChannelState::Closed);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = broadcaster(&store, &channel).spawn(stop_rx);
        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(stop_tx);
        let report = handle.await.unwrap();
        assert_eq!(report.not_ready, 2);
        assert_eq!(report.sent, 0);
    }
}

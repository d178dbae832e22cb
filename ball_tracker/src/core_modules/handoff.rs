// THEORY:
// The hand-off queue moves frames from the network loop (one producer) to the
// detector thread (one consumer) in FIFO order. The producer side never blocks:
// it runs inside the async transport callbacks. The consumer side blocks on a
// condition variable, which is fine because it owns a dedicated OS thread.
//
// Shutdown travels through the queue itself as a sentinel, so the detector
// sees every frame that was queued before shutdown and then stops. The sentinel
// is never subject to the overflow policy. Teardown first closes the intake,
// under the same lock the producer enqueues with, so a frame racing teardown is
// refused quietly instead of landing behind the sentinel. A producer that goes
// away without any of this counts as a shutdown once the queue is drained.
//
// Overflow is a configuration choice:
// - `Unbounded`: every frame is kept; detection lag grows if the detector is
//   slower than the stream.
// - `DropOldest`: a full queue discards its oldest frame to make room, so the
//   detector always works on the freshest pictures.
// - `DropNewest`: a full queue refuses the incoming frame.

use crate::core_modules::frame::{EncodedFrame, Frame};
use crate::error::{ConfigError, PipelineError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    Unbounded,
    DropOldest { capacity: usize },
    DropNewest { capacity: usize },
}

impl OverflowPolicy {
    pub fn capacity(&self) -> Option<usize> {
        match self {
            OverflowPolicy::Unbounded => None,
            OverflowPolicy::DropOldest { capacity } | OverflowPolicy::DropNewest { capacity } => {
                Some(*capacity)
            }
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    /// Accepts `unbounded`, `drop-oldest:N` and `drop-newest:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(OverflowPolicy::Unbounded);
        }
        let (kind, capacity) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::Invalid(format!("unknown queue policy {s:?}")))?;
        let capacity: usize = capacity
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bad queue capacity in {s:?}")))?;
        match kind.trim() {
            "drop-oldest" => Ok(OverflowPolicy::DropOldest { capacity }),
            "drop-newest" => Ok(OverflowPolicy::DropNewest { capacity }),
            other => Err(ConfigError::Invalid(format!("unknown queue policy {other:?}"))),
        }
    }
}

/// A frame waiting for the detector, decoded or still compressed.
#[derive(Debug)]
pub enum QueuedFrame {
    Decoded(Frame),
    Encoded(EncodedFrame),
}

impl QueuedFrame {
    pub fn pts(&self) -> i64 {
        match self {
            QueuedFrame::Decoded(frame) => frame.pts(),
            QueuedFrame::Encoded(frame) => frame.pts(),
        }
    }

    pub fn into_frame(self) -> Result<Frame, image::ImageError> {
        match self {
            QueuedFrame::Decoded(frame) => Ok(frame),
            QueuedFrame::Encoded(frame) => frame.decode(),
        }
    }
}

impl From<Frame> for QueuedFrame {
    fn from(frame: Frame) -> Self {
        QueuedFrame::Decoded(frame)
    }
}

impl From<EncodedFrame> for QueuedFrame {
    fn from(frame: EncodedFrame) -> Self {
        QueuedFrame::Encoded(frame)
    }
}

/// One item on the hand-off queue.
#[derive(Debug)]
pub enum Handoff {
    Frame(QueuedFrame),
    /// No frames follow; the consumer should exit.
    Shutdown,
}

/// What happened to a frame offered to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queued after evicting the oldest waiting frame.
    QueuedDroppedOldest,
    /// Refused because the queue was full.
    DroppedNewest,
    /// Refused because teardown has closed the intake.
    IntakeClosed,
}

struct QueueState {
    items: VecDeque<Handoff>,
    intake_closed: bool,
    shutdown_requested: bool,
    receiver_alive: bool,
    sender_alive: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    policy: OverflowPolicy,
}

/// Producer half. Lives on the network loop.
pub struct FrameSender {
    shared: Arc<Shared>,
}

/// Consumer half. Lives on the detector thread.
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

/// Creates a connected producer/consumer pair.
pub fn handoff_queue(policy: OverflowPolicy) -> (FrameSender, FrameReceiver) {
    let initial_capacity = policy.capacity().unwrap_or(16);
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            items: VecDeque::with_capacity(initial_capacity + 1),
            intake_closed: false,
            shutdown_requested: false,
            receiver_alive: true,
            sender_alive: true,
            dropped: 0,
        }),
        available: Condvar::new(),
        policy,
    });
    (
        FrameSender {
            shared: shared.clone(),
        },
        FrameReceiver { shared },
    )
}

impl FrameSender {
    /// Enqueues without blocking, applying the overflow policy.
    pub fn try_send(&self, frame: impl Into<QueuedFrame>) -> Result<Offer, PipelineError> {
        let frame = frame.into();
        let mut state = self.shared.state.lock();
        if state.intake_closed {
            debug!(pts = frame.pts(), "intake closed, refusing frame");
            return Ok(Offer::IntakeClosed);
        }
        if state.shutdown_requested {
            return Err(PipelineError::ShutdownInProgress);
        }
        if !state.receiver_alive {
            return Err(PipelineError::Disconnected);
        }

        let offer = match self.shared.policy {
            OverflowPolicy::Unbounded => Offer::Queued,
            OverflowPolicy::DropOldest { capacity } if state.items.len() >= capacity => {
                state.items.pop_front();
                state.dropped += 1;
                debug!(pts = frame.pts(), "hand-off queue full, dropped oldest frame");
                Offer::QueuedDroppedOldest
            }
            OverflowPolicy::DropNewest { capacity } if state.items.len() >= capacity => {
                state.dropped += 1;
                debug!(pts = frame.pts(), "hand-off queue full, dropped incoming frame");
                return Ok(Offer::DroppedNewest);
            }
            _ => Offer::Queued,
        };

        state.items.push_back(Handoff::Frame(frame));
        drop(state);
        self.shared.available.notify_one();
        Ok(offer)
    }

    /// Refuses every later frame with `Offer::IntakeClosed`. Frames already
    /// queued are kept.
    pub fn close_intake(&self) {
        self.shared.state.lock().intake_closed = true;
    }

    /// Enqueues the shutdown sentinel behind every frame already waiting.
    /// Repeated calls are no-ops.
    pub fn request_shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.shutdown_requested {
            return;
        }
        state.shutdown_requested = true;
        state.items.push_back(Handoff::Shutdown);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Frames discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().dropped
    }

    /// Items currently waiting, sentinel included.
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameReceiver {
    /// Blocks the calling thread until an item is available. Once the sender
    /// is gone and the queue is empty this yields `Handoff::Shutdown`.
    pub fn recv(&self) -> Handoff {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return item;
            }
            if !state.sender_alive {
                debug!("frame sender dropped, treating as shutdown");
                return Handoff::Shutdown;
            }
            self.shared.available.wait(&mut state);
        }
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.shared.state.lock().sender_alive = false;
        self.shared.available.notify_one();
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.shared.state.lock().receiver_alive = false;
    }
}

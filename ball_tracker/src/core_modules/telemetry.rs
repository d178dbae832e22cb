//! Wire format of the coordinates channel and the seam to the transport that
//! carries it.
//!
//! A message is a JSON object with exactly two integer fields, `x` and `y`.
//! There is no version, sequence number or timestamp; any other shape is a
//! decode error.

use crate::core_modules::coordinate_store::Coordinates;
use crate::error::{TelemetryError, TransportError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryMessage {
    pub x: i32,
    pub y: i32,
}

impl TelemetryMessage {
    pub fn encode(&self) -> Result<String, TelemetryError> {
        serde_json::to_string(self).map_err(|e| TelemetryError::Encode(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, TelemetryError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        // Derived struct impls would also accept `[x, y]`.
        if !value.is_object() {
            return Err(TelemetryError::Decode(
                "expected an object with integer fields `x` and `y`".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.x, self.y)
    }
}

impl From<Coordinates> for TelemetryMessage {
    fn from(c: Coordinates) -> Self {
        Self { x: c.x, y: c.y }
    }
}

/// Observable state of the telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Best-effort, unordered message channel as seen by the broadcaster.
///
/// `send` must not wait for delivery. Implementations hand the payload to the
/// transport and return immediately.
pub trait TelemetryChannel: Send + Sync {
    fn state(&self) -> ChannelState;

    fn send(&self, payload: String) -> Result<(), TransportError>;

    fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }
}

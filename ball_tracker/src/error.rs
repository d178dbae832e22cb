//! Error types for the tracking core.

use thiserror::Error;

/// Failures while encoding or decoding a telemetry record.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("malformed telemetry message: {0}")]
    Decode(String),

    #[error("failed to encode telemetry message: {0}")]
    Encode(String),
}

/// Failures of the frame hand-off and the detector execution context.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// A frame was offered after the shutdown sentinel was enqueued. The
    /// producer must stop before requesting shutdown, so this is a logic fault.
    #[error("frame enqueued after shutdown was requested")]
    ShutdownInProgress,

    #[error("detector is no longer receiving frames")]
    Disconnected,

    #[error("failed to spawn detector thread: {0}")]
    WorkerSpawn(String),

    #[error("detector thread panicked")]
    WorkerJoin,

    #[error("detector did not exit within {0:?}")]
    ShutdownTimedOut(std::time::Duration),
}

/// Failures of the telemetry channel seam.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransportError {
    #[error("telemetry channel is not open")]
    NotOpen,

    #[error("telemetry send failed: {0}")]
    Send(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display_carries_cause() {
        let err = TelemetryError::Decode("missing field `y`".to_string());
        assert!(err.to_string().contains("malformed telemetry"));
        assert!(err.to_string().contains("missing field `y`"));
    }

    #[test]
    fn serde_errors_map_to_decode() {
        let json_err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        match TelemetryError::from(json_err) {
            TelemetryError::Decode(_) => {}
            other => panic!("expected Decode, got {other:?}"),
        }
    }
}

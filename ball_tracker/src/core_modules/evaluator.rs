// THEORY:
// The `ErrorEvaluator` closes the loop on the server. Each telemetry message
// is scored against the simulator's position at the moment the message is
// handled. There is no attempt to match the report to the frame it was
// detected in; the deviation therefore also measures end-to-end latency.
//
// A malformed message is reported and dropped. It never poisons the evaluator:
// the next valid message is scored normally.

use crate::core_modules::ball::SharedSimulator;
use crate::core_modules::telemetry::TelemetryMessage;
use crate::error::TelemetryError;
use tracing::{info, warn};

/// One scored report. Logged, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSample {
    pub reported: (i32, i32),
    pub actual: (i32, i32),
    pub deviation: f64,
}

/// Running summary of everything the evaluator has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorStats {
    pub samples: u64,
    pub decode_failures: u64,
    pub total_deviation: f64,
    pub max_deviation: f64,
}

impl ErrorStats {
    pub fn mean_deviation(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.total_deviation / self.samples as f64)
    }

    fn record(&mut self, sample: &ErrorSample) {
        self.samples += 1;
        self.total_deviation += sample.deviation;
        self.max_deviation = self.max_deviation.max(sample.deviation);
    }
}

/// Euclidean distance. Any `i32` pair is valid input; the difference is taken
/// in `f64` so wire-supplied extremes cannot overflow.
pub fn deviation(reported: (i32, i32), actual: (i32, i32)) -> f64 {
    let dx = f64::from(actual.0) - f64::from(reported.0);
    let dy = f64::from(actual.1) - f64::from(reported.1);
    dx.hypot(dy)
}

pub struct ErrorEvaluator {
    simulator: SharedSimulator,
    stats: ErrorStats,
}

impl ErrorEvaluator {
    pub fn new(simulator: SharedSimulator) -> Self {
        Self {
            simulator,
            stats: ErrorStats::default(),
        }
    }

    /// Scores a decoded report against the current ground truth.
    pub fn evaluate(&mut self, message: TelemetryMessage) -> ErrorSample {
        let actual = self.simulator.lock().position();
        let reported = (message.x, message.y);
        let sample = ErrorSample {
            reported,
            actual,
            deviation: deviation(reported, actual),
        };
        self.stats.record(&sample);
        sample
    }

    /// Decodes and scores one raw message.
    pub fn evaluate_text(&mut self, text: &str) -> Result<ErrorSample, TelemetryError> {
        match TelemetryMessage::decode(text) {
            Ok(message) => Ok(self.evaluate(message)),
            Err(e) => {
                self.stats.decode_failures += 1;
                Err(e)
            }
        }
    }

    /// Message-delivery callback: score, log, and swallow decode errors.
    pub fn on_message(&mut self, text: &str) -> Option<ErrorSample> {
        match self.evaluate_text(text) {
            Ok(sample) => {
                info!(
                    reported_x = sample.reported.0,
                    reported_y = sample.reported.1,
                    actual_x = sample.actual.0,
                    actual_y = sample.actual.1,
                    error = %format!("{:.2}", sample.deviation),
                    "received coordinates"
                );
                Some(sample)
            }
            Err(e) => {
                warn!(error = %e, message = text, "dropping telemetry message");
                None
            }
        }
    }

    pub fn stats(&self) -> ErrorStats {
        self.stats
    }
}

// THEORY:
// One flat, cloneable configuration struct is shared by the server and the
// client halves and threaded through every layer. The defaults reproduce the reference
// session exactly (640x480 at 30 fps, a 90 kHz time base, a radius-30 ball at
// the centre moving (2, 2) per tick), so a default-configured server and client
// interoperate without any setup.

use crate::core_modules::ball::BallState;
use crate::core_modules::handoff::OverflowPolicy;
use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// RTP video clock rate.
pub const DEFAULT_TIME_BASE_DENOMINATOR: u32 = 90_000;
pub const DEFAULT_BRIGHTNESS_THRESHOLD: u8 = 250;
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DETECTOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for both ends of a tracking session.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Target outbound frames per second. Also fixes the pts step.
    pub frame_rate: u32,
    /// Presentation timestamps are expressed in units of `1 / time_base_denominator` s.
    pub time_base_denominator: u32,
    /// Ball state at the start of a server session.
    pub initial_ball: BallState,
    /// Grayscale cutoff; only pixels strictly brighter count as ball.
    pub brightness_threshold: u8,
    /// Sleep between two telemetry broadcasts.
    pub broadcast_interval: Duration,
    /// What the frame hand-off does once the detector falls behind.
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on how long teardown waits for the detector to drain.
    pub detector_shutdown_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            time_base_denominator: DEFAULT_TIME_BASE_DENOMINATOR,
            initial_ball: BallState::new((320, 240), (2, 2), 30),
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            overflow_policy: OverflowPolicy::Unbounded,
            detector_shutdown_timeout: DEFAULT_DETECTOR_SHUTDOWN_TIMEOUT,
        }
    }
}

impl TrackerConfig {
    /// Builds the default config and overlays any `BT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from an arbitrary key lookup. Split out of
    /// `from_env` so tests never touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BT_WIDTH") {
            self.frame_width = parse_number("BT_WIDTH", &v)?;
        }
        if let Some(v) = lookup("BT_HEIGHT") {
            self.frame_height = parse_number("BT_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("BT_FPS") {
            self.frame_rate = parse_number("BT_FPS", &v)?;
        }
        if let Some(v) = lookup("BT_BROADCAST_MS") {
            self.broadcast_interval = Duration::from_millis(parse_number("BT_BROADCAST_MS", &v)?);
        }
        if let Some(v) = lookup("BT_QUEUE") {
            self.overflow_policy = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid("frame dimensions must be non-zero".into()));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("frame rate must be non-zero".into()));
        }
        if self.time_base_denominator < self.frame_rate {
            return Err(ConfigError::Invalid(
                "time base must be at least as fine as one frame".into(),
            ));
        }
        let radius = self.initial_ball.radius;
        if radius <= 0 {
            return Err(ConfigError::Invalid("ball radius must be positive".into()));
        }
        let half_min = (self.frame_width.min(self.frame_height) / 2) as i32;
        if radius > half_min {
            return Err(ConfigError::Invalid(format!(
                "ball radius {radius} exceeds half the smaller frame dimension ({half_min})"
            )));
        }
        if self.broadcast_interval.is_zero() {
            return Err(ConfigError::Invalid("broadcast interval must be non-zero".into()));
        }
        if self.overflow_policy.capacity() == Some(0) {
            return Err(ConfigError::Invalid("bounded queue capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Interval between two outbound frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}={value:?} is not a valid number")))
}

//! Configuration types for framepace
//!
//! Every tuning constant used by the scheduler and the default estimators
//! lives here. Durations are (de)serialized as integer microseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Tuning parameters for the scheduler core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Frames closer than this in media time to a neighbor are rejected at enqueue
    #[serde(with = "micros")]
    pub min_frame_spacing: Duration,
    /// Coverage values within this window resolve to the earlier frame
    #[serde(with = "micros")]
    pub coverage_jitter_tolerance: Duration,
    /// Lower bound for the maximum acceptable drift
    #[serde(with = "micros")]
    pub min_acceptable_drift: Duration,
    /// Maximum acceptable drift before any frame duration is known
    #[serde(with = "micros")]
    pub initial_max_acceptable_drift: Duration,
    /// Present frames strictly in arrival order instead of skipping late ones
    pub frame_dropping_disabled: bool,
    /// Number of out-of-order enqueue drops logged before going quiet
    pub max_out_of_order_logs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_frame_spacing: Duration::from_millis(1),
            coverage_jitter_tolerance: Duration::from_micros(500),
            // One 60Hz refresh interval.
            min_acceptable_drift: Duration::from_micros(16_667),
            // ATSC IS/191 recommendation.
            initial_max_acceptable_drift: Duration::from_millis(15),
            frame_dropping_disabled: false,
            max_out_of_order_logs: 10,
        }
    }
}

/// Parameters of the frame duration moving average
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationConfig {
    /// Number of recent frame durations averaged
    pub moving_average_samples: usize,
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            moving_average_samples: 32,
        }
    }
}

/// Parameters of the cadence estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// A cadence is only accepted if drift takes at least this long to
    /// accumulate past the maximum acceptable drift
    #[serde(with = "micros")]
    pub minimum_time_until_max_drift: Duration,
    /// Longest repeat pattern considered
    pub max_cadence_size: usize,
    /// Render time a new cadence must be observed before it is adopted
    #[serde(with = "micros")]
    pub hysteresis: Duration,
    /// Deviation/average ratio above which content is treated as variable frame rate
    pub max_duration_deviation_ratio: f64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            minimum_time_until_max_drift: Duration::from_secs(8),
            max_cadence_size: 5,
            hysteresis: Duration::from_millis(100),
            max_duration_deviation_ratio: 0.05,
        }
    }
}

/// Main configuration for framepace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub duration: DurationConfig,
    pub cadence: CadenceConfig,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Serialize the configuration as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builder pattern: set frame dropping
    pub fn with_frame_dropping_disabled(mut self, disabled: bool) -> Self {
        self.scheduler.frame_dropping_disabled = disabled;
        self
    }

    /// Builder pattern: set minimum frame spacing
    pub fn with_min_frame_spacing(mut self, spacing: Duration) -> Self {
        self.scheduler.min_frame_spacing = spacing;
        self
    }

    /// Builder pattern: set coverage jitter tolerance
    pub fn with_coverage_jitter_tolerance(mut self, tolerance: Duration) -> Self {
        self.scheduler.coverage_jitter_tolerance = tolerance;
        self
    }

    /// Builder pattern: set moving average window
    pub fn with_moving_average_samples(mut self, samples: usize) -> Self {
        self.duration.moving_average_samples = samples;
        self
    }

    /// Builder pattern: set cadence hysteresis
    pub fn with_cadence_hysteresis(mut self, hysteresis: Duration) -> Self {
        self.cadence.hysteresis = hysteresis;
        self
    }

    /// Builder pattern: set maximum cadence pattern length
    pub fn with_max_cadence_size(mut self, size: usize) -> Self {
        self.cadence.max_cadence_size = size;
        self
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<()> {
        if self.duration.moving_average_samples == 0 {
            return Err(Error::config("duration.moving_average_samples must be at least 1"));
        }
        if self.cadence.max_cadence_size == 0 {
            return Err(Error::config("cadence.max_cadence_size must be at least 1"));
        }
        if self.cadence.minimum_time_until_max_drift.is_zero() {
            return Err(Error::config(
                "cadence.minimum_time_until_max_drift must be non-zero",
            ));
        }
        let ratio = self.cadence.max_duration_deviation_ratio;
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(Error::config(format!(
                "cadence.max_duration_deviation_ratio must be a non-negative number, got {}",
                ratio
            )));
        }
        if self.scheduler.min_acceptable_drift.is_zero() {
            return Err(Error::config("scheduler.min_acceptable_drift must be non-zero"));
        }
        Ok(())
    }
}

mod micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        serializer.serialize_u64(micros)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}

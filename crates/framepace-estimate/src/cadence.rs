//! Cadence detection
//!
//! When the frame rate and the display rate are rationally related, frames
//! can be shown for a repeating integer number of render intervals; e.g.
//! 24fps content on a 60Hz display alternates between 3 and 2 intervals.
//!
//! A pattern of `n` frames rendered `k` times in total is accepted when the
//! error between `k / n` and the ideal ratio is small enough that drift
//! takes at least `minimum_time_until_max_drift` to exceed the maximum
//! acceptable drift.

use std::fmt;
use std::time::Duration;

use framepace_core::{CadenceConfig, CadenceEstimator};
use tracing::debug;

/// A repeating render-count pattern; empty when no cadence exists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cadence(Vec<u32>);

impl Cadence {
    pub fn new(pattern: Vec<u32>) -> Self {
        Self(pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn pattern(&self) -> &[u32] {
        &self.0
    }

    /// Render count for the frame at `frame_index` of the sequence
    pub fn render_count(&self, frame_index: u64) -> u32 {
        if self.0.is_empty() {
            return 0;
        }
        self.0[(frame_index % self.0.len() as u64) as usize]
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, count) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{}", count)?;
        }
        write!(f, "]")
    }
}

/// Default cadence estimator
#[derive(Debug, Clone)]
pub struct VideoCadenceEstimator {
    config: CadenceConfig,
    cadence: Cadence,
    /// Candidate waiting out the hysteresis period
    pending: Option<Cadence>,
    pending_held: Duration,
}

impl VideoCadenceEstimator {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            config,
            cadence: Cadence::default(),
            pending: None,
            pending_held: Duration::ZERO,
        }
    }

    /// The cadence currently in effect
    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// Find the shortest pattern approximating `frame_duration / render_interval`
    pub fn calculate_cadence(
        &self,
        render_interval: Duration,
        frame_duration: Duration,
        max_acceptable_drift: Duration,
    ) -> Cadence {
        if render_interval.is_zero() || frame_duration.is_zero() {
            return Cadence::default();
        }

        let perfect_cadence = frame_duration.as_secs_f64() / render_interval.as_secs_f64();
        let drift_ratio = max_acceptable_drift.as_secs_f64()
            / self.config.minimum_time_until_max_drift.as_secs_f64();
        if !drift_ratio.is_finite() || drift_ratio >= 1.0 {
            return Cadence::default();
        }

        let minimum_acceptable_cadence = perfect_cadence / (1.0 + drift_ratio);
        let maximum_acceptable_cadence = perfect_cadence / (1.0 - drift_ratio);

        for n in 1..=self.config.max_cadence_size as u64 {
            let k = (minimum_acceptable_cadence * n as f64).ceil();
            if k > maximum_acceptable_cadence * n as f64 {
                continue;
            }
            let k = k as u64;
            // Spread k renders over n frames, front-loading the longer holds.
            let pattern = (0..n)
                .map(|i| (div_ceil(k * (i + 1), n) - div_ceil(k * i, n)) as u32)
                .collect();
            return Cadence(pattern);
        }

        Cadence::default()
    }

    fn is_variable_frame_rate(&self, frame_duration: Duration, deviation: Duration) -> bool {
        deviation.as_secs_f64()
            > frame_duration.as_secs_f64() * self.config.max_duration_deviation_ratio
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator - 1) / denominator
}

impl CadenceEstimator for VideoCadenceEstimator {
    fn has_cadence(&self) -> bool {
        !self.cadence.is_empty()
    }

    fn update_cadence_estimate(
        &mut self,
        render_interval: Duration,
        frame_duration: Duration,
        frame_duration_deviation: Duration,
        max_acceptable_drift: Duration,
    ) -> bool {
        let new_cadence = if self.is_variable_frame_rate(frame_duration, frame_duration_deviation) {
            Cadence::default()
        } else {
            self.calculate_cadence(render_interval, frame_duration, max_acceptable_drift)
        };

        if new_cadence == self.cadence {
            self.pending = None;
            self.pending_held = Duration::ZERO;
            return false;
        }

        if self.pending.as_ref() != Some(&new_cadence) {
            self.pending = Some(new_cadence);
            self.pending_held = Duration::ZERO;
        }
        self.pending_held += render_interval;
        if self.pending_held < self.config.hysteresis {
            return false;
        }

        let Some(next) = self.pending.take() else {
            return false;
        };
        debug!(
            "Cadence changed from {} to {} (render interval {:?}, frame duration {:?})",
            self.cadence, next, render_interval, frame_duration
        );
        self.cadence = next;
        self.pending_held = Duration::ZERO;
        true
    }

    fn cadence_for_frame(&self, frame_index: u64) -> u32 {
        self.cadence.render_count(frame_index)
    }

    fn reset(&mut self) {
        self.cadence = Cadence::default();
        self.pending = None;
        self.pending_held = Duration::ZERO;
    }
}

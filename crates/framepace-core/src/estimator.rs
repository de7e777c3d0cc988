//! Estimator contracts consumed by the scheduler
//!
//! The scheduler only relies on these call contracts; how an implementation
//! averages durations or detects cadence is its own business.

use std::time::Duration;

/// Moving average and deviation over recent frame durations
pub trait FrameDurationEstimator {
    fn add_sample(&mut self, duration: Duration);

    /// Number of samples added since the last reset
    fn count(&self) -> usize;

    /// Average of the samples currently in the window, zero without samples
    fn average(&self) -> Duration;

    /// Standard deviation of the samples currently in the window
    fn deviation(&self) -> Duration;

    fn reset(&mut self);
}

/// Detects a stable integer render pattern for the current content
pub trait CadenceEstimator {
    fn has_cadence(&self) -> bool;

    /// Re-evaluate the cadence; returns true if it changed
    fn update_cadence_estimate(
        &mut self,
        render_interval: Duration,
        frame_duration: Duration,
        frame_duration_deviation: Duration,
        max_acceptable_drift: Duration,
    ) -> bool;

    /// Number of render intervals the frame at `frame_index` of the cadence
    /// sequence should occupy; zero without a cadence
    fn cadence_for_frame(&self, frame_index: u64) -> u32;

    fn reset(&mut self);
}

//! Point-in-time scheduler statistics

use serde::Serialize;

/// Snapshot of the scheduler's observable state
///
/// Durations are reported in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub frames_queued: usize,
    pub effective_frames_queued: usize,
    pub frames_dropped_during_enqueue: u64,
    pub average_frame_duration_us: u64,
    pub max_acceptable_drift_us: u64,
    pub render_interval_us: u64,
    pub has_cadence: bool,
    pub last_render_had_glitch: bool,
    pub have_rendered_frames: bool,
    pub frame_dropping_disabled: bool,
    pub memory_usage: usize,
}

impl SchedulerStats {
    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} queued ({} effective), {} dropped on enqueue, avg duration {:.2}ms, cadence {}",
            self.frames_queued,
            self.effective_frames_queued,
            self.frames_dropped_during_enqueue,
            self.average_frame_duration_us as f64 / 1000.0,
            if self.has_cadence { "on" } else { "off" }
        )
    }
}

//! Queued frames and their scheduling state

use std::time::{Duration, Instant};

use framepace_core::PresentableFrame;

/// A queued frame that has not been retired yet
#[derive(Debug)]
pub struct ReadyFrame<F> {
    frame: F,
    pub(crate) start_time: Instant,
    pub(crate) end_time: Option<Instant>,
    /// End time came from an average or metadata rather than the next frame
    pub(crate) has_estimated_end_time: bool,
    pub(crate) ideal_render_count: u32,
    render_count: u32,
    drop_count: u32,
}

impl<F: PresentableFrame> ReadyFrame<F> {
    pub(crate) fn new(frame: F, start_time: Instant, end_time: Option<Instant>) -> Self {
        Self {
            frame,
            start_time,
            end_time,
            has_estimated_end_time: true,
            ideal_render_count: 0,
            render_count: 0,
            drop_count: 0,
        }
    }

    pub fn timestamp(&self) -> Duration {
        self.frame.timestamp()
    }
}

impl<F> ReadyFrame<F> {
    pub fn frame(&self) -> &F {
        &self.frame
    }

    pub(crate) fn into_frame(self) -> F {
        self.frame
    }

    /// Wall-clock start of the frame's ideal presentation interval
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Wall-clock end of the frame's ideal presentation interval, if known
    pub fn end_time(&self) -> Option<Instant> {
        self.end_time
    }

    pub fn has_estimated_end_time(&self) -> bool {
        self.has_estimated_end_time
    }

    /// Render ticks this frame should occupy under the current cadence
    pub fn ideal_render_count(&self) -> u32 {
        self.ideal_render_count
    }

    /// Render ticks during which this frame was the one returned
    pub fn render_count(&self) -> u32 {
        self.render_count
    }

    /// Part of `render_count` that never reached the screen
    pub fn drop_count(&self) -> u32 {
        self.drop_count
    }

    /// True if every tick attributed to this frame was dropped
    pub fn was_never_rendered(&self) -> bool {
        self.render_count == self.drop_count
    }

    /// End time, or the start time when no end is known yet
    pub(crate) fn end_or_start(&self) -> Instant {
        self.end_time.unwrap_or(self.start_time)
    }

    pub(crate) fn mark_rendered(&mut self, count: u32) {
        self.render_count = self.render_count.saturating_add(count);
    }

    /// Attribute up to `count` of the rendered ticks to drops; never exceeds `render_count`
    pub(crate) fn mark_dropped(&mut self, count: u32) {
        self.drop_count = self.drop_count.saturating_add(count).min(self.render_count);
    }

    /// Account for ticks that elapsed while this frame stayed on screen
    pub(crate) fn mark_missed(&mut self, count: u32) {
        let never_rendered = self.was_never_rendered();
        self.mark_rendered(count);
        if never_rendered {
            self.mark_dropped(count);
        }
    }
}

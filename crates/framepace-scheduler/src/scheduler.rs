//! Scheduler core
//!
//! Owns the ready queue and the two estimators, and implements the
//! enqueue / render / expiry operations on top of the candidate-finding
//! algorithms in [`crate::selection`].
//!
//! Selection on each render tick runs in priority order:
//! 1. by cadence, when the estimator reports one;
//! 2. by coverage of the deadline window, when there is no cadence candidate
//!    or it drifts too far from the deadline;
//! 3. by drift, when coverage also fails to produce an acceptable frame.
//!
//! The scheduler is not thread-safe. All calls must come from one logical
//! sequence; debug builds assert this.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use framepace_core::{
    CadenceEstimator, Config, FrameDurationEstimator, PresentableFrame, SchedulerConfig,
    WallClock, WallClockTimes,
};
use framepace_estimate::{MovingAverage, VideoCadenceEstimator};
use tracing::{debug, info, trace, warn};

use crate::ready_frame::ReadyFrame;
use crate::selection;
use crate::sequence::SequenceChecker;
use crate::stats::SchedulerStats;

/// Invoked once for every frame handle that leaves the scheduler
pub type ReleaseCallback<F> = Box<dyn FnMut(F) + Send>;

/// How much learned state survives [`FrameScheduler::reset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Forget everything
    Full,
    /// Keep the frame duration history, cadence and last deadline, e.g. across seeks
    PreserveNextFrameEstimates,
}

/// Result of a render tick
#[derive(Debug)]
pub struct RenderOutcome<'a, F> {
    /// Frame to present, or `None` when nothing is queued
    pub frame: Option<&'a F>,
    /// Frames skipped over this tick without ever being rendered
    pub frames_dropped: usize,
}

/// Picks the frame to present on each render tick
pub struct FrameScheduler<F> {
    config: SchedulerConfig,
    clock: Box<dyn WallClock + Send>,
    duration_estimator: Box<dyn FrameDurationEstimator + Send>,
    cadence_estimator: Box<dyn CadenceEstimator + Send>,
    release: Option<ReleaseCallback<F>>,

    /// Ordered by ascending media timestamp
    frames: VecDeque<ReadyFrame<F>>,
    last_retired_timestamp: Option<Duration>,

    render_interval: Duration,
    average_frame_duration: Duration,
    max_acceptable_drift: Duration,
    last_deadline_max: Option<Instant>,

    /// Cadence sequence index of the front frame
    cadence_frame_counter: u64,
    effective_frames_queued: usize,
    frames_dropped_during_enqueue: u64,
    out_of_order_logs: u32,

    have_rendered_frames: bool,
    first_frame: bool,
    last_render_ignored_cadence_frame: bool,
    last_render_had_glitch: bool,
    frame_dropping_disabled: bool,
    was_time_moving: bool,

    sequence: SequenceChecker,
}

impl<F: PresentableFrame> FrameScheduler<F> {
    /// Create a scheduler with the default estimators
    pub fn new(clock: impl WallClock + Send + 'static, config: &Config) -> Self {
        Self::with_estimators(
            clock,
            MovingAverage::from_config(&config.duration),
            VideoCadenceEstimator::new(config.cadence.clone()),
            config.scheduler.clone(),
        )
    }

    /// Create a scheduler with caller-supplied estimators
    pub fn with_estimators(
        clock: impl WallClock + Send + 'static,
        duration_estimator: impl FrameDurationEstimator + Send + 'static,
        cadence_estimator: impl CadenceEstimator + Send + 'static,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            frame_dropping_disabled: config.frame_dropping_disabled,
            max_acceptable_drift: config.initial_max_acceptable_drift,
            config,
            clock: Box::new(clock),
            duration_estimator: Box::new(duration_estimator),
            cadence_estimator: Box::new(cadence_estimator),
            release: None,
            frames: VecDeque::new(),
            last_retired_timestamp: None,
            render_interval: Duration::ZERO,
            average_frame_duration: Duration::ZERO,
            last_deadline_max: None,
            cadence_frame_counter: 0,
            effective_frames_queued: 0,
            frames_dropped_during_enqueue: 0,
            out_of_order_logs: 0,
            have_rendered_frames: false,
            first_frame: true,
            last_render_ignored_cadence_frame: false,
            last_render_had_glitch: false,
            was_time_moving: false,
            sequence: SequenceChecker::default(),
        }
    }

    /// Builder pattern: notify the producer when frames are retired
    pub fn with_release_callback(mut self, release: impl FnMut(F) + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Add a decoded frame to the queue.
    ///
    /// Frames at or before the last rendered frame, or within the minimum
    /// spacing of a neighbor, are rejected and counted in
    /// [`frames_dropped_during_enqueue`](Self::frames_dropped_during_enqueue).
    pub fn enqueue_frame(&mut self, frame: F) {
        self.sequence.check();

        let timestamp = frame.timestamp();
        let index = self.frames.partition_point(|ready| ready.timestamp() < timestamp);
        let spacing = self.config.min_frame_spacing;

        if index == 0 && self.have_rendered_frames {
            if self.out_of_order_logs < self.config.max_out_of_order_logs {
                self.out_of_order_logs += 1;
                info!(
                    "Dropping frame with timestamp {:?}, which is earlier than the last rendered frame ({:?})",
                    timestamp,
                    self.frames.front().map(ReadyFrame::timestamp)
                );
            }
            self.reject_frame(frame);
            return;
        }

        let too_close_to_retired = self
            .last_retired_timestamp
            .is_some_and(|retired| timestamp < retired + spacing);
        let too_close_to_next = self
            .frames
            .get(index)
            .is_some_and(|next| next.timestamp() - timestamp < spacing);
        let too_close_to_previous =
            index > 0 && timestamp - self.frames[index - 1].timestamp() < spacing;
        if too_close_to_retired || too_close_to_next || too_close_to_previous {
            debug!(
                "Dropping frame with timestamp {:?}: less than {:?} from a neighboring frame",
                timestamp, spacing
            );
            self.reject_frame(frame);
            return;
        }

        // Without duration history, fall back to the producer's duration so
        // liveness is roughly right straight after the first enqueue.
        let mut timestamps = vec![timestamp];
        if self.duration_estimator.count() == 0 {
            if let Some(duration) = frame.duration().filter(|d| !d.is_zero()) {
                timestamps.push(timestamp + duration);
            }
        }
        let mapped = self.clock.wall_clock_times(&timestamps);
        let Some(&start_time) = mapped.times.first() else {
            warn!(
                "Wall clock returned no time for frame {:?}; dropping it",
                timestamp
            );
            self.reject_frame(frame);
            return;
        };
        let end_time = if self.duration_estimator.count() > 0 {
            Some(start_time + self.average_frame_duration)
        } else {
            mapped.times.get(1).copied()
        };

        self.frames
            .insert(index, ReadyFrame::new(frame, start_time, end_time));

        // Project the current cadence onto the new frame so liveness queries
        // are right before the next render.
        if self.cadence_estimator.has_cadence() {
            self.update_cadence_for_frames();
        }
        self.update_effective_frames_queued();

        debug_assert!(self
            .frames
            .iter()
            .zip(self.frames.iter().skip(1))
            .all(|(a, b)| a.timestamp() < b.timestamp()));
    }

    /// Choose the frame to present for the interval `[deadline_min, deadline_max)`.
    ///
    /// Frames skipped over are retired; the returned count covers those that
    /// were never rendered.
    pub fn render(&mut self, deadline_min: Instant, deadline_max: Instant) -> RenderOutcome<'_, F> {
        self.sequence.check();
        debug_assert!(deadline_min <= deadline_max);

        if self.frames.is_empty() {
            return RenderOutcome {
                frame: None,
                frames_dropped: 0,
            };
        }

        // Set before anything else so out-of-order frames are rejected from now on.
        self.have_rendered_frames = true;
        self.render_interval = deadline_max.saturating_duration_since(deadline_min);

        // Ticks the caller skipped were spent showing the front frame.
        if let Some(last_deadline_max) = self.last_deadline_max {
            if self.was_time_moving && !self.render_interval.is_zero() {
                let gap = deadline_min.saturating_duration_since(last_deadline_max);
                let missed = gap.as_nanos() / self.render_interval.as_nanos();
                if missed > 0 {
                    let missed = u32::try_from(missed).unwrap_or(u32::MAX);
                    trace!("{} render intervals elapsed since the last render", missed);
                    if let Some(front) = self.frames.front_mut() {
                        front.mark_missed(missed);
                    }
                }
            }
        }
        self.last_deadline_max = Some(
            self.last_deadline_max
                .map_or(deadline_max, |last| last.max(deadline_max)),
        );

        let is_time_moving = self.update_frame_statistics();

        if !is_time_moving
            || self.duration_estimator.count() == 0
            || self.render_interval.is_zero()
        {
            // Cadence overage can't be trusted across a stopped clock.
            if !is_time_moving {
                self.first_frame = true;
            }
            self.last_render_had_glitch = false;
            if let Some(front) = self.frames.front_mut() {
                front.mark_rendered(1);
            }
            self.update_effective_frames_queued();
            return self.outcome(0);
        }

        let has_cadence = self.cadence_estimator.has_cadence();
        let cadence_candidate = if has_cadence {
            selection::find_best_frame_by_cadence(&self.frames)
        } else {
            None
        };
        let cadence_index = cadence_candidate.map(|candidate| candidate.index);
        let mut cadence_overage = cadence_candidate.map_or(0, |candidate| candidate.overage);

        let mut selected = cadence_index
            .map(|index| (index, selection::absolute_drift(&self.frames[index], deadline_min)));

        if selected.map_or(true, |(_, drift)| drift > self.max_acceptable_drift) {
            let coverage = selection::find_best_frame_by_coverage(
                &self.frames,
                deadline_min,
                deadline_max,
                self.config.coverage_jitter_tolerance,
            );
            let mut chosen = coverage.best;
            // The cadence frame drifted too far; if it also won on coverage,
            // take the runner-up when that one is closer.
            if let (Some((cadence_frame, cadence_drift)), Some(best), Some(second_best)) =
                (selected, coverage.best, coverage.second_best)
            {
                if best == cadence_frame
                    && selection::absolute_drift(&self.frames[second_best], deadline_min)
                        < cadence_drift
                {
                    chosen = Some(second_best);
                }
            }
            if let Some(index) = chosen {
                selected = Some((
                    index,
                    selection::absolute_drift(&self.frames[index], deadline_min),
                ));
            }
        }

        if selected.map_or(true, |(_, drift)| drift > self.max_acceptable_drift) {
            selected = selection::find_best_frame_by_drift(&self.frames, deadline_min);
        }

        let Some((mut frame_to_render, selected_drift)) = selected else {
            return self.outcome(0);
        };

        let ignored_cadence_frame = has_cadence && cadence_index != Some(frame_to_render);
        if ignored_cadence_frame {
            cadence_overage = 0;
            trace!(
                "Ignoring cadence frame {:?} in favor of frame {}",
                cadence_index,
                frame_to_render
            );
        }

        self.last_render_had_glitch = selected_drift > self.max_acceptable_drift;
        if self.last_render_had_glitch {
            debug!(
                "Selected frame drifts {:?} from the deadline (max acceptable {:?})",
                selected_drift, self.max_acceptable_drift
            );
        }

        let mut frames_dropped = 0;
        if frame_to_render > 0 {
            for (i, frame) in self.frames.iter().enumerate().take(frame_to_render) {
                if !frame.was_never_rendered() {
                    continue;
                }
                if self.frame_dropping_disabled {
                    frame_to_render = i;
                    break;
                }
                frames_dropped += 1;
            }
            self.cadence_frame_counter += frame_to_render as u64;
            self.retire_front(frame_to_render);
            if frames_dropped > 0 {
                debug!("Dropped {} frames that were never rendered", frames_dropped);
            }
        }

        // The previous tick already paid one interval of overage back.
        if self.last_render_ignored_cadence_frame {
            cadence_overage = cadence_overage.saturating_sub(1);
        }
        self.last_render_ignored_cadence_frame = ignored_cadence_frame;

        if self.first_frame {
            self.first_frame = false;
            cadence_overage = 0;
        }

        if let Some(front) = self.frames.front_mut() {
            front.mark_rendered(cadence_overage + 1);
            front.mark_dropped(cadence_overage);
        }

        // A cadence glitch restarts the cadence phase at the current frame.
        if ignored_cadence_frame {
            self.cadence_frame_counter = 0;
            self.update_cadence_for_frames();
        }

        self.update_effective_frames_queued();
        self.outcome(frames_dropped)
    }

    /// Retire frames too old to be shown at `deadline`.
    ///
    /// Always keeps at least one frame. Returns the number of retired frames
    /// that were never rendered.
    pub fn remove_expired_frames(&mut self, deadline: Instant) -> usize {
        self.sequence.check();

        if self.last_deadline_max.map_or(true, |last| deadline > last) {
            self.last_deadline_max = Some(deadline);
        }
        if self.frames.is_empty() {
            return 0;
        }

        // Even with a single frame, correct any estimates made at enqueue time.
        self.update_frame_statistics();

        if self.frames.len() == 1 {
            self.update_effective_frames_queued();
            return 0;
        }

        let Some(minimum_start_time) =
            deadline.checked_sub(self.max_acceptable_drift + self.average_frame_duration)
        else {
            self.update_effective_frames_queued();
            return 0;
        };

        let mut frames_to_expire = 0;
        let mut frames_dropped_without_rendering = 0;
        for frame in self.frames.iter().take(self.frames.len() - 1) {
            if frame.start_time() >= minimum_start_time {
                break;
            }
            if frame.was_never_rendered() {
                frames_dropped_without_rendering += 1;
            }
            frames_to_expire += 1;
        }

        if frames_to_expire > 0 {
            self.cadence_frame_counter += frames_to_expire as u64;
            self.retire_front(frames_to_expire);
            debug!(
                "Expired {} frames ({} never rendered)",
                frames_to_expire, frames_dropped_without_rendering
            );
        }

        self.update_effective_frames_queued();
        frames_dropped_without_rendering
    }

    /// Record that the frame returned by the last render never reached the screen
    pub fn on_last_frame_dropped(&mut self) {
        self.sequence.check();

        // Rendering may have been reset between the render and this report.
        if !self.have_rendered_frames {
            return;
        }
        if let Some(front) = self.frames.front_mut() {
            front.mark_dropped(1);
        }
        self.update_effective_frames_queued();
    }

    /// Clear the queue and per-session flags
    pub fn reset(&mut self, mode: ResetMode) {
        self.sequence.check();

        self.release_all();
        self.last_retired_timestamp = None;
        self.out_of_order_logs = 0;
        self.frames_dropped_during_enqueue = 0;
        self.have_rendered_frames = false;
        self.last_render_had_glitch = false;
        self.render_interval = Duration::ZERO;
        if mode == ResetMode::Full {
            self.average_frame_duration = Duration::ZERO;
            self.last_deadline_max = None;
            self.duration_estimator.reset();
            self.cadence_estimator.reset();
        }
        self.first_frame = true;
        self.cadence_frame_counter = 0;
        self.last_render_ignored_cadence_frame = false;
        self.was_time_moving = false;
        self.effective_frames_queued = 0;
        self.max_acceptable_drift = self.config.initial_max_acceptable_drift;
        debug!("Scheduler reset ({:?})", mode);
    }

    /// Present frames strictly in arrival order instead of skipping late ones
    pub fn set_frame_dropping_disabled(&mut self, disabled: bool) {
        self.sequence.check();
        self.frame_dropping_disabled = disabled;
        self.update_effective_frames_queued();
    }

    /// Allow the next call to come from a different thread
    pub fn detach_from_sequence(&mut self) {
        self.sequence.detach();
    }

    pub fn frames_queued(&self) -> usize {
        self.frames.len()
    }

    /// Frames that still have presentation value; used for producer backpressure
    pub fn effective_frames_queued(&self) -> usize {
        self.effective_frames_queued
    }

    pub fn frames_dropped_during_enqueue(&self) -> u64 {
        self.frames_dropped_during_enqueue
    }

    pub fn average_frame_duration(&self) -> Duration {
        self.average_frame_duration
    }

    pub fn max_acceptable_drift(&self) -> Duration {
        self.max_acceptable_drift
    }

    pub fn render_interval(&self) -> Duration {
        self.render_interval
    }

    /// True if the last selected frame drifted beyond the acceptable maximum
    pub fn last_render_had_glitch(&self) -> bool {
        self.last_render_had_glitch
    }

    pub fn have_rendered_frames(&self) -> bool {
        self.have_rendered_frames
    }

    pub fn has_cadence(&self) -> bool {
        self.cadence_estimator.has_cadence()
    }

    pub fn frame_dropping_disabled(&self) -> bool {
        self.frame_dropping_disabled
    }

    /// Total allocation size of all queued frames
    pub fn memory_usage(&self) -> usize {
        self.frames
            .iter()
            .map(|ready| ready.frame().allocation_size())
            .sum()
    }

    /// Queued frames in presentation order
    pub fn frames(&self) -> impl Iterator<Item = &ReadyFrame<F>> {
        self.frames.iter()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            frames_queued: self.frames.len(),
            effective_frames_queued: self.effective_frames_queued,
            frames_dropped_during_enqueue: self.frames_dropped_during_enqueue,
            average_frame_duration_us: micros(self.average_frame_duration),
            max_acceptable_drift_us: micros(self.max_acceptable_drift),
            render_interval_us: micros(self.render_interval),
            has_cadence: self.cadence_estimator.has_cadence(),
            last_render_had_glitch: self.last_render_had_glitch,
            have_rendered_frames: self.have_rendered_frames,
            frame_dropping_disabled: self.frame_dropping_disabled,
            memory_usage: self.memory_usage(),
        }
    }

    fn outcome(&self, frames_dropped: usize) -> RenderOutcome<'_, F> {
        RenderOutcome {
            frame: self.frames.front().map(ReadyFrame::frame),
            frames_dropped,
        }
    }

    fn reject_frame(&mut self, frame: F) {
        self.frames_dropped_during_enqueue += 1;
        self.release_frame(frame);
    }

    fn retire_front(&mut self, count: usize) {
        for _ in 0..count {
            let Some(ready) = self.frames.pop_front() else {
                break;
            };
            self.last_retired_timestamp = Some(ready.timestamp());
            self.release_frame(ready.into_frame());
        }
    }

    /// Refresh wall-clock times, duration statistics and cadence.
    ///
    /// Returns whether the clock is moving.
    fn update_frame_statistics(&mut self) -> bool {
        if self.frames.is_empty() {
            return self.was_time_moving;
        }

        let mut timestamps: Vec<Duration> = self.frames.iter().map(ReadyFrame::timestamp).collect();
        let metadata_duration = if self.frames.len() == 1 && self.duration_estimator.count() == 0 {
            self.frames[0].frame().duration().filter(|d| !d.is_zero())
        } else {
            None
        };
        if let Some(duration) = metadata_duration {
            timestamps.push(timestamps[0] + duration);
        }

        let WallClockTimes {
            times,
            is_time_moving,
        } = self.clock.wall_clock_times(&timestamps);
        self.was_time_moving = is_time_moving;
        if times.len() != timestamps.len() {
            warn!(
                "Wall clock returned {} times for {} timestamps; keeping previous estimates",
                times.len(),
                timestamps.len()
            );
            return is_time_moving;
        }

        let last = self.frames.len() - 1;
        for i in 0..last {
            let (start_time, end_time) = (times[i], times[i + 1]);
            let frame = &mut self.frames[i];
            let new_sample = frame.has_estimated_end_time;
            frame.start_time = start_time;
            frame.end_time = Some(end_time);
            frame.has_estimated_end_time = false;
            if new_sample {
                self.duration_estimator
                    .add_sample(end_time.saturating_duration_since(start_time));
            }
        }
        self.frames[last].start_time = times[last];

        if metadata_duration.is_some() {
            let frame = &mut self.frames[last];
            frame.end_time = Some(times[last + 1]);
            frame.has_estimated_end_time = true;
        }

        if self.duration_estimator.count() == 0 {
            return is_time_moving;
        }

        self.average_frame_duration = self.duration_estimator.average();
        let deviation = self.duration_estimator.deviation();

        let last_frame = &mut self.frames[last];
        last_frame.end_time = Some(last_frame.start_time + self.average_frame_duration);

        // Half a frame of drift, but never less than one 60Hz interval.
        self.max_acceptable_drift =
            (self.average_frame_duration / 2).max(self.config.min_acceptable_drift);

        // Called from remove_expired_frames() before any render.
        if self.render_interval.is_zero() {
            return is_time_moving;
        }

        if self.cadence_estimator.update_cadence_estimate(
            self.render_interval,
            self.average_frame_duration,
            deviation,
            self.max_acceptable_drift,
        ) {
            self.cadence_frame_counter = 0;
            self.update_cadence_for_frames();
        }

        is_time_moving
    }

    fn update_cadence_for_frames(&mut self) {
        let has_cadence = self.cadence_estimator.has_cadence();
        for (i, frame) in self.frames.iter_mut().enumerate() {
            frame.ideal_render_count = if has_cadence {
                self.cadence_estimator
                    .cadence_for_frame(self.cadence_frame_counter + i as u64)
            } else {
                0
            };
        }
    }

    fn update_effective_frames_queued(&mut self) {
        let Some(last_deadline_max) = self.last_deadline_max else {
            self.effective_frames_queued = self.frames.len();
            return;
        };
        if self.frames.is_empty() || self.average_frame_duration.is_zero() {
            self.effective_frames_queued = self.frames.len();
            return;
        }

        let min_frames_queued = if self.frame_dropping_disabled {
            self.frames
                .iter()
                .filter(|frame| frame.was_never_rendered())
                .count()
        } else {
            0
        };

        self.effective_frames_queued =
            min_frames_queued.max(self.count_effective_frames_queued(last_deadline_max));
    }

    fn count_effective_frames_queued(&self, last_deadline_max: Instant) -> usize {
        if !self.cadence_estimator.has_cadence() {
            let expired = self
                .frames
                .iter()
                .take_while(|frame| frame.end_time().is_some_and(|end| end <= last_deadline_max))
                .count();
            return self.frames.len() - expired;
        }

        let Some(candidate) = selection::find_best_frame_by_cadence(&self.frames) else {
            return 0;
        };
        let minimum_end_time = last_deadline_max.checked_sub(self.max_acceptable_drift);
        self.frames
            .iter()
            .skip(candidate.index)
            .filter(|frame| {
                frame.render_count() < frame.ideal_render_count()
                    && match (frame.end_time(), minimum_end_time) {
                        (Some(end), Some(minimum)) => end > minimum,
                        _ => true,
                    }
            })
            .count()
    }
}

impl<F> FrameScheduler<F> {
    fn release_frame(&mut self, frame: F) {
        if let Some(release) = self.release.as_mut() {
            release(frame);
        }
    }

    fn release_all(&mut self) {
        while let Some(ready) = self.frames.pop_front() {
            self.release_frame(ready.into_frame());
        }
    }
}

impl<F> Drop for FrameScheduler<F> {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

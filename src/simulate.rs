//! Synthetic playback session
//!
//! Drives a [`FrameScheduler`] with a constant-rate producer and a display
//! that calls `render` once per refresh, optionally with vsync jitter,
//! dropped presentations, a paused clock or a hidden window.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::Bytes;
use framepace_core::{Config, DecodedFrame, Error, PlaybackClock};
use framepace_scheduler::{FrameScheduler, SchedulerStats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

/// Parameters of a simulated session
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub content_fps: f64,
    pub refresh_hz: f64,
    pub ticks: u32,
    /// Upper bound of the random delay added to each render deadline
    pub jitter: Duration,
    pub seed: u64,
    /// Probability that a rendered frame never reaches the screen
    pub drop_probability: f64,
    /// Effective frames the producer keeps queued
    pub buffer: usize,
    pub frame_bytes: usize,
    pub pause_at: Option<u32>,
    pub pause_ticks: u32,
    pub hidden_at: Option<u32>,
    pub hidden_ticks: u32,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            content_fps: 23.976,
            refresh_hz: 60.0,
            ticks: 600,
            jitter: Duration::ZERO,
            seed: 0,
            drop_probability: 0.0,
            buffer: 6,
            frame_bytes: 1920 * 1080 * 3 / 2,
            pause_at: None,
            pause_ticks: 30,
            hidden_at: None,
            hidden_ticks: 30,
        }
    }
}

impl SimulationOptions {
    pub fn validate(&self) -> framepace_core::Result<()> {
        if !(self.content_fps.is_finite() && self.content_fps > 0.0) {
            return Err(Error::invalid_argument(format!(
                "content fps must be positive, got {}",
                self.content_fps
            )));
        }
        if !(self.refresh_hz.is_finite() && self.refresh_hz > 0.0) {
            return Err(Error::invalid_argument(format!(
                "refresh rate must be positive, got {}",
                self.refresh_hz
            )));
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(Error::invalid_argument(format!(
                "drop probability must be within [0, 1], got {}",
                self.drop_probability
            )));
        }
        if self.buffer == 0 {
            return Err(Error::invalid_argument("buffer must hold at least one frame"));
        }
        Ok(())
    }

    fn is_paused(&self, tick: u32) -> bool {
        within(self.pause_at, self.pause_ticks, tick)
    }

    fn is_hidden(&self, tick: u32) -> bool {
        within(self.hidden_at, self.hidden_ticks, tick)
    }
}

fn within(start: Option<u32>, length: u32, tick: u32) -> bool {
    start.is_some_and(|start| tick >= start && tick - start < length)
}

/// Outcome of a simulated session
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub ticks_rendered: u64,
    pub frames_enqueued: u64,
    /// Distinct frames returned by at least one render
    pub frames_presented: u64,
    /// Frames skipped by `render` without ever being shown
    pub frames_dropped: u64,
    /// Unrendered frames pruned while the window was hidden
    pub frames_expired: u64,
    pub frames_released: u64,
    /// Renders reported back as never reaching the screen
    pub display_drops: u64,
    pub glitches: u64,
    /// Number of frames by how many ticks each was returned for
    pub render_count_histogram: BTreeMap<u32, u64>,
    pub stats: SchedulerStats,
}

impl SimulationReport {
    /// Histogram as `ticks:frames` pairs, e.g. `2:120 3:119`
    pub fn histogram_summary(&self) -> String {
        self.render_count_histogram
            .iter()
            .map(|(ticks, frames)| format!("{}:{}", ticks, frames))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run a session against a fresh scheduler
pub fn run(options: &SimulationOptions, config: &Config) -> Result<SimulationReport> {
    options.validate()?;
    config.validate()?;

    let base = Instant::now();
    let clock = PlaybackClock::new(base);
    clock.play_at(base, Duration::ZERO);

    let released = Arc::new(AtomicU64::new(0));
    let release_counter = released.clone();
    let mut scheduler = FrameScheduler::new(clock.clone(), config).with_release_callback(
        move |_frame: DecodedFrame| {
            release_counter.fetch_add(1, Ordering::Relaxed);
        },
    );

    let mut rng = StdRng::seed_from_u64(options.seed);
    let payload = Bytes::from(vec![0u8; options.frame_bytes]);
    let frame_duration = nanos_per(options.content_fps, 1);
    let render_interval = nanos_per(options.refresh_hz, 1);

    let mut next_frame = 0u64;
    let mut ticks_rendered = 0u64;
    let mut frames_dropped = 0u64;
    let mut frames_expired = 0u64;
    let mut display_drops = 0u64;
    let mut glitches = 0u64;
    let mut shown: HashMap<u64, u32> = HashMap::new();

    for tick in 0..options.ticks {
        let jitter = if options.jitter.is_zero() {
            Duration::ZERO
        } else {
            rng.gen_range(Duration::ZERO..=options.jitter)
        };
        let deadline_min = base + nanos_per(options.refresh_hz, u64::from(tick)) + jitter;
        let deadline_max = deadline_min + render_interval;

        if options.pause_at == Some(tick) {
            info!("Pausing playback at tick {}", tick);
            clock.pause(deadline_min);
        } else if options.is_paused(tick.wrapping_sub(1)) && !options.is_paused(tick) {
            info!("Resuming playback at tick {}", tick);
            clock.play_at(deadline_min, clock.media_time_at(deadline_min));
        }

        // Producer: keep the buffer topped up, bounded in case nothing is
        // ever considered live.
        while scheduler.effective_frames_queued() < options.buffer
            && scheduler.frames_queued() < options.buffer * 4
        {
            let timestamp = nanos_per(options.content_fps, next_frame);
            let frame = DecodedFrame::new(payload.clone(), 1920, 1080, next_frame, timestamp)
                .with_duration(frame_duration);
            scheduler.enqueue_frame(frame);
            next_frame += 1;
        }

        if options.is_hidden(tick) {
            frames_expired += scheduler.remove_expired_frames(deadline_min) as u64;
            continue;
        }

        let outcome = scheduler.render(deadline_min, deadline_max);
        let Some(frame) = outcome.frame else {
            debug!("Tick {}: nothing to render", tick);
            continue;
        };
        *shown.entry(frame.sequence).or_insert(0) += 1;
        frames_dropped += outcome.frames_dropped as u64;
        ticks_rendered += 1;

        if scheduler.last_render_had_glitch() {
            glitches += 1;
        }
        if options.drop_probability > 0.0 && rng.gen_bool(options.drop_probability) {
            scheduler.on_last_frame_dropped();
            display_drops += 1;
        }
    }

    let mut render_count_histogram = BTreeMap::new();
    for count in shown.values() {
        *render_count_histogram.entry(*count).or_insert(0) += 1;
    }

    let stats = scheduler.stats();
    drop(scheduler);

    Ok(SimulationReport {
        ticks_rendered,
        frames_enqueued: next_frame,
        frames_presented: shown.len() as u64,
        frames_dropped,
        frames_expired,
        frames_released: released.load(Ordering::Relaxed),
        display_drops,
        glitches,
        render_count_histogram,
        stats,
    })
}

/// Time of the `index`-th event at `rate` events per second
fn nanos_per(rate: f64, index: u64) -> Duration {
    Duration::from_nanos((index as f64 * 1e9 / rate).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SimulationOptions {
        SimulationOptions {
            content_fps: 24.0,
            ticks: 300,
            frame_bytes: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_film_content_alternates_three_and_two() {
        let report = run(&options(), &Config::new()).unwrap();
        assert_eq!(report.ticks_rendered, 300);
        assert_eq!(report.frames_dropped, 0);
        assert!(report.stats.has_cadence);
        assert!(report.render_count_histogram[&3] >= 50);
        assert!(report.render_count_histogram[&2] >= 50);
        assert!(report
            .render_count_histogram
            .keys()
            .all(|ticks| (1..=3).contains(ticks)));
    }

    #[test]
    fn test_every_frame_is_released() {
        let report = run(&options(), &Config::new()).unwrap();
        assert_eq!(report.frames_released, report.frames_enqueued);
    }

    #[test]
    fn test_display_drops_are_reported() {
        let options = SimulationOptions {
            drop_probability: 1.0,
            ..options()
        };
        let report = run(&options, &Config::new()).unwrap();
        assert_eq!(report.display_drops, report.ticks_rendered);
    }

    #[test]
    fn test_hidden_window_expires_frames() {
        let options = SimulationOptions {
            hidden_at: Some(60),
            hidden_ticks: 60,
            ..options()
        };
        let report = run(&options, &Config::new()).unwrap();
        assert_eq!(report.ticks_rendered, 240);
        assert!(report.frames_expired > 0);
    }

    #[test]
    fn test_pause_holds_frames() {
        let options = SimulationOptions {
            pause_at: Some(60),
            pause_ticks: 60,
            ..options()
        };
        let report = run(&options, &Config::new()).unwrap();
        assert_eq!(report.ticks_rendered, 300);
        assert!(report.render_count_histogram.keys().any(|ticks| *ticks >= 60));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let options = SimulationOptions {
            jitter: Duration::from_micros(2_000),
            drop_probability: 0.1,
            seed: 9,
            ..options()
        };
        let first = run(&options, &Config::new()).unwrap();
        let second = run(&options, &Config::new()).unwrap();
        assert_eq!(first.render_count_histogram, second.render_count_histogram);
        assert_eq!(first.display_drops, second.display_drops);
    }

    #[test]
    fn test_rejects_invalid_options() {
        let bad_rate = SimulationOptions {
            refresh_hz: 0.0,
            ..options()
        };
        assert!(matches!(bad_rate.validate(), Err(Error::InvalidArgument(_))));
        assert!(run(&bad_rate, &Config::new()).is_err());

        let bad_probability = SimulationOptions {
            drop_probability: 1.5,
            ..options()
        };
        assert!(run(&bad_probability, &Config::new()).is_err());
    }

    #[test]
    fn test_histogram_summary() {
        let mut report = run(&SimulationOptions { ticks: 0, ..options() }, &Config::new()).unwrap();
        report.render_count_histogram = BTreeMap::from([(2, 10), (3, 9)]);
        assert_eq!(report.histogram_summary(), "2:10 3:9");
    }
}

//! Media time to wall-clock mapping
//!
//! The scheduler reasons about frames in wall-clock time. A [`WallClock`]
//! converts media timestamps into the instants at which they should be on
//! screen and reports whether playback is currently advancing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Result of mapping a batch of media timestamps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallClockTimes {
    /// One instant per input timestamp, in input order
    pub times: Vec<Instant>,
    /// False when playback is paused or stopped
    pub is_time_moving: bool,
}

impl WallClockTimes {
    /// Times produced while playback is advancing
    pub fn moving(times: Vec<Instant>) -> Self {
        Self {
            times,
            is_time_moving: true,
        }
    }

    /// Times produced while playback is stopped
    pub fn stopped(times: Vec<Instant>) -> Self {
        Self {
            times,
            is_time_moving: false,
        }
    }
}

/// Converts media timestamps to wall-clock instants
///
/// Implementations must return exactly one instant per input timestamp.
pub trait WallClock {
    fn wall_clock_times(&self, media_timestamps: &[Duration]) -> WallClockTimes;
}

impl<F> WallClock for F
where
    F: Fn(&[Duration]) -> WallClockTimes,
{
    fn wall_clock_times(&self, media_timestamps: &[Duration]) -> WallClockTimes {
        self(media_timestamps)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    /// Wall-clock instant at which `media_anchor` is (or was) presented
    anchor: Instant,
    media_anchor: Duration,
    playback_rate: f64,
    playing: bool,
}

/// A shared playback clock
///
/// Clones refer to the same clock, so a player can keep a handle for
/// play/pause/seek while the scheduler owns another.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: Arc<Mutex<ClockState>>,
}

impl PlaybackClock {
    /// Create a paused clock mapping media time zero to `origin`
    pub fn new(origin: Instant) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                anchor: origin,
                media_anchor: Duration::ZERO,
                playback_rate: 1.0,
                playing: false,
            })),
        }
    }

    /// Start (or resume) playback so that `media_time` is presented at `at`
    pub fn play_at(&self, at: Instant, media_time: Duration) {
        let mut state = self.state.lock();
        state.anchor = at;
        state.media_anchor = media_time;
        state.playing = true;
    }

    /// Stop advancing, freezing media time at its value at `now`
    pub fn pause(&self, now: Instant) {
        let mut state = self.state.lock();
        let media_now = Self::media_time_locked(&state, now);
        state.anchor = now;
        state.media_anchor = media_now;
        state.playing = false;
    }

    /// Re-anchor the clock so that `media_time` maps to `at` without changing play state
    pub fn seek(&self, at: Instant, media_time: Duration) {
        let mut state = self.state.lock();
        state.anchor = at;
        state.media_anchor = media_time;
    }

    /// Change the playback rate, keeping the media time at `now` continuous
    ///
    /// Non-positive or non-finite rates are ignored.
    pub fn set_playback_rate(&self, rate: f64, now: Instant) {
        if !rate.is_finite() || rate <= 0.0 {
            return;
        }
        let mut state = self.state.lock();
        let media_now = Self::media_time_locked(&state, now);
        state.anchor = now;
        state.media_anchor = media_now;
        state.playback_rate = rate;
    }

    /// Media time presented at wall-clock instant `at`
    pub fn media_time_at(&self, at: Instant) -> Duration {
        Self::media_time_locked(&self.state.lock(), at)
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn media_time_locked(state: &ClockState, at: Instant) -> Duration {
        if !state.playing {
            return state.media_anchor;
        }
        let elapsed = at.saturating_duration_since(state.anchor);
        state.media_anchor + scale(elapsed, state.playback_rate)
    }

    fn to_wall_clock(state: &ClockState, timestamp: Duration) -> Instant {
        if timestamp >= state.media_anchor {
            let offset = scale(timestamp - state.media_anchor, state.playback_rate.recip());
            state.anchor + offset
        } else {
            let offset = scale(state.media_anchor - timestamp, state.playback_rate.recip());
            state.anchor.checked_sub(offset).unwrap_or(state.anchor)
        }
    }
}

/// Scale a duration, exactly at normal rate
fn scale(duration: Duration, factor: f64) -> Duration {
    if factor == 1.0 {
        duration
    } else {
        duration.mul_f64(factor)
    }
}

impl WallClock for PlaybackClock {
    fn wall_clock_times(&self, media_timestamps: &[Duration]) -> WallClockTimes {
        let state = *self.state.lock();
        WallClockTimes {
            times: media_timestamps
                .iter()
                .map(|timestamp| Self::to_wall_clock(&state, *timestamp))
                .collect(),
            is_time_moving: state.playing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_paused_clock_reports_stopped() {
        let origin = Instant::now();
        let clock = PlaybackClock::new(origin);
        let mapped = clock.wall_clock_times(&[ms(0), ms(40)]);
        assert!(!mapped.is_time_moving);
        assert_eq!(mapped.times, vec![origin, origin + ms(40)]);
    }

    #[test]
    fn test_play_at_anchors_mapping() {
        let origin = Instant::now();
        let clock = PlaybackClock::new(origin);
        clock.play_at(origin + ms(100), ms(1000));

        let mapped = clock.wall_clock_times(&[ms(1000), ms(1040)]);
        assert!(mapped.is_time_moving);
        assert_eq!(mapped.times[0], origin + ms(100));
        assert_eq!(mapped.times[1], origin + ms(140));
        assert_eq!(clock.media_time_at(origin + ms(150)), ms(1050));
    }

    #[test]
    fn test_playback_rate_scales_intervals() {
        let origin = Instant::now();
        let clock = PlaybackClock::new(origin);
        clock.play_at(origin, Duration::ZERO);
        clock.set_playback_rate(2.0, origin);

        let mapped = clock.wall_clock_times(&[ms(0), ms(40)]);
        assert_eq!(mapped.times[1] - mapped.times[0], ms(20));

        clock.set_playback_rate(-1.0, origin);
        assert_eq!(clock.playback_rate(), 2.0);
    }

    #[test]
    fn test_clones_share_state() {
        let origin = Instant::now();
        let clock = PlaybackClock::new(origin);
        let handle = clock.clone();
        handle.play_at(origin, Duration::ZERO);
        assert!(clock.is_playing());
        handle.pause(origin + ms(30));
        assert!(!clock.wall_clock_times(&[ms(1)]).is_time_moving);
        assert_eq!(clock.media_time_at(origin + ms(500)), ms(30));
    }

    #[test]
    fn test_resume_after_pause_continues_media_time() {
        let origin = Instant::now();
        let clock = PlaybackClock::new(origin);
        clock.play_at(origin, Duration::ZERO);
        clock.pause(origin + ms(100));

        let resume = origin + ms(400);
        clock.play_at(resume, clock.media_time_at(resume));
        assert_eq!(clock.media_time_at(resume + ms(50)), ms(150));
        assert_eq!(clock.wall_clock_times(&[ms(100)]).times, vec![resume]);
    }

    #[test]
    fn test_closure_clock() {
        let origin = Instant::now();
        let clock = move |timestamps: &[Duration]| {
            WallClockTimes::moving(timestamps.iter().map(|t| origin + *t).collect())
        };
        let mapped = clock.wall_clock_times(&[ms(5)]);
        assert_eq!(mapped.times, vec![origin + ms(5)]);
        assert!(mapped.is_time_moving);
    }
}

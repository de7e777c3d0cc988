//! Bounded moving average over frame durations

use std::time::Duration;

use framepace_core::{DurationConfig, FrameDurationEstimator};

/// Moving average of the last `depth` frame durations
#[derive(Debug, Clone)]
pub struct MovingAverage {
    /// Ring buffer of the most recent samples
    samples: Vec<Duration>,
    depth: usize,
    /// Slot overwritten by the next sample once the ring is full
    next: usize,
    /// Samples added since the last reset
    count: usize,
    total: Duration,
}

impl MovingAverage {
    /// Create an average over at most `depth` samples (at least one)
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            samples: Vec::with_capacity(depth),
            depth,
            next: 0,
            count: 0,
            total: Duration::ZERO,
        }
    }

    pub fn from_config(config: &DurationConfig) -> Self {
        Self::new(config.moving_average_samples)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl FrameDurationEstimator for MovingAverage {
    fn add_sample(&mut self, duration: Duration) {
        if self.samples.len() < self.depth {
            self.samples.push(duration);
        } else {
            self.total -= self.samples[self.next];
            self.samples[self.next] = duration;
        }
        self.next = (self.next + 1) % self.depth;
        self.total += duration;
        self.count += 1;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.total / self.samples.len() as u32
    }

    fn deviation(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let n = self.samples.len() as f64;
        let mean = self.total.as_secs_f64() / n;
        let variance = self
            .samples
            .iter()
            .map(|sample| {
                let delta = sample.as_secs_f64() - mean;
                delta * delta
            })
            .sum::<f64>()
            / n;
        Duration::from_secs_f64(variance.sqrt())
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.next = 0;
        self.count = 0;
        self.total = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_empty_average() {
        let average = MovingAverage::new(4);
        assert_eq!(average.count(), 0);
        assert_eq!(average.average(), Duration::ZERO);
        assert_eq!(average.deviation(), Duration::ZERO);
    }

    #[test]
    fn test_average_and_deviation() {
        let mut average = MovingAverage::new(4);
        average.add_sample(ms(30));
        average.add_sample(ms(50));
        assert_eq!(average.count(), 2);
        assert_eq!(average.average(), ms(40));
        let deviation = average.deviation();
        assert!(deviation > ms(9) && deviation < ms(11), "{:?}", deviation);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut average = MovingAverage::new(2);
        average.add_sample(ms(100));
        average.add_sample(ms(10));
        average.add_sample(ms(10));
        // The 100ms sample has fallen out of the window.
        assert_eq!(average.average(), ms(10));
        assert_eq!(average.deviation(), Duration::ZERO);
        assert_eq!(average.count(), 3);
    }

    #[test]
    fn test_reset() {
        let mut average = MovingAverage::new(3);
        average.add_sample(ms(16));
        average.reset();
        assert_eq!(average.count(), 0);
        assert_eq!(average.average(), Duration::ZERO);
        average.add_sample(ms(20));
        assert_eq!(average.average(), ms(20));
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let mut average = MovingAverage::new(0);
        assert_eq!(average.depth(), 1);
        average.add_sample(ms(5));
        average.add_sample(ms(7));
        assert_eq!(average.average(), ms(7));
    }
}

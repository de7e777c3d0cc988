//! Candidate-finding algorithms
//!
//! Pure functions over the ready queue. Indices returned here are only
//! valid until the queue is next mutated.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::ready_frame::ReadyFrame;

/// Frame chosen by cadence and the overage carried onto it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceCandidate {
    pub index: usize,
    /// Ticks already rendered beyond the ideal counts of earlier frames
    pub overage: u32,
}

/// Best and second-best frames by coverage of a deadline window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageCandidates {
    pub best: Option<usize>,
    pub second_best: Option<usize>,
}

/// Pick the next frame according to the ideal render counts.
///
/// An under-rendered front frame always wins. Otherwise the front frame's
/// overage is spent against the following frames' ideal counts, and the
/// first frame it cannot fully consume is the candidate.
pub fn find_best_frame_by_cadence<F>(frames: &VecDeque<ReadyFrame<F>>) -> Option<CadenceCandidate> {
    let current = frames.front()?;
    if current.render_count() < current.ideal_render_count() {
        return Some(CadenceCandidate {
            index: 0,
            overage: 0,
        });
    }

    let mut overage = current.render_count() - current.ideal_render_count();
    for (index, frame) in frames.iter().enumerate().skip(1) {
        if frame.ideal_render_count() > overage {
            return Some(CadenceCandidate { index, overage });
        }
        overage -= frame.ideal_render_count();
    }
    None
}

/// Find the frames covering most of `[deadline_min, deadline_max]`.
///
/// When the two best coverages are within `jitter_tolerance`, the earlier
/// frame is preferred so render-interval jitter cannot flip the choice.
pub fn find_best_frame_by_coverage<F>(
    frames: &VecDeque<ReadyFrame<F>>,
    deadline_min: Instant,
    deadline_max: Instant,
    jitter_tolerance: Duration,
) -> CoverageCandidates {
    let mut coverage = vec![Duration::ZERO; frames.len()];
    let mut best: Option<usize> = None;
    let mut best_coverage = Duration::ZERO;

    for (i, frame) in frames.iter().enumerate() {
        // Frames are ordered, so nothing later can overlap either.
        if frame.start_time() > deadline_max {
            break;
        }
        let end_time = frame.end_or_start().min(deadline_max);
        if end_time < deadline_min {
            continue;
        }
        coverage[i] = end_time.saturating_duration_since(frame.start_time().max(deadline_min));
        if coverage[i] > best_coverage {
            best = Some(i);
            best_coverage = coverage[i];
        }
    }

    let mut second_best = None;
    if let Some(best_index) = best {
        coverage[best_index] = Duration::ZERO;
        let mut second_coverage = Duration::ZERO;
        for (i, value) in coverage.iter().enumerate() {
            if *value > second_coverage {
                second_best = Some(i);
                second_coverage = *value;
            }
        }
    }

    if let (Some(best_index), Some(second_index)) = (best, second_best) {
        let gap = abs_diff(best_coverage, coverage[second_index]);
        if best_index > second_index && gap <= jitter_tolerance {
            return CoverageCandidates {
                best: Some(second_index),
                second_best: Some(best_index),
            };
        }
    }

    CoverageCandidates { best, second_best }
}

/// Find the frame closest to `deadline_min`, preferring the later frame on ties
pub fn find_best_frame_by_drift<F>(
    frames: &VecDeque<ReadyFrame<F>>,
    deadline_min: Instant,
) -> Option<(usize, Duration)> {
    let mut best: Option<(usize, Duration)> = None;
    for (i, frame) in frames.iter().enumerate() {
        let drift = absolute_drift(frame, deadline_min);
        if best.map_or(true, |(_, best_drift)| drift <= best_drift) {
            best = Some((i, drift));
        }
    }
    best
}

/// Distance from `deadline_min` to the frame's presentation interval
pub fn absolute_drift<F>(frame: &ReadyFrame<F>, deadline_min: Instant) -> Duration {
    let end_time = frame.end_or_start();
    if end_time < deadline_min {
        return deadline_min - end_time;
    }
    if frame.start_time() > deadline_min {
        return frame.start_time() - deadline_min;
    }
    Duration::ZERO
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framepace_core::DecodedFrame;

    fn us(value: u64) -> Duration {
        Duration::from_micros(value)
    }

    /// Frames with explicit [start, end) intervals in microseconds from `base`.
    fn queue(base: Instant, intervals: &[(u64, u64)]) -> VecDeque<ReadyFrame<DecodedFrame>> {
        intervals
            .iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let mut frame = ReadyFrame::new(
                    DecodedFrame::empty(i as u64, us(*start)),
                    base + us(*start),
                    Some(base + us(*end)),
                );
                frame.has_estimated_end_time = false;
                frame
            })
            .collect()
    }

    fn with_cadence(
        mut frames: VecDeque<ReadyFrame<DecodedFrame>>,
        counts: &[(u32, u32)],
    ) -> VecDeque<ReadyFrame<DecodedFrame>> {
        for (frame, (ideal, rendered)) in frames.iter_mut().zip(counts) {
            frame.ideal_render_count = *ideal;
            frame.mark_rendered(*rendered);
        }
        frames
    }

    #[test]
    fn test_cadence_under_rendered_front_wins() {
        let base = Instant::now();
        let frames = with_cadence(
            queue(base, &[(0, 41_667), (41_667, 83_333)]),
            &[(3, 2), (2, 0)],
        );
        assert_eq!(
            find_best_frame_by_cadence(&frames),
            Some(CadenceCandidate {
                index: 0,
                overage: 0
            })
        );
    }

    #[test]
    fn test_cadence_overage_walks_forward() {
        let base = Instant::now();
        // Front frame rendered 6 times against an ideal of 3: the next frame
        // (ideal 2) is fully consumed, the one after absorbs the remainder.
        let frames = with_cadence(
            queue(base, &[(0, 10_000), (10_000, 20_000), (20_000, 30_000)]),
            &[(3, 6), (2, 0), (3, 0)],
        );
        assert_eq!(
            find_best_frame_by_cadence(&frames),
            Some(CadenceCandidate {
                index: 2,
                overage: 1
            })
        );
    }

    #[test]
    fn test_cadence_exhausted_queue() {
        let base = Instant::now();
        let frames = with_cadence(
            queue(base, &[(0, 10_000), (10_000, 20_000)]),
            &[(2, 5), (2, 0)],
        );
        assert_eq!(find_best_frame_by_cadence(&frames), None);

        let empty: VecDeque<ReadyFrame<DecodedFrame>> = VecDeque::new();
        assert_eq!(find_best_frame_by_cadence(&empty), None);
    }

    #[test]
    fn test_coverage_prefers_largest_overlap() {
        let base = Instant::now();
        let frames = queue(base, &[(0, 4_000), (4_000, 20_000), (20_000, 30_000)]);
        let candidates =
            find_best_frame_by_coverage(&frames, base, base + us(16_667), us(500));
        assert_eq!(candidates.best, Some(1));
        assert_eq!(candidates.second_best, Some(0));
    }

    #[test]
    fn test_coverage_tie_break_prefers_earlier_frame() {
        let base = Instant::now();
        // 8.2ms vs 8.4ms of coverage: within tolerance, so the earlier frame wins.
        let frames = queue(base, &[(0, 8_200), (8_200, 20_000)]);
        let candidates =
            find_best_frame_by_coverage(&frames, base, base + us(16_600), us(500));
        assert_eq!(candidates.best, Some(0));
        assert_eq!(candidates.second_best, Some(1));
    }

    #[test]
    fn test_coverage_outside_tolerance_keeps_later_frame() {
        let base = Instant::now();
        // 7.0ms vs 9.6ms of coverage.
        let frames = queue(base, &[(0, 7_000), (7_000, 20_000)]);
        let candidates =
            find_best_frame_by_coverage(&frames, base, base + us(16_600), us(500));
        assert_eq!(candidates.best, Some(1));
        assert_eq!(candidates.second_best, Some(0));
    }

    #[test]
    fn test_coverage_none_when_nothing_overlaps() {
        let base = Instant::now();
        let frames = queue(base, &[(0, 1_000), (1_000, 2_000)]);
        let candidates = find_best_frame_by_coverage(
            &frames,
            base + us(50_000),
            base + us(66_667),
            us(500),
        );
        assert_eq!(candidates, CoverageCandidates::default());
    }

    #[test]
    fn test_drift_prefers_later_frame_on_ties() {
        let base = Instant::now();
        // Deadline at 15ms sits 5ms after the first frame and 5ms before the second.
        let frames = queue(base, &[(0, 10_000), (20_000, 30_000)]);
        let (index, drift) = find_best_frame_by_drift(&frames, base + us(15_000)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(drift, us(5_000));
    }

    #[test]
    fn test_absolute_drift() {
        let base = Instant::now();
        let frames = queue(base, &[(10_000, 20_000)]);
        let frame = &frames[0];
        assert_eq!(absolute_drift(frame, base + us(15_000)), Duration::ZERO);
        assert_eq!(absolute_drift(frame, base + us(10_000)), Duration::ZERO);
        assert_eq!(absolute_drift(frame, base + us(4_000)), us(6_000));
        assert_eq!(absolute_drift(frame, base + us(23_000)), us(3_000));
    }
}

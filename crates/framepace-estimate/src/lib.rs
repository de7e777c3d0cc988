//! framepace Estimate - Default estimators
//!
//! Implementations of the duration and cadence contracts from
//! `framepace-core` used by the scheduler unless the caller injects its own.

pub mod cadence;
pub mod moving_average;

pub use cadence::{Cadence, VideoCadenceEstimator};
pub use moving_average::MovingAverage;

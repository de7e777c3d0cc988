//! framepace Core - Shared types and collaborator contracts
//!
//! This crate provides the foundational types used across all framepace
//! components: the frame handle trait, the wall-clock mapping, the estimator
//! contracts consumed by the scheduler, configuration and errors.

pub mod clock;
pub mod config;
pub mod error;
pub mod estimator;
pub mod frame;

pub use clock::{PlaybackClock, WallClock, WallClockTimes};
pub use config::{CadenceConfig, Config, DurationConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use estimator::{CadenceEstimator, FrameDurationEstimator};
pub use frame::{DecodedFrame, PresentableFrame};

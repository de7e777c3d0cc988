//! framepace Scheduler - Frame selection for real-time playback
//!
//! Given decoded frames with arbitrary presentation timestamps and a
//! sequence of render ticks, [`FrameScheduler`] picks the frame to show on
//! each tick. It follows the content's cadence when one exists, falls back
//! to coverage and then drift otherwise, and keeps exact counts of how many
//! times each frame was presented or dropped.
//!
//! The scheduler is single-threaded: every call must come from one logical
//! sequence owned by the caller.

pub mod ready_frame;
pub mod scheduler;
pub mod selection;
mod sequence;
pub mod stats;

pub use ready_frame::ReadyFrame;
pub use scheduler::{FrameScheduler, ReleaseCallback, RenderOutcome, ResetMode};
pub use stats::SchedulerStats;

//! Frame handles accepted by the scheduler
//!
//! The scheduler never touches pixel data. It only needs a frame's media
//! timestamp, the optional producer-supplied duration and, for memory
//! accounting, how large the underlying allocation is.

use std::time::Duration;

use bytes::Bytes;

/// A decoded frame that can be queued for presentation
pub trait PresentableFrame {
    /// Media timestamp of the frame
    fn timestamp(&self) -> Duration;

    /// Producer-supplied frame duration, if known
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// Size in bytes of the buffer backing this frame
    fn allocation_size(&self) -> usize {
        0
    }
}

/// A decoded video frame
///
/// The pixel payload is reference counted; moving or queueing the frame
/// never copies it.
#[derive(Clone)]
pub struct DecodedFrame {
    /// Decoded pixel data
    data: Bytes,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Decode order sequence number
    pub sequence: u64,
    /// Media timestamp
    pub timestamp: Duration,
    /// Duration from the container or decoder, if any
    pub duration: Option<Duration>,
}

impl DecodedFrame {
    /// Create a new frame from decoded pixel data
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        sequence: u64,
        timestamp: Duration,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            sequence,
            timestamp,
            duration: None,
        }
    }

    /// Create a frame carrying no pixel data, useful for timing-only pipelines
    pub fn empty(sequence: u64, timestamp: Duration) -> Self {
        Self::new(Bytes::new(), 0, 0, sequence, timestamp)
    }

    /// Builder pattern: attach duration metadata
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Get the raw pixel data as a slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get total size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl PresentableFrame for DecodedFrame {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn allocation_size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("duration", &self.duration)
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_metadata() {
        let frame = DecodedFrame::new(vec![0u8; 16], 2, 2, 7, Duration::from_millis(40))
            .with_duration(Duration::from_millis(40));
        assert_eq!(PresentableFrame::timestamp(&frame), Duration::from_millis(40));
        assert_eq!(PresentableFrame::duration(&frame), Some(Duration::from_millis(40)));
        assert_eq!(frame.allocation_size(), 16);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_clone_shares_payload() {
        let frame = DecodedFrame::new(vec![1u8; 64], 4, 4, 0, Duration::ZERO);
        let copy = frame.clone();
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
    }

    #[test]
    fn test_empty_frame() {
        let frame = DecodedFrame::empty(3, Duration::from_millis(5));
        assert_eq!(frame.size(), 0);
        assert_eq!(PresentableFrame::duration(&frame), None);
    }
}

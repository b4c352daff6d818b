//! Fixed-size frame accumulation

/// Accumulates streamed samples into non-overlapping frames
#[derive(Debug)]
pub struct FrameAccumulator {
    frame_size: usize,
    buffer: Vec<f32>,
}

impl FrameAccumulator {
    /// Create an accumulator producing frames of `frame_size` samples
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            buffer: Vec::with_capacity(frame_size),
        }
    }

    /// Append samples, returning every frame completed by them
    pub fn push(&mut self, mut samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();

        while !samples.is_empty() {
            let take = self.remaining().min(samples.len());
            let (head, tail) = samples.split_at(take);
            self.buffer.extend_from_slice(head);
            samples = tail;

            if self.buffer.len() == self.frame_size {
                let frame = std::mem::replace(
                    &mut self.buffer,
                    Vec::with_capacity(self.frame_size),
                );
                frames.push(frame);
            }
        }

        frames
    }

    /// Samples still needed to complete the current frame
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frame_size - self.buffer.len()
    }

    /// Samples buffered toward the current frame
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frame size in samples
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Discard the partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

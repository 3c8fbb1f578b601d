//! Sample buffers used on and around the real-time path
//!
//! [`ScratchBuffer`] is the engine's private input buffer. [`SampleQueue`]
//! is a lock-free single-producer single-consumer queue of interleaved
//! samples that carries captured input from the host's input callback to
//! whoever reads the input stream.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Flat interleaved sample buffer that only ever grows
///
/// Growth reallocates, so it must only happen outside the audio callback.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    samples: Vec<f32>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure at least `samples` samples are available.
    ///
    /// Returns true if the buffer was reallocated.
    pub fn ensure_capacity(&mut self, samples: usize) -> bool {
        if samples <= self.samples.len() {
            return false;
        }
        self.samples = vec![0.0; samples];
        true
    }

    /// Usable size in samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }
}

/// Lock-free queue of interleaved samples
pub struct SampleQueue {
    queue: ArrayQueue<f32>,
    channels: usize,
    overflow_count: AtomicUsize,
}

impl SampleQueue {
    /// Queue holding `capacity_frames` frames of `channels` samples
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            queue: ArrayQueue::new(capacity_frames.max(1) * channels),
            channels,
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// Push interleaved samples, whole frames only. Frames that do not fit,
    /// and a trailing partial frame, are dropped.
    ///
    /// Returns the number of frames accepted.
    pub fn push_slice(&self, samples: &[f32]) -> usize {
        let mut pushed = 0;
        for frame in samples.chunks_exact(self.channels) {
            // Single producer: free space can only grow after this check
            if self.queue.capacity() - self.queue.len() < self.channels {
                break;
            }
            for &sample in frame {
                let _ = self.queue.push(sample);
            }
            pushed += 1;
        }

        let dropped = samples.len().div_ceil(self.channels) - pushed;
        if dropped > 0 {
            self.overflow_count.fetch_add(dropped, Ordering::Relaxed);
        }
        pushed
    }

    /// Pop up to `max_frames` whole frames into `dest`.
    ///
    /// Returns the number of frames written.
    pub fn pop_frames(&self, dest: &mut [f32], max_frames: usize) -> usize {
        let frames = max_frames
            .min(dest.len() / self.channels)
            .min(self.available_frames());
        let samples = frames * self.channels;
        for slot in dest[..samples].iter_mut() {
            // Single consumer: everything counted above is still there
            *slot = self.queue.pop().unwrap_or(0.0);
        }
        frames
    }

    /// Whole frames currently queued
    pub fn available_frames(&self) -> usize {
        self.queue.len() / self.channels
    }

    /// Frames dropped because the queue was full
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

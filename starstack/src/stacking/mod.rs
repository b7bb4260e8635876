//! Mean stacking of aligned frames.
//!
//! Sums are kept in `f64` so the mean does not depend on the order frames
//! arrive in beyond rounding of the final division.

mod error;

use rayon::prelude::*;

use crate::frame::{Channel, ChannelFrame};
use crate::normalize::normalize_to_unit_max;
use crate::registration::{AlignmentResult, RegistrationError, Skip};

pub use error::StackingError;

/// Chunk size for parallel accumulation.
const ACCUMULATE_CHUNK_SIZE: usize = 4096;

/// Running per-pixel sum of frames with equal dimensions.
#[derive(Debug, Clone)]
pub struct StackAccumulator {
    width: usize,
    height: usize,
    sum: Vec<f64>,
    count: usize,
}

impl StackAccumulator {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            sum: vec![0.0; width * height],
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn check_size(&self, width: usize, height: usize) -> Result<(), StackingError> {
        if width != self.width || height != self.height {
            return Err(StackingError::DimensionMismatch {
                width,
                height,
                expected_width: self.width,
                expected_height: self.height,
            });
        }
        Ok(())
    }

    pub fn add(&mut self, frame: &ChannelFrame) -> Result<(), StackingError> {
        self.check_size(frame.width(), frame.height())?;
        self.sum
            .par_chunks_mut(ACCUMULATE_CHUNK_SIZE)
            .zip(frame.pixels().par_chunks(ACCUMULATE_CHUNK_SIZE))
            .for_each(|(sum, pixels)| {
                for (s, &p) in sum.iter_mut().zip(pixels) {
                    *s += f64::from(p);
                }
            });
        self.count += 1;
        Ok(())
    }

    /// Adds the partial sum of `other`.
    pub fn merge(&mut self, other: &StackAccumulator) -> Result<(), StackingError> {
        self.check_size(other.width, other.height)?;
        for (s, o) in self.sum.iter_mut().zip(&other.sum) {
            *s += o;
        }
        self.count += other.count;
        Ok(())
    }

    /// Per-pixel mean, optionally rescaled so its maximum is 1.
    pub fn finish(
        self,
        channel: Channel,
        normalize_after: bool,
    ) -> Result<ChannelFrame, StackingError> {
        if self.count == 0 {
            return Err(StackingError::EmptyStack {
                channel,
                skipped: Vec::new(),
            });
        }
        let inv_count = 1.0 / self.count as f64;
        let mean = ChannelFrame::from_fn(self.width, self.height, |x, y| {
            (self.sum[y * self.width + x] * inv_count) as f32
        });
        Ok(if normalize_after {
            normalize_to_unit_max(&mean)
        } else {
            mean
        })
    }
}

/// Mean of the aligned frames of one channel.
#[derive(Debug)]
pub struct ChannelStack {
    pub channel: Channel,
    pub frame: ChannelFrame,
    /// Number of frames in the mean, at least 1.
    pub frame_count: usize,
    pub skipped: Vec<Skip>,
}

/// Accumulates `results` in order. Skips are logged and kept.
pub fn stack_results(
    channel: Channel,
    results: impl IntoIterator<Item = AlignmentResult>,
    normalize_after: bool,
) -> Result<ChannelStack, StackingError> {
    let mut accumulator: Option<StackAccumulator> = None;
    let mut skipped = Vec::new();

    for result in results {
        let skip = match result {
            AlignmentResult::Aligned { id, frame, .. } => {
                let acc = accumulator
                    .get_or_insert_with(|| StackAccumulator::new(frame.width(), frame.height()));
                match acc.add(&frame) {
                    Ok(()) => continue,
                    Err(_) => Skip::new(
                        id,
                        RegistrationError::DimensionMismatch {
                            width: frame.width(),
                            height: frame.height(),
                            reference_width: acc.width,
                            reference_height: acc.height,
                        },
                    ),
                }
            }
            AlignmentResult::Skipped(skip) => skip,
        };
        tracing::warn!(
            channel = %channel,
            frame = %skip.id,
            reason = %skip.reason,
            "Frame skipped"
        );
        skipped.push(skip);
    }

    let Some(accumulator) = accumulator else {
        return Err(StackingError::EmptyStack { channel, skipped });
    };
    let frame_count = accumulator.count();
    let frame = accumulator.finish(channel, normalize_after)?;

    tracing::info!(
        channel = %channel,
        frames = frame_count,
        skipped = skipped.len(),
        "Channel stacked"
    );

    Ok(ChannelStack {
        channel,
        frame,
        frame_count,
        skipped,
    })
}

//! Per-channel stacking and hierarchical merge into an RGB composite.
//!
//! Each channel batch is normalized, registered to its reference and
//! averaged. The red stack then serves as the reference for aligning the
//! green and blue stacks, and the three planes form the composite.

#[cfg(test)]
mod tests;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::frame::{Channel, ChannelBatch, ChannelFrame, FrameId};
use crate::normalize::normalize_min_max;
use crate::reference::{rank_by_mean, select_reference};
use crate::registration::{
    AlignmentResult, PointPatternStrategy, PreparedReference, RegistrationError,
    RegistrationStrategy, Skip, Transform, register_frame, warp,
};
use crate::stacking::{ChannelStack, StackingError, stack_results};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(
        "{channel} plane is {width}x{height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        channel: Channel,
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    /// Recorded on the composite when a plane keeps its unaligned data.
    #[error("{channel} plane could not be aligned: {source}")]
    CrossChannelAlignmentFailure {
        channel: Channel,
        source: RegistrationError,
    },
}

/// How a composite plane relates to the composite's reference plane.
#[derive(Debug)]
pub enum PlaneAlignment {
    Reference,
    Aligned { transform: Transform },
    /// Alignment failed and the plane was used as is.
    Unaligned { failure: MergeError },
}

impl PlaneAlignment {
    pub fn is_fallback(&self) -> bool {
        matches!(self, PlaneAlignment::Unaligned { .. })
    }
}

/// Three planes of equal size in red, green, blue order.
#[derive(Debug)]
pub struct CompositeImage {
    planes: [ChannelFrame; 3],
    alignment: [PlaneAlignment; 3],
}

impl CompositeImage {
    pub fn new(
        planes: [ChannelFrame; 3],
        alignment: [PlaneAlignment; 3],
    ) -> Result<Self, MergeError> {
        check_sizes(planes.each_ref())?;
        Ok(Self { planes, alignment })
    }

    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    pub fn plane(&self, channel: Channel) -> &ChannelFrame {
        &self.planes[channel_index(channel)]
    }

    pub fn alignment(&self, channel: Channel) -> &PlaneAlignment {
        &self.alignment[channel_index(channel)]
    }

    /// Largest finite sample over all planes, 0 if there is none.
    pub fn global_max(&self) -> f32 {
        self.planes
            .iter()
            .flat_map(|p| p.pixels().iter())
            .filter(|v| v.is_finite())
            .fold(0.0f32, |m, &v| m.max(v))
    }

    /// Interleaved RGB bytes, all planes scaled by the same factor so the
    /// global maximum becomes 255.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let max = self.global_max();
        let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
        let [r, g, b] = &self.planes;
        r.pixels()
            .iter()
            .zip(g.pixels())
            .zip(b.pixels())
            .flat_map(|((&r, &g), &b)| [r, g, b])
            .map(|v| (v * scale).round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}

fn channel_index(channel: Channel) -> usize {
    match channel {
        Channel::Red => 0,
        Channel::Green => 1,
        Channel::Blue => 2,
    }
}

fn check_sizes(planes: [&ChannelFrame; 3]) -> Result<(), MergeError> {
    let (expected_width, expected_height) = (planes[0].width(), planes[0].height());
    for (plane, channel) in planes.into_iter().zip(Channel::ALL) {
        if plane.width() != expected_width || plane.height() != expected_height {
            return Err(MergeError::DimensionMismatch {
                channel,
                width: plane.width(),
                height: plane.height(),
                expected_width,
                expected_height,
            });
        }
    }
    Ok(())
}

/// Alignment target of a channel batch.
#[derive(Debug, Clone)]
pub enum ReferenceChoice {
    /// Frame with the highest normalized mean.
    Brightest,
    /// A given frame. If the batch contains a frame with the same id, that
    /// member is the reference and contributes to the stack; otherwise the
    /// frame is only the alignment target.
    Frame { id: FrameId, frame: ChannelFrame },
}

/// Registers a batch against its reference and averages the aligned frames.
///
/// Frames that cannot be registered are skipped. The reference is passed
/// through with the identity transform. With [`ReferenceChoice::Brightest`]
/// a frame the strategy cannot use as reference is skipped and the next
/// brightest is tried. If no usable reference remains, every frame is
/// skipped and the result is [`StackingError::EmptyStack`].
pub fn stack_batch(
    batch: ChannelBatch,
    reference: ReferenceChoice,
    config: &PipelineConfig,
) -> Result<ChannelStack, StackingError> {
    let channel = batch.channel;
    if batch.is_empty() {
        let skipped = batch.skipped.into_iter().map(AlignmentResult::Skipped);
        return stack_results(channel, skipped, config.normalize_after_stack);
    }

    let normalized: Vec<ChannelFrame> = batch
        .frames
        .par_iter()
        .map(|(_, frame)| normalize_min_max(frame))
        .collect();

    let strategy = config.strategy.build(&config.ecc, &config.point_pattern);
    let BatchReference {
        member,
        id: reference_id,
        prepared,
        rejected,
    } = match choose_reference(strategy.as_ref(), reference, &batch, &normalized) {
        Ok(reference) => reference,
        Err(skipped) => {
            let results = batch
                .skipped
                .into_iter()
                .chain(skipped)
                .map(AlignmentResult::Skipped);
            return stack_results(channel, results, config.normalize_after_stack);
        }
    };

    tracing::info!(
        channel = %channel,
        reference = %reference_id,
        in_batch = member.is_some(),
        rejected_candidates = rejected.len(),
        strategy = strategy.name(),
        frames = batch.len(),
        "Registering batch"
    );

    let mut rejections: Vec<Option<RegistrationError>> = vec![None; batch.len()];
    for (index, error) in rejected {
        rejections[index] = Some(error);
    }

    let aligned: Vec<AlignmentResult> = batch
        .frames
        .into_par_iter()
        .zip(normalized.into_par_iter())
        .zip(rejections.into_par_iter())
        .enumerate()
        .map(
            |(index, (((id, original), normalized), rejection))| match rejection {
                Some(error) => AlignmentResult::Skipped(Skip::new(id, error)),
                None if Some(index) == member => AlignmentResult::reference(id, original),
                None => register_frame(&*prepared, id, &original, &normalized),
            },
        )
        .collect();

    let results = batch
        .skipped
        .into_iter()
        .map(AlignmentResult::Skipped)
        .chain(aligned);
    stack_results(channel, results, config.normalize_after_stack)
}

/// Reference prepared for one batch.
struct BatchReference<'s> {
    /// Index of the reference in the batch, `None` for an external frame.
    member: Option<usize>,
    id: FrameId,
    prepared: Box<dyn PreparedReference + 's>,
    /// Brighter candidates the strategy could not use, by batch index.
    rejected: Vec<(usize, RegistrationError)>,
}

/// Prepares the batch reference. When none can be prepared, returns a skip
/// for every frame of the batch.
fn choose_reference<'s>(
    strategy: &'s dyn RegistrationStrategy,
    choice: ReferenceChoice,
    batch: &ChannelBatch,
    normalized: &[ChannelFrame],
) -> Result<BatchReference<'s>, Vec<Skip>> {
    let channel = batch.channel;
    match choice {
        ReferenceChoice::Brightest => {
            let mut rejected = Vec::new();
            for index in rank_by_mean(normalized) {
                let id = &batch.frames[index].0;
                match strategy.prepare(&normalized[index]) {
                    Ok(prepared) => {
                        return Ok(BatchReference {
                            member: Some(index),
                            id: id.clone(),
                            prepared,
                            rejected,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(
                            channel = %channel,
                            frame = %id,
                            %error,
                            "Reference candidate is unusable, trying the next brightest frame"
                        );
                        rejected.push((index, error));
                    }
                }
            }

            tracing::warn!(channel = %channel, "No frame is usable as reference, skipping the batch");
            rejected.sort_by_key(|(index, _)| *index);
            Err(rejected
                .into_iter()
                .map(|(index, error)| Skip::new(batch.frames[index].0.clone(), error))
                .collect())
        }
        ReferenceChoice::Frame { id, frame } => {
            let member = batch.position(&id);
            let prepared = match member {
                Some(index) => strategy.prepare(&normalized[index]),
                None => strategy.prepare(&normalize_min_max(&frame)),
            };
            match prepared {
                Ok(prepared) => Ok(BatchReference {
                    member,
                    id,
                    prepared,
                    rejected: Vec::new(),
                }),
                Err(error) => {
                    tracing::warn!(
                        channel = %channel,
                        reference = %id,
                        %error,
                        "Reference frame is unusable, skipping the batch"
                    );
                    Err(batch
                        .frames
                        .iter()
                        .map(|(frame_id, _)| Skip::new(frame_id.clone(), error.clone()))
                        .collect())
                }
            }
        }
    }
}

/// Aligns `moving` to the prepared reference, falling back to the unaligned
/// frame on failure.
fn align_plane(
    reference: Result<&dyn PreparedReference, &RegistrationError>,
    channel: Channel,
    original: ChannelFrame,
    normalized: &ChannelFrame,
) -> (ChannelFrame, PlaneAlignment) {
    let result = reference
        .map_err(Clone::clone)
        .and_then(|target| target.estimate(normalized));
    match result {
        Ok(transform) => {
            tracing::info!(channel = %channel, %transform, "Plane aligned");
            let warped = warp(&original, &transform);
            (warped, PlaneAlignment::Aligned { transform })
        }
        Err(source) => {
            let failure = MergeError::CrossChannelAlignmentFailure { channel, source };
            tracing::warn!(%failure, "Using unaligned plane");
            (original, PlaneAlignment::Unaligned { failure })
        }
    }
}

/// Aligns the green and blue stacks to the red stack with star-pattern
/// matching and assembles the composite.
pub fn merge_channels(
    stacks: [ChannelStack; 3],
    config: &PipelineConfig,
) -> Result<CompositeImage, MergeError> {
    let [red, green, blue] = stacks.map(|stack| stack.frame);
    check_sizes([&red, &green, &blue])?;

    let strategy = PointPatternStrategy::new(config.cross_channel.clone());
    let prepared = strategy.prepare(&normalize_min_max(&red));
    if let Err(error) = &prepared {
        tracing::warn!(%error, "Red stack is unusable as cross-channel reference");
    }
    let target = prepared.as_ref().map(Box::as_ref);

    let green_normalized = normalize_min_max(&green);
    let (green, green_alignment) = align_plane(target, Channel::Green, green, &green_normalized);
    let blue_normalized = normalize_min_max(&blue);
    let (blue, blue_alignment) = align_plane(target, Channel::Blue, blue, &blue_normalized);

    CompositeImage::new(
        [red, green, blue],
        [PlaneAlignment::Reference, green_alignment, blue_alignment],
    )
}

/// Builds a composite from three single exposures.
///
/// The planes are normalized, the brightest becomes the reference and the
/// other two are aligned to it with `config.compose_strategy`.
pub fn compose_channels(
    frames: [ChannelFrame; 3],
    config: &PipelineConfig,
) -> Result<CompositeImage, MergeError> {
    check_sizes(frames.each_ref())?;
    let normalized = frames.map(|frame| normalize_min_max(&frame));
    let reference = select_reference(&normalized).unwrap_or(0);

    let strategy = config
        .compose_strategy
        .build(&config.ecc, &config.point_pattern);
    tracing::info!(
        reference = %Channel::ALL[reference],
        strategy = strategy.name(),
        "Composing channels"
    );
    let prepared = strategy.prepare(&normalized[reference]);
    let target = prepared.as_ref().map(Box::as_ref);

    let [red, green, blue]: [(ChannelFrame, PlaneAlignment); 3] = std::array::from_fn(|index| {
        let plane = &normalized[index];
        if index == reference {
            (plane.clone(), PlaneAlignment::Reference)
        } else {
            align_plane(target, Channel::ALL[index], plane.clone(), plane)
        }
    });
    CompositeImage::new([red.0, green.0, blue.0], [red.1, green.1, blue.1])
}

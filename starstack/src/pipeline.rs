//! File-level runs: single-batch stacking, the three-channel merge and
//! channel composition.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::PipelineConfig;
use crate::frame::{Channel, FrameId};
use crate::io::{
    LoadError, WriteError, list_files, load_batch, load_frame, write_composite, write_fits,
};
use crate::merge::{
    CompositeImage, MergeError, PlaneAlignment, ReferenceChoice, compose_channels, merge_channels,
    stack_batch,
};
use crate::registration::Skip;
use crate::stacking::{ChannelStack, StackingError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("no frame could be stacked for {}", failed_channels(.channels))]
    Stacking { channels: Vec<ChannelReport> },

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

fn failed_channels(channels: &[ChannelReport]) -> String {
    channels
        .iter()
        .filter(|report| report.failed())
        .map(|report| report.channel.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where the frames of one channel come from.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub source: PathBuf,
    /// Alignment target. A path inside `source` makes that frame the
    /// reference; any other path is used only as the target.
    pub reference: Option<PathBuf>,
}

impl BatchInput {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<PathBuf>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Stacking outcome of one channel.
#[derive(Debug)]
pub struct ChannelReport {
    pub channel: Channel,
    /// Frames in the mean, 0 if the channel could not be stacked.
    pub frame_count: usize,
    pub skipped: Vec<Skip>,
    /// Set when the source directory or the reference could not be read.
    pub load_error: Option<LoadError>,
}

impl ChannelReport {
    pub fn failed(&self) -> bool {
        self.frame_count == 0
    }

    fn load_failed(channel: Channel, error: LoadError) -> Self {
        Self {
            channel,
            frame_count: 0,
            skipped: Vec::new(),
            load_error: Some(error),
        }
    }

    /// Splits a stacking outcome into its report and the stack, if any.
    fn settle(
        channel: Channel,
        outcome: Result<ChannelStack, StackingError>,
    ) -> (Self, Option<ChannelStack>) {
        let report = |frame_count, skipped| Self {
            channel,
            frame_count,
            skipped,
            load_error: None,
        };
        match outcome {
            Ok(mut stack) => {
                let skipped = std::mem::take(&mut stack.skipped);
                (report(stack.frame_count, skipped), Some(stack))
            }
            Err(StackingError::EmptyStack { skipped, .. }) => (report(0, skipped), None),
            Err(StackingError::DimensionMismatch { .. }) => (report(0, Vec::new()), None),
        }
    }
}

impl fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.load_error {
            write!(f, "{}: not loaded, {error}", self.channel)
        } else if self.failed() {
            write!(f, "{}: not stacked, {} skipped", self.channel, self.skipped.len())
        } else {
            write!(
                f,
                "{}: {} frames stacked, {} skipped",
                self.channel,
                self.frame_count,
                self.skipped.len()
            )
        }
    }
}

#[derive(Debug)]
pub struct StackReport {
    pub output: PathBuf,
    pub channel: ChannelReport,
}

#[derive(Debug)]
pub struct RunReport {
    pub output: PathBuf,
    /// Red, green, blue.
    pub channels: [ChannelReport; 3],
    /// Planes kept unaligned because cross-channel registration failed.
    pub fallbacks: Vec<Channel>,
}

#[derive(Debug)]
pub struct ComposeReport {
    pub output: PathBuf,
    pub reference: Channel,
    pub fallbacks: Vec<Channel>,
}

/// Stacks one directory of frames and writes the mean as FITS.
///
/// Nothing is written when no frame could be stacked.
pub fn run_stack(
    channel: Channel,
    input: &BatchInput,
    output: &Path,
    config: &PipelineConfig,
) -> Result<StackReport, PipelineError> {
    let outcome = stack_channel(channel, input, config)?;
    let (report, stack) = ChannelReport::settle(channel, outcome);
    let Some(stack) = stack else {
        return Err(PipelineError::Stacking {
            channels: vec![report],
        });
    };

    write_fits(&stack.frame, output)?;
    tracing::info!(output = %output.display(), %report, "Stack written");
    Ok(StackReport {
        output: output.to_path_buf(),
        channel: report,
    })
}

/// Stacks three channel batches in parallel, merges the stacks and writes
/// the 8-bit composite.
///
/// A channel that could not be loaded or has no stackable frame aborts the
/// run before anything is written; the error still carries every channel's
/// report.
pub fn run_pipeline(
    inputs: &[BatchInput; 3],
    output: &Path,
    config: &PipelineConfig,
) -> Result<RunReport, PipelineError> {
    let [red, green, blue] = inputs;
    let (red, (green, blue)) = rayon::join(
        || stack_channel(Channel::Red, red, config),
        || {
            rayon::join(
                || stack_channel(Channel::Green, green, config),
                || stack_channel(Channel::Blue, blue, config),
            )
        },
    );
    let settled = [
        (Channel::Red, red),
        (Channel::Green, green),
        (Channel::Blue, blue),
    ]
    .map(|(channel, outcome)| match outcome {
        Ok(outcome) => ChannelReport::settle(channel, outcome),
        Err(error) => {
            tracing::warn!(channel = %channel, %error, "Channel could not be loaded");
            (ChannelReport::load_failed(channel, error), None)
        }
    });
    let [(red_report, red), (green_report, green), (blue_report, blue)] = settled;
    let channels = [red_report, green_report, blue_report];

    let (Some(red), Some(green), Some(blue)) = (red, green, blue) else {
        return Err(PipelineError::Stacking {
            channels: channels.into(),
        });
    };
    let stacks = [red, green, blue];

    let composite = merge_channels(stacks, config)?;
    write_composite(&composite, output)?;
    let fallbacks = fallback_planes(&composite);
    tracing::info!(
        output = %output.display(),
        fallbacks = fallbacks.len(),
        "Composite written"
    );
    Ok(RunReport {
        output: output.to_path_buf(),
        channels,
        fallbacks,
    })
}

/// Aligns three single exposures, red, green and blue, and writes the
/// 8-bit composite.
pub fn run_compose(
    frames: &[PathBuf; 3],
    output: &Path,
    config: &PipelineConfig,
) -> Result<ComposeReport, PipelineError> {
    let [red, green, blue] = frames;
    let frames = [load_frame(red)?, load_frame(green)?, load_frame(blue)?];
    let composite = compose_channels(frames, config)?;
    write_composite(&composite, output)?;

    let reference = Channel::ALL
        .into_iter()
        .find(|&c| matches!(composite.alignment(c), PlaneAlignment::Reference))
        .unwrap_or(Channel::Red);
    let fallbacks = fallback_planes(&composite);
    tracing::info!(
        output = %output.display(),
        reference = %reference,
        fallbacks = fallbacks.len(),
        "Composite written"
    );
    Ok(ComposeReport {
        output: output.to_path_buf(),
        reference,
        fallbacks,
    })
}

fn fallback_planes(composite: &CompositeImage) -> Vec<Channel> {
    Channel::ALL
        .into_iter()
        .filter(|&c| composite.alignment(c).is_fallback())
        .collect()
}

/// Lists, loads and stacks one channel. Only a missing source directory or
/// an unreadable reference is an error here; everything else is a skip.
fn stack_channel(
    channel: Channel,
    input: &BatchInput,
    config: &PipelineConfig,
) -> Result<Result<ChannelStack, StackingError>, LoadError> {
    let paths = list_files(&input.source, &config.pattern)?;
    tracing::info!(
        channel = %channel,
        source = %input.source.display(),
        pattern = %config.pattern,
        files = paths.len(),
        "Stacking channel"
    );
    let reference = match &input.reference {
        Some(path) => reference_frame(path, &paths)?,
        None => ReferenceChoice::Brightest,
    };
    let batch = load_batch(channel, &paths);
    Ok(stack_batch(batch, reference, config))
}

/// Loads an explicit reference. If it is one of `members`, the member's id
/// is used so the batch recognizes it.
fn reference_frame(path: &Path, members: &[PathBuf]) -> Result<ReferenceChoice, LoadError> {
    let frame = load_frame(path)?;
    let canonical = std::fs::canonicalize(path).ok();
    let member = canonical.as_ref().and_then(|canonical| {
        members
            .iter()
            .find(|member| std::fs::canonicalize(member).ok().as_ref() == Some(canonical))
    });
    let id = FrameId::from(member.map_or(path, PathBuf::as_path));
    Ok(ReferenceChoice::Frame { id, frame })
}

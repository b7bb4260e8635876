//! Channel frames, channel identities and batches.

use std::fmt;
use std::path::{Path, PathBuf};

use common::Buffer2;
use serde::{Deserialize, Serialize};

use crate::registration::Skip;

/// A single intensity plane.
pub type ChannelFrame = Buffer2<f32>;

/// Color/filter identity of a batch or a composite plane.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// Composite plane order.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];
}

/// Identifies a frame in skip reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameId {
    Path(PathBuf),
    Label(String),
}

impl FrameId {
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Label(_) => None,
        }
    }
}

impl From<PathBuf> for FrameId {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for FrameId {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Frames of one channel, in load order.
///
/// Frames that could not be loaded are carried in `skipped` so they show up
/// in the channel's skip accounting.
#[derive(Debug)]
pub struct ChannelBatch {
    pub channel: Channel,
    pub frames: Vec<(FrameId, ChannelFrame)>,
    pub skipped: Vec<Skip>,
}

impl ChannelBatch {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            frames: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Builds a batch from in-memory frames labelled `"<channel> frame <i>"`.
    pub fn from_frames(channel: Channel, frames: Vec<ChannelFrame>) -> Self {
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| (FrameId::label(format!("{channel} frame {i}")), frame))
            .collect();
        Self {
            channel,
            frames,
            skipped: Vec::new(),
        }
    }

    pub fn push(&mut self, id: FrameId, frame: ChannelFrame) {
        self.frames.push((id, frame));
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn position(&self, id: &FrameId) -> Option<usize> {
        self.frames.iter().position(|(frame_id, _)| frame_id == id)
    }
}

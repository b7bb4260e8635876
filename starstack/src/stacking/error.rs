//! Error types for stacking.

use thiserror::Error;

use crate::frame::Channel;
use crate::registration::Skip;

#[derive(Debug, Error)]
pub enum StackingError {
    #[error("no {channel} frame could be stacked ({} skipped)", skipped.len())]
    EmptyStack { channel: Channel, skipped: Vec<Skip> },

    #[error("frame is {width}x{height}, stack is {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },
}

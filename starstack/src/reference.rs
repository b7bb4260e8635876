//! Reference frame selection.

use crate::frame::ChannelFrame;
use crate::math::statistics::mean_finite;

/// Picks the frame with the highest mean intensity.
///
/// Ties resolve to the earliest frame. Frames without finite samples rank
/// last. Returns `None` for an empty batch.
pub fn select_reference<'a>(frames: impl IntoIterator<Item = &'a ChannelFrame>) -> Option<usize> {
    rank_by_mean(frames).first().copied()
}

/// Frame indices ordered by descending mean intensity, ties by index.
///
/// Frames without finite samples come last.
pub fn rank_by_mean<'a>(frames: impl IntoIterator<Item = &'a ChannelFrame>) -> Vec<usize> {
    let means: Vec<f64> = frames
        .into_iter()
        .map(|frame| mean_finite(frame.pixels()).unwrap_or(f64::NEG_INFINITY))
        .collect();
    let mut order: Vec<usize> = (0..means.len()).collect();
    // Stable sort keeps equal means in batch order.
    order.sort_by(|&a, &b| means[b].total_cmp(&means[a]));
    order
}

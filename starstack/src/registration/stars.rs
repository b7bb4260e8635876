//! Point source detection for star-pattern registration.

use glam::DVec2;

use crate::frame::ChannelFrame;
use crate::math::statistics::median_and_sigma;
use crate::registration::config::StarDetectionConfig;

/// A detected point source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Star {
    /// Intensity-weighted centroid.
    pub pos: DVec2,
    /// Background-subtracted sum over the centroid window.
    pub flux: f64,
    pub peak: f32,
}

/// Detects local maxima that stand out from the background, brightest first.
///
/// The background is the frame median and the noise is the MAD-derived
/// sigma. A candidate must exceed `background + detection_sigma * noise` and
/// dominate its `(2r+1)^2` neighbourhood; on equal values the first pixel in
/// scan order wins.
pub fn detect_stars(frame: &ChannelFrame, config: &StarDetectionConfig) -> Vec<Star> {
    let Some((background, noise)) = median_and_sigma(frame.pixels()) else {
        return Vec::new();
    };
    let threshold = background + config.detection_sigma * noise;
    let width = frame.width();
    let height = frame.height();
    let r = config.peak_radius;

    let mut stars = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let v = *frame.get(x, y);
            if !(v > threshold) || !is_local_peak(frame, x, y, r) {
                continue;
            }
            if let Some(star) = centroid(frame, x, y, config.centroid_radius, background) {
                stars.push(star);
            }
        }
    }

    stars.sort_by(|a, b| b.flux.total_cmp(&a.flux));
    stars.truncate(config.max_stars);
    stars
}

fn is_local_peak(frame: &ChannelFrame, x: usize, y: usize, r: usize) -> bool {
    let v = *frame.get(x, y);
    let own = frame.width() * y + x;
    let y_range = y.saturating_sub(r)..=(y + r).min(frame.height() - 1);
    for ny in y_range {
        for nx in x.saturating_sub(r)..=(x + r).min(frame.width() - 1) {
            let n = *frame.get(nx, ny);
            let index = frame.width() * ny + nx;
            if n > v || (n == v && index < own) {
                return false;
            }
        }
    }
    true
}

fn centroid(
    frame: &ChannelFrame,
    x: usize,
    y: usize,
    radius: usize,
    background: f32,
) -> Option<Star> {
    let mut flux = 0.0f64;
    let mut weighted = DVec2::ZERO;
    for ny in y.saturating_sub(radius)..=(y + radius).min(frame.height() - 1) {
        for nx in x.saturating_sub(radius)..=(x + radius).min(frame.width() - 1) {
            let w = f64::from(*frame.get(nx, ny) - background);
            if w > 0.0 && w.is_finite() {
                flux += w;
                weighted += DVec2::new(nx as f64, ny as f64) * w;
            }
        }
    }
    (flux > 0.0).then(|| Star {
        pos: weighted / flux,
        flux,
        peak: *frame.get(x, y),
    })
}

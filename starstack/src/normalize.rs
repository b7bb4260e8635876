//! Intensity rescaling.

use crate::frame::ChannelFrame;
use crate::math::statistics::min_max_finite;

/// Min-max normalization to `[0, 1]`.
///
/// The smallest finite sample maps to exactly 0.0 and the largest to exactly
/// 1.0. Non-finite samples map to 0.0. A constant frame (or one without any
/// finite sample) becomes all zeros.
pub fn normalize_min_max(frame: &ChannelFrame) -> ChannelFrame {
    let Some((min, max)) = min_max_finite(frame.pixels()) else {
        return frame.map(|_| 0.0);
    };
    if max <= min {
        return frame.map(|_| 0.0);
    }

    let min = f64::from(min);
    let range = f64::from(max) - min;
    frame.map(|&v| {
        if v.is_finite() {
            ((f64::from(v) - min) / range) as f32
        } else {
            0.0
        }
    })
}

/// Rescales so the largest finite sample equals 1.0.
///
/// Frames whose maximum is not positive are returned unchanged.
pub fn normalize_to_unit_max(frame: &ChannelFrame) -> ChannelFrame {
    let Some((_, max)) = min_max_finite(frame.pixels()) else {
        return frame.clone();
    };
    if max <= 0.0 {
        return frame.clone();
    }
    let max = f64::from(max);
    frame.map(|&v| (f64::from(v) / max) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Buffer2;

    fn frame(pixels: Vec<f32>) -> ChannelFrame {
        let width = pixels.len();
        Buffer2::new(width, 1, pixels).unwrap()
    }

    #[test]
    fn min_max_hits_exact_bounds() {
        let input = frame(vec![-1200.0, 37.5, 65535.0, 12.25, 999.0]);
        let out = normalize_min_max(&input);
        let (min, max) = min_max_finite(out.pixels()).unwrap();
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
        assert!(out.pixels().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn min_max_of_tiny_range() {
        let input = frame(vec![1.0, 1.0 + f32::EPSILON, 1.0]);
        let out = normalize_min_max(&input);
        assert_eq!(out.pixels(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn constant_input_becomes_zeros() {
        let out = normalize_min_max(&frame(vec![42.0; 6]));
        assert!(out.pixels().iter().all(|&v| v == 0.0));
        let again = normalize_min_max(&frame(vec![42.0; 6]));
        assert_eq!(out, again);
    }

    #[test]
    fn non_finite_samples_map_to_zero() {
        let out = normalize_min_max(&frame(vec![f32::NAN, 2.0, 4.0, f32::INFINITY]));
        assert_eq!(out.pixels(), &[0.0, 0.0, 1.0, 0.0]);

        let all_nan = normalize_min_max(&frame(vec![f32::NAN; 3]));
        assert!(all_nan.pixels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn unit_max_rescale() {
        let out = normalize_to_unit_max(&frame(vec![0.5, 2.0, -1.0]));
        assert_eq!(out.pixels(), &[0.25, 1.0, -0.5]);

        let dark = frame(vec![-3.0, -1.0]);
        assert_eq!(normalize_to_unit_max(&dark), dark);
    }
}

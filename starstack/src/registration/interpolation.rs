//! Bilinear sampling and inverse-mapped warping.

use glam::DVec2;
use rayon::prelude::*;

use crate::frame::ChannelFrame;
use crate::registration::transform::Transform;

/// Bilinear sample at sub-pixel position `(x, y)`.
///
/// Pixel centres sit on integer coordinates. Neighbours outside the frame
/// contribute 0, so samples fade out across the last pixel of the border.
#[inline]
pub fn sample_bilinear(frame: &ChannelFrame, x: f64, y: f64) -> f32 {
    let w = frame.width() as f64;
    let h = frame.height() as f64;
    // Also rejects NaN.
    if !(x > -1.0 && y > -1.0 && x < w && y < h) {
        return 0.0;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let pixel = |px: i64, py: i64| -> f64 {
        if px < 0 || py < 0 || px >= frame.width() as i64 || py >= frame.height() as i64 {
            0.0
        } else {
            f64::from(*frame.get(px as usize, py as usize))
        }
    };

    let mut value = (1.0 - fx) * (1.0 - fy) * pixel(x0, y0);
    if fx > 0.0 {
        value += fx * (1.0 - fy) * pixel(x0 + 1, y0);
    }
    if fy > 0.0 {
        value += (1.0 - fx) * fy * pixel(x0, y0 + 1);
        if fx > 0.0 {
            value += fx * fy * pixel(x0 + 1, y0 + 1);
        }
    }
    value as f32
}

/// Resamples `frame` onto the reference grid.
///
/// Every output pixel `p` takes the bilinear sample of `frame` at
/// `transform.apply(p)`. The output has the same shape as the input.
pub fn warp(frame: &ChannelFrame, transform: &Transform) -> ChannelFrame {
    let width = frame.width();
    let height = frame.height();
    let mut out = ChannelFrame::new_default(width, height);
    if width == 0 {
        return out;
    }

    out.pixels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, value) in row.iter_mut().enumerate() {
                let src = transform.apply(DVec2::new(x as f64, y as f64));
                *value = sample_bilinear(frame, src.x, src.y);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Buffer2;

    fn ramp(width: usize, height: usize) -> ChannelFrame {
        Buffer2::from_fn(width, height, |x, y| (x as f32) * 0.5 + (y as f32) * 2.0 + 1.0)
    }

    #[test]
    fn integer_positions_are_exact() {
        let frame = ramp(5, 4);
        assert_eq!(sample_bilinear(&frame, 2.0, 3.0), *frame.get(2, 3));
        assert_eq!(sample_bilinear(&frame, 4.0, 3.0), *frame.get(4, 3));
    }

    #[test]
    fn interpolates_linear_ramp() {
        let frame = ramp(6, 6);
        let v = sample_bilinear(&frame, 1.25, 2.5);
        assert!((v - (1.25 * 0.5 + 2.5 * 2.0 + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn outside_is_zero() {
        let frame = ramp(4, 4);
        assert_eq!(sample_bilinear(&frame, -1.5, 1.0), 0.0);
        assert_eq!(sample_bilinear(&frame, 1.0, 4.0), 0.0);
        assert_eq!(sample_bilinear(&frame, f64::NAN, 1.0), 0.0);
        // Half way past the last column blends with the zero border.
        let edge = sample_bilinear(&frame, 3.5, 0.0);
        assert!((edge - frame.get(3, 0) * 0.5).abs() < 1e-6);
    }

    #[test]
    fn identity_warp_reproduces_frame() {
        let frame = ramp(9, 7);
        assert_eq!(warp(&frame, &Transform::identity()), frame);
    }

    #[test]
    fn translation_warp_shifts_content() {
        let frame = ramp(8, 8);
        let shifted = warp(&frame, &Transform::translation(DVec2::new(2.0, 1.0)));
        assert_eq!(*shifted.get(0, 0), *frame.get(2, 1));
        assert_eq!(*shifted.get(5, 6), *frame.get(7, 7));
        assert_eq!(*shifted.get(7, 7), 0.0);
    }
}

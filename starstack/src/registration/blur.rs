//! 5x5 Gaussian pre-blur used before correlation optimization.

use rayon::prelude::*;

use crate::frame::ChannelFrame;

/// Separable binomial approximation of a Gaussian with sigma ~1.1.
const KERNEL_5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Reflect-101 border index (`gfedcb|abcdefgh|gfedcba`).
#[inline]
fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}

/// Applies the 5x5 Gaussian kernel with reflect-101 borders.
pub fn gaussian_blur_5x5(frame: &ChannelFrame) -> ChannelFrame {
    let width = frame.width();
    let height = frame.height();
    if frame.is_empty() {
        return frame.clone();
    }

    let mut horizontal = ChannelFrame::new_default(width, height);
    horizontal
        .pixels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let src = frame.row(y);
            for (x, out) in row.iter_mut().enumerate() {
                *out = KERNEL_5
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * src[reflect_101(x as isize + k as isize - 2, width)])
                    .sum();
            }
        });

    let mut blurred = ChannelFrame::new_default(width, height);
    blurred
        .pixels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = KERNEL_5
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        w * *horizontal.get(x, reflect_101(y as isize + k as isize - 2, height))
                    })
                    .sum();
            }
        });
    blurred
}

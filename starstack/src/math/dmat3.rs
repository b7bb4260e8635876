//! Row-major 3x3 matrix of f64 values.

use std::ops::Index;

use glam::DVec2;

/// Row-major 3x3 matrix.
///
/// For 2D homogeneous transforms:
/// ```text
/// | a  b  tx |   | m[0] m[1] m[2] |
/// | c  d  ty | = | m[3] m[4] m[5] |
/// | g  h  1  |   | m[6] m[7] m[8] |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DMat3 {
    data: [f64; 9],
}

impl DMat3 {
    #[inline]
    pub const fn from_array(data: [f64; 9]) -> Self {
        Self { data }
    }

    #[inline]
    pub const fn identity() -> Self {
        Self {
            data: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub const fn as_array(&self) -> &[f64; 9] {
        &self.data
    }

    /// `self * rhs`: applies `rhs` first.
    pub fn mul_mat(&self, rhs: &DMat3) -> DMat3 {
        let a = &self.data;
        let b = &rhs.data;
        let mut out = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        DMat3 { data: out }
    }

    pub fn determinant(&self) -> f64 {
        let d = &self.data;
        d[0] * (d[4] * d[8] - d[5] * d[7]) - d[1] * (d[3] * d[8] - d[5] * d[6])
            + d[2] * (d[3] * d[7] - d[4] * d[6])
    }

    /// Matrix inverse, or `None` if the matrix is singular or not finite.
    pub fn inverse(&self) -> Option<DMat3> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let d = &self.data;
        Some(DMat3 {
            data: [
                (d[4] * d[8] - d[5] * d[7]) * inv_det,
                (d[2] * d[7] - d[1] * d[8]) * inv_det,
                (d[1] * d[5] - d[2] * d[4]) * inv_det,
                (d[5] * d[6] - d[3] * d[8]) * inv_det,
                (d[0] * d[8] - d[2] * d[6]) * inv_det,
                (d[2] * d[3] - d[0] * d[5]) * inv_det,
                (d[3] * d[7] - d[4] * d[6]) * inv_det,
                (d[1] * d[6] - d[0] * d[7]) * inv_det,
                (d[0] * d[4] - d[1] * d[3]) * inv_det,
            ],
        })
    }

    /// Divides every entry by `m[8]` so the matrix is a canonical homography.
    pub fn normalized(&self) -> Option<DMat3> {
        let w = self.data[8];
        if !w.is_finite() || w.abs() < f64::EPSILON {
            return None;
        }
        Some(DMat3 {
            data: self.data.map(|v| v / w),
        })
    }

    /// Applies the matrix as a 2D homogeneous transform.
    ///
    /// Points mapped to infinity come back as NaN.
    #[inline]
    pub fn transform_point(&self, p: DVec2) -> DVec2 {
        let d = &self.data;
        let w = d[6] * p.x + d[7] * p.y + d[8];
        if w.abs() <= f64::EPSILON {
            return DVec2::NAN;
        }
        DVec2::new(
            (d[0] * p.x + d[1] * p.y + d[2]) / w,
            (d[3] * p.x + d[4] * p.y + d[5]) / w,
        )
    }

    /// Frobenius norm of `self - I`.
    pub fn deviation_from_identity(&self) -> f64 {
        let id = Self::identity();
        self.data
            .iter()
            .zip(id.data.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl Index<usize> for DMat3 {
    type Output = f64;

    #[inline]
    fn index(&self, idx: usize) -> &f64 {
        &self.data[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_round_trips_to_identity() {
        let m = DMat3::from_array([1.2, 0.1, 5.0, -0.2, 0.9, -3.0, 1e-4, 2e-4, 1.0]);
        let inv = m.inverse().unwrap();
        assert!(m.mul_mat(&inv).deviation_from_identity() < 1e-12);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let m = DMat3::from_array([1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0]);
        assert!(m.inverse().is_none());
    }

    #[test]
    fn transform_point_applies_projection() {
        let m = DMat3::from_array([2.0, 0.0, 1.0, 0.0, 2.0, -1.0, 0.0, 0.0, 2.0]);
        let p = m.transform_point(DVec2::new(3.0, 4.0));
        assert_eq!(p, DVec2::new(3.5, 3.5));

        let at_infinity = DMat3::from_array([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
        assert!(at_infinity.transform_point(DVec2::ZERO).is_nan());
    }
}

//! Geometric transforms between reference and moving frames.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::math::DMat3;

/// Transformation models with increasing degrees of freedom.
///
/// Variants are ordered by complexity; `compose()` keeps the more complex one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransformType {
    /// dx, dy
    Translation,
    /// dx, dy, angle
    Euclidean,
    /// dx, dy, angle, uniform scale
    Similarity,
    /// Full 2x3 linear part, handles shear and differential scale
    Affine,
    /// 8-parameter projective transform
    Homography,
}

impl TransformType {
    /// Minimum number of point correspondences to estimate this model.
    pub fn min_points(self) -> usize {
        match self {
            TransformType::Translation => 1,
            TransformType::Euclidean | TransformType::Similarity => 2,
            TransformType::Affine => 3,
            TransformType::Homography => 4,
        }
    }
}

/// A 3x3 homogeneous transform.
///
/// `apply` maps a point in REFERENCE (output) coordinates to the matching
/// point in the MOVING (input) frame. Warping a moving frame onto the
/// reference grid samples it at `apply(p)` for every output pixel `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub matrix: DMat3,
    pub transform_type: TransformType,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.translation_components();
        match self.transform_type {
            TransformType::Translation => {
                write!(f, "translation(dx={:.2}, dy={:.2})", t.x, t.y)
            }
            TransformType::Euclidean => write!(
                f,
                "euclidean(dx={:.2}, dy={:.2}, rot={:.3}°)",
                t.x,
                t.y,
                self.rotation_angle().to_degrees()
            ),
            other => write!(
                f,
                "{other}(dx={:.2}, dy={:.2}, rot={:.3}°, scale={:.4})",
                t.x,
                t.y,
                self.rotation_angle().to_degrees(),
                self.scale_factor()
            ),
        }
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: DMat3::identity(),
            transform_type: TransformType::Translation,
        }
    }

    pub fn translation(t: DVec2) -> Self {
        Self {
            matrix: DMat3::from_array([1.0, 0.0, t.x, 0.0, 1.0, t.y, 0.0, 0.0, 1.0]),
            transform_type: TransformType::Translation,
        }
    }

    pub fn euclidean(t: DVec2, angle: f64) -> Self {
        Self {
            transform_type: TransformType::Euclidean,
            ..Self::similarity(t, angle, 1.0)
        }
    }

    pub fn similarity(t: DVec2, angle: f64, scale: f64) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        let (a, b) = (cos_a * scale, sin_a * scale);
        Self {
            matrix: DMat3::from_array([a, -b, t.x, b, a, t.y, 0.0, 0.0, 1.0]),
            transform_type: TransformType::Similarity,
        }
    }

    /// Affine transform from `[a, b, tx, c, d, ty]`.
    pub fn affine(p: [f64; 6]) -> Self {
        Self {
            matrix: DMat3::from_array([p[0], p[1], p[2], p[3], p[4], p[5], 0.0, 0.0, 1.0]),
            transform_type: TransformType::Affine,
        }
    }

    /// Homography from its first 8 row-major entries; the 9th is 1.
    pub fn homography(p: [f64; 8]) -> Self {
        Self {
            matrix: DMat3::from_array([p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], 1.0]),
            transform_type: TransformType::Homography,
        }
    }

    pub fn from_matrix(matrix: DMat3, transform_type: TransformType) -> Self {
        Self {
            matrix,
            transform_type,
        }
    }

    /// Maps a reference-frame point into the moving frame.
    #[inline]
    pub fn apply(&self, p: DVec2) -> DVec2 {
        self.matrix.transform_point(p)
    }

    pub fn inverse(&self) -> Option<Self> {
        Some(Self {
            matrix: self.matrix.inverse()?,
            transform_type: self.transform_type,
        })
    }

    /// `self * other`: applies `other` first.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            matrix: self.matrix.mul_mat(&other.matrix),
            transform_type: self.transform_type.max(other.transform_type),
        }
    }

    pub fn translation_components(&self) -> DVec2 {
        DVec2::new(self.matrix[2], self.matrix[5])
    }

    /// Rotation in radians. Meaningful up to similarity transforms.
    pub fn rotation_angle(&self) -> f64 {
        self.matrix[3].atan2(self.matrix[0])
    }

    /// Uniform scale. Meaningful up to similarity transforms.
    pub fn scale_factor(&self) -> f64 {
        self.matrix[0].hypot(self.matrix[3])
    }

    /// Finite and non-degenerate.
    pub fn is_valid(&self) -> bool {
        let det = self.matrix[0] * self.matrix[4] - self.matrix[1] * self.matrix[3];
        self.matrix.is_finite() && det.abs() > 1e-10
    }

    pub fn deviation_from_identity(&self) -> f64 {
        self.matrix.deviation_from_identity()
    }
}

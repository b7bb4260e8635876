//! Registration configuration.

use serde::{Deserialize, Serialize};

use crate::registration::transform::TransformType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid registration setting '{field}': {reason}")]
pub struct InvalidSetting {
    pub field: &'static str,
    pub reason: String,
}

fn check(ok: bool, field: &'static str, reason: impl FnOnce() -> String) -> Result<(), InvalidSetting> {
    if ok {
        Ok(())
    } else {
        Err(InvalidSetting {
            field,
            reason: reason(),
        })
    }
}

/// Enhanced correlation coefficient optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EccConfig {
    /// Motion model. Similarity is not supported by the optimizer.
    pub motion: TransformType,
    pub max_iterations: usize,
    /// Stop once the correlation changes by less than this between iterations.
    pub epsilon: f64,
    /// Final correlation below this is reported as a convergence failure.
    pub min_correlation: f64,
    /// Apply the 5x5 Gaussian pre-blur to both images.
    pub pre_blur: bool,
}

impl Default for EccConfig {
    fn default() -> Self {
        Self {
            motion: TransformType::Homography,
            max_iterations: 5000,
            epsilon: 1e-10,
            min_correlation: 0.3,
            pre_blur: true,
        }
    }
}

impl EccConfig {
    pub fn validate(&self) -> Result<(), InvalidSetting> {
        check(
            self.motion != TransformType::Similarity,
            "ecc.motion",
            || "similarity motion is not supported by ECC".to_string(),
        )?;
        check(self.max_iterations > 0, "ecc.max_iterations", || {
            "must be positive".to_string()
        })?;
        check(
            self.epsilon > 0.0 && self.epsilon.is_finite(),
            "ecc.epsilon",
            || format!("must be positive, got {}", self.epsilon),
        )?;
        check(
            (-1.0..=1.0).contains(&self.min_correlation),
            "ecc.min_correlation",
            || format!("must be within [-1, 1], got {}", self.min_correlation),
        )
    }
}

/// Point source detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarDetectionConfig {
    /// Detection threshold in noise sigmas above the background.
    pub detection_sigma: f32,
    /// A peak must dominate its `(2r+1)^2` neighbourhood.
    pub peak_radius: usize,
    /// Half-size of the centroid window.
    pub centroid_radius: usize,
    /// Keep only the brightest stars.
    pub max_stars: usize,
}

impl Default for StarDetectionConfig {
    fn default() -> Self {
        Self {
            detection_sigma: 5.0,
            peak_radius: 2,
            centroid_radius: 3,
            max_stars: 200,
        }
    }
}

/// Triangle (asterism) matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleMatchConfig {
    /// Nearest neighbours considered when forming triangles around each star.
    pub neighbours: usize,
    /// Maximum difference of the side-ratio invariants.
    pub ratio_tolerance: f64,
    /// Minimum votes for a star correspondence.
    pub min_votes: u32,
    /// Reject mirrored triangle matches.
    pub check_orientation: bool,
}

impl Default for TriangleMatchConfig {
    fn default() -> Self {
        Self {
            neighbours: 8,
            ratio_tolerance: 0.01,
            min_votes: 3,
            check_orientation: true,
        }
    }
}

/// Robust transform fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Inlier distance in pixels.
    pub inlier_threshold: f64,
    /// Confidence used for adaptive early termination.
    pub confidence: f64,
    pub min_inlier_ratio: f64,
    pub min_inliers: usize,
    pub seed: u64,
    /// Hypotheses with a scale outside this range are discarded.
    pub scale_range: (f64, f64),
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            inlier_threshold: 2.0,
            confidence: 0.995,
            min_inlier_ratio: 0.3,
            min_inliers: 4,
            seed: 0x5eed,
            scale_range: (0.5, 2.0),
        }
    }
}

/// Star-pattern registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointPatternConfig {
    pub transform_type: TransformType,
    /// Fewer stars than this in either frame is a failure.
    pub min_stars: usize,
    /// Maximum RMS residual of the inliers after refinement, in pixels.
    pub max_rms_error: f64,
    pub detection: StarDetectionConfig,
    pub triangles: TriangleMatchConfig,
    pub ransac: RansacConfig,
}

impl Default for PointPatternConfig {
    fn default() -> Self {
        Self {
            transform_type: TransformType::Similarity,
            min_stars: 6,
            max_rms_error: 1.5,
            detection: StarDetectionConfig::default(),
            triangles: TriangleMatchConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl PointPatternConfig {
    pub fn validate(&self) -> Result<(), InvalidSetting> {
        check(self.min_stars >= 3, "point_pattern.min_stars", || {
            format!("at least 3 stars are needed to form a triangle, got {}", self.min_stars)
        })?;
        check(
            self.ransac.min_inliers >= self.transform_type.min_points(),
            "point_pattern.ransac.min_inliers",
            || {
                format!(
                    "{} needs at least {} inliers, got {}",
                    self.transform_type,
                    self.transform_type.min_points(),
                    self.ransac.min_inliers
                )
            },
        )?;
        check(
            self.detection.detection_sigma > 0.0,
            "point_pattern.detection.detection_sigma",
            || "must be positive".to_string(),
        )?;
        check(
            self.detection.max_stars >= self.min_stars,
            "point_pattern.detection.max_stars",
            || "must not be below min_stars".to_string(),
        )?;
        check(
            self.triangles.neighbours >= 2,
            "point_pattern.triangles.neighbours",
            || "at least 2 neighbours are needed".to_string(),
        )?;
        check(
            self.triangles.ratio_tolerance > 0.0 && self.triangles.ratio_tolerance < 1.0,
            "point_pattern.triangles.ratio_tolerance",
            || format!("must be within (0, 1), got {}", self.triangles.ratio_tolerance),
        )?;
        check(
            self.ransac.max_iterations > 0,
            "point_pattern.ransac.max_iterations",
            || "must be positive".to_string(),
        )?;
        check(
            self.ransac.inlier_threshold > 0.0,
            "point_pattern.ransac.inlier_threshold",
            || "must be positive".to_string(),
        )?;
        check(
            self.ransac.confidence > 0.0 && self.ransac.confidence < 1.0,
            "point_pattern.ransac.confidence",
            || format!("must be within (0, 1), got {}", self.ransac.confidence),
        )?;
        check(
            (0.0..=1.0).contains(&self.ransac.min_inlier_ratio),
            "point_pattern.ransac.min_inlier_ratio",
            || format!("must be within [0, 1], got {}", self.ransac.min_inlier_ratio),
        )?;
        let (lo, hi) = self.ransac.scale_range;
        check(
            lo > 0.0 && lo < hi,
            "point_pattern.ransac.scale_range",
            || format!("expected 0 < min < max, got ({lo}, {hi})"),
        )
    }
}

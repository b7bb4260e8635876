//! Frame registration for astronomical image alignment.
//!
//! Two interchangeable strategies estimate the transform between a moving
//! frame and the reference:
//!
//! - **Correlation optimization** ([`ecc`]): enhanced correlation coefficient
//!   maximization over the whole image, homography by default.
//! - **Point-pattern matching** ([`point_pattern`]): star detection, triangle
//!   (asterism) voting and RANSAC, similarity by default.
//!
//! # Transformation Models
//!
//! | Type | DOF | Description |
//! |------|-----|-------------|
//! | Translation | 2 | X/Y offset only |
//! | Euclidean | 3 | Translation + rotation |
//! | Similarity | 4 | Translation + rotation + uniform scale |
//! | Affine | 6 | Handles shear and differential scaling |
//! | Homography | 8 | Full perspective transformation |
//!
//! Estimation runs on normalized frames; the un-normalized original is warped
//! with the result. A frame that cannot be registered becomes a
//! [`AlignmentResult::Skipped`] and never aborts its batch.

pub mod blur;
pub mod config;
pub mod ecc;
pub mod error;
pub mod interpolation;
pub mod point_pattern;
pub mod ransac;
pub mod stars;
pub mod transform;
pub mod triangle;


use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{ChannelFrame, FrameId};
use crate::io::LoadError;

pub use config::{
    EccConfig, InvalidSetting, PointPatternConfig, RansacConfig, StarDetectionConfig,
    TriangleMatchConfig,
};
pub use ecc::{EccOutcome, EccStrategy, find_transform_ecc};
pub use error::{ConvergenceReason, RansacFailureReason, RegistrationError};
pub use interpolation::warp;
pub use point_pattern::PointPatternStrategy;
pub use stars::{Star, detect_stars};
pub use transform::{Transform, TransformType};

/// Estimates reference-to-moving transforms.
pub trait RegistrationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Does the per-reference work once so many frames can be registered
    /// against it. Fails when the reference itself is unusable.
    fn prepare<'a>(
        &'a self,
        reference: &ChannelFrame,
    ) -> Result<Box<dyn PreparedReference + 'a>, RegistrationError>;

    /// Transform mapping `reference` coordinates into `moving`. Both frames
    /// are expected to be normalized.
    fn estimate(
        &self,
        moving: &ChannelFrame,
        reference: &ChannelFrame,
    ) -> Result<Transform, RegistrationError> {
        self.prepare(reference)?.estimate(moving)
    }
}

/// A reference frame prepared by a [`RegistrationStrategy`].
pub trait PreparedReference: Sync {
    /// `(width, height)` of the reference.
    fn size(&self) -> (usize, usize);

    fn estimate(&self, moving: &ChannelFrame) -> Result<Transform, RegistrationError>;
}

/// Registration strategy selected once per run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    /// Whole-image ECC maximization.
    CorrelationOptimization,
    /// Star triangles and RANSAC.
    #[default]
    PointPatternMatching,
}

impl Strategy {
    pub fn build(
        self,
        ecc: &EccConfig,
        point_pattern: &PointPatternConfig,
    ) -> Box<dyn RegistrationStrategy> {
        match self {
            Strategy::CorrelationOptimization => Box::new(EccStrategy::new(ecc.clone())),
            Strategy::PointPatternMatching => {
                Box::new(PointPatternStrategy::new(point_pattern.clone()))
            }
        }
    }
}

/// Why a frame did not contribute to its stack.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A frame left out of a stack.
#[derive(Debug)]
pub struct Skip {
    pub id: FrameId,
    pub reason: SkipReason,
}

impl Skip {
    pub fn new(id: FrameId, reason: impl Into<SkipReason>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.reason)
    }
}

/// Outcome of registering one frame.
#[derive(Debug)]
pub enum AlignmentResult {
    Aligned {
        id: FrameId,
        /// The original frame warped onto the reference grid.
        frame: ChannelFrame,
        transform: Transform,
    },
    Skipped(Skip),
}

impl AlignmentResult {
    /// The reference frame itself, aligned by definition.
    pub fn reference(id: FrameId, frame: ChannelFrame) -> Self {
        AlignmentResult::Aligned {
            id,
            frame,
            transform: Transform::identity(),
        }
    }

    pub fn id(&self) -> &FrameId {
        match self {
            AlignmentResult::Aligned { id, .. } => id,
            AlignmentResult::Skipped(skip) => &skip.id,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignmentResult::Aligned { .. })
    }
}

/// Estimates the transform from `normalized` and warps `original` with it.
pub fn register_frame(
    reference: &dyn PreparedReference,
    id: FrameId,
    original: &ChannelFrame,
    normalized: &ChannelFrame,
) -> AlignmentResult {
    let (reference_width, reference_height) = reference.size();
    if original.width() != reference_width || original.height() != reference_height {
        let error = RegistrationError::DimensionMismatch {
            width: original.width(),
            height: original.height(),
            reference_width,
            reference_height,
        };
        return AlignmentResult::Skipped(Skip::new(id, error));
    }

    match reference.estimate(normalized) {
        Ok(transform) => {
            tracing::debug!(frame = %id, %transform, "Frame registered");
            AlignmentResult::Aligned {
                id,
                frame: warp(original, &transform),
                transform,
            }
        }
        Err(error) => AlignmentResult::Skipped(Skip::new(id, error)),
    }
}

//! Star-pattern registration: detect stars, match triangles, fit with RANSAC.

use glam::DVec2;

use crate::frame::ChannelFrame;
use crate::registration::config::PointPatternConfig;
use crate::registration::error::RegistrationError;
use crate::registration::ransac::estimate_ransac;
use crate::registration::stars::detect_stars;
use crate::registration::transform::Transform;
use crate::registration::triangle::ReferencePattern;
use crate::registration::{PreparedReference, RegistrationStrategy};

#[derive(Debug, Clone, Default)]
pub struct PointPatternStrategy {
    config: PointPatternConfig,
}

impl PointPatternStrategy {
    pub fn new(config: PointPatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PointPatternConfig {
        &self.config
    }

    fn detect(&self, frame: &ChannelFrame) -> Result<Vec<DVec2>, RegistrationError> {
        let stars = detect_stars(frame, &self.config.detection);
        if stars.len() < self.config.min_stars {
            return Err(RegistrationError::InsufficientStars {
                found: stars.len(),
                required: self.config.min_stars,
            });
        }
        Ok(stars.iter().map(|s| s.pos).collect())
    }
}

struct StarReference<'a> {
    strategy: &'a PointPatternStrategy,
    size: (usize, usize),
    stars: Vec<DVec2>,
    pattern: ReferencePattern,
}

impl RegistrationStrategy for PointPatternStrategy {
    fn name(&self) -> &'static str {
        "point pattern matching"
    }

    fn prepare<'a>(
        &'a self,
        reference: &ChannelFrame,
    ) -> Result<Box<dyn PreparedReference + 'a>, RegistrationError> {
        let stars = self.detect(reference)?;
        let pattern = ReferencePattern::new(&stars, &self.config.triangles);
        tracing::debug!(
            stars = stars.len(),
            triangles = pattern.triangle_count(),
            "Reference star pattern ready"
        );
        Ok(Box::new(StarReference {
            strategy: self,
            size: (reference.width(), reference.height()),
            stars,
            pattern,
        }))
    }
}

impl PreparedReference for StarReference<'_> {
    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn estimate(&self, moving: &ChannelFrame) -> Result<Transform, RegistrationError> {
        let config = &self.strategy.config;
        let target = self.strategy.detect(moving)?;
        let matches = self.pattern.match_points(&target, &config.triangles);
        if matches.len() < config.transform_type.min_points() {
            return Err(RegistrationError::NoMatchingPatterns);
        }

        let refs: Vec<DVec2> = matches.iter().map(|m| self.stars[m.ref_idx]).collect();
        let targets: Vec<DVec2> = matches.iter().map(|m| target[m.target_idx]).collect();
        let result = estimate_ransac(
            &refs,
            &targets,
            config.transform_type,
            &config.ransac,
        )?;

        if result.rms_error > config.max_rms_error {
            return Err(RegistrationError::AccuracyTooLow {
                rms_error: result.rms_error,
                max_allowed: config.max_rms_error,
            });
        }

        tracing::debug!(
            matches = matches.len(),
            inliers = result.inliers.len(),
            rms_error = result.rms_error,
            transform = %result.transform,
            "Star pattern registered"
        );
        Ok(result.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::transform::TransformType;
    use crate::testing::synthetic::{
        FrameStyle, StarFieldConfig, generate_stars, noise_frame, render_frame,
    };

    fn frame(reference_to_frame: &Transform) -> ChannelFrame {
        let field = StarFieldConfig::default();
        render_frame(
            field.width,
            field.height,
            &generate_stars(&field),
            &FrameStyle::default(),
            reference_to_frame,
        )
    }

    fn max_error(a: &Transform, b: &Transform) -> f64 {
        [
            DVec2::new(8.0, 8.0),
            DVec2::new(56.0, 8.0),
            DVec2::new(32.0, 32.0),
            DVec2::new(8.0, 56.0),
            DVec2::new(56.0, 56.0),
        ]
        .iter()
        .map(|&p| (a.apply(p) - b.apply(p)).length())
        .fold(0.0, f64::max)
    }

    #[test]
    fn identical_frames_give_identity() {
        let reference = frame(&Transform::identity());
        let transform = PointPatternStrategy::default()
            .estimate(&reference, &reference)
            .unwrap();
        assert!(max_error(&transform, &Transform::identity()) < 1e-6);
        assert_eq!(transform.transform_type, TransformType::Similarity);
    }

    #[test]
    fn recovers_rotation_and_shift() {
        let center = DVec2::splat(32.0);
        let truth = Transform::translation(center + DVec2::new(1.5, -2.0))
            .compose(&Transform::euclidean(DVec2::ZERO, 2f64.to_radians()))
            .compose(&Transform::translation(-center));
        let reference = frame(&Transform::identity());
        let moving = frame(&truth);

        let transform = PointPatternStrategy::default()
            .estimate(&moving, &reference)
            .unwrap();
        let error = max_error(&transform, &truth);
        assert!(error < 0.3, "max error {error}");
    }

    #[test]
    fn translation_model_is_honoured() {
        let truth = Transform::translation(DVec2::new(-2.0, 1.0));
        let strategy = PointPatternStrategy::new(PointPatternConfig {
            transform_type: TransformType::Translation,
            ..Default::default()
        });
        let transform = strategy
            .estimate(&frame(&truth), &frame(&Transform::identity()))
            .unwrap();
        assert_eq!(transform.transform_type, TransformType::Translation);
        assert!((transform.translation_components() - DVec2::new(-2.0, 1.0)).length() < 0.2);
    }

    #[test]
    fn starless_frame_is_rejected() {
        let reference = frame(&Transform::identity());
        let strategy = PointPatternStrategy::default();
        let err = strategy
            .estimate(&noise_frame(64, 64, 0.1, 9), &reference)
            .unwrap_err();
        assert!(
            matches!(err, RegistrationError::InsufficientStars { required: 6, .. }),
            "unexpected error {err}"
        );
    }

    #[test]
    fn starless_reference_cannot_be_prepared() {
        let strategy = PointPatternStrategy::default();
        assert!(matches!(
            strategy.prepare(&noise_frame(64, 64, 0.1, 9)),
            Err(RegistrationError::InsufficientStars { .. })
        ));
    }
}

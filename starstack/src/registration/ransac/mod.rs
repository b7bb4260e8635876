//! RANSAC transform fitting over star correspondences.
//!
//! Random minimal samples propose hypotheses; the one with the most inliers
//! wins and is refined by least squares over its inliers. Sampling uses a
//! seeded ChaCha8 generator so results are reproducible.

mod estimators;
#[cfg(test)]
mod tests;

use glam::DVec2;
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;

use crate::registration::config::RansacConfig;
use crate::registration::error::{RansacFailureReason, RegistrationError};
use crate::registration::transform::{Transform, TransformType};

pub(crate) use estimators::{centroid, estimate_transform};

/// Refinement passes over the inlier set.
const REFINE_PASSES: usize = 3;

#[derive(Debug, Clone)]
pub struct RansacResult {
    pub transform: Transform,
    /// Indices into the correspondence lists.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    /// Root-mean-square residual over the inliers, in pixels.
    pub rms_error: f64,
}

/// Iterations needed to draw one all-inlier sample with probability
/// `confidence`: `N = ln(1 - confidence) / ln(1 - w^k)`.
pub(crate) fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let p_good = inlier_ratio.powi(sample_size as i32);
    let denom = (1.0 - p_good).ln();
    if !(denom < 0.0) {
        return usize::MAX;
    }
    ((1.0 - confidence).ln() / denom).ceil().max(1.0) as usize
}

/// Scale of the linear part, `sqrt(|det|)`.
fn linear_scale(transform: &Transform) -> f64 {
    let m = &transform.matrix;
    (m[0] * m[4] - m[1] * m[3]).abs().sqrt()
}

fn residual(transform: &Transform, r: DVec2, t: DVec2) -> f64 {
    (transform.apply(r) - t).length()
}

fn find_inliers(
    transform: &Transform,
    refs: &[DVec2],
    targets: &[DVec2],
    threshold: f64,
) -> Vec<usize> {
    refs.iter()
        .zip(targets)
        .enumerate()
        .filter(|(_, (r, t))| residual(transform, **r, **t) < threshold)
        .map(|(i, _)| i)
        .collect()
}

fn fit_subset(
    refs: &[DVec2],
    targets: &[DVec2],
    subset: &[usize],
    model: TransformType,
) -> Option<Transform> {
    let r: Vec<DVec2> = subset.iter().map(|&i| refs[i]).collect();
    let t: Vec<DVec2> = subset.iter().map(|&i| targets[i]).collect();
    estimate_transform(&r, &t, model)
}

/// Fits `model` mapping `refs[i]` onto `targets[i]` for the consistent pairs.
pub fn estimate_ransac(
    refs: &[DVec2],
    targets: &[DVec2],
    model: TransformType,
    config: &RansacConfig,
) -> Result<RansacResult, RegistrationError> {
    let fail = |reason, iterations, best_inlier_count| {
        Err(RegistrationError::RansacFailed {
            reason,
            iterations,
            best_inlier_count,
        })
    };

    let n = refs.len().min(targets.len());
    let sample_size = model.min_points();
    if n < sample_size || n < config.min_inliers {
        return fail(RansacFailureReason::TooFewCorrespondences, 0, 0);
    }

    let (min_scale, max_scale) = config.scale_range;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut best: Option<(Transform, Vec<usize>)> = None;
    let mut needed = config.max_iterations;
    let mut iterations = 0;

    while iterations < needed {
        iterations += 1;
        let sample = index::sample(&mut rng, n, sample_size).into_vec();
        let Some(hypothesis) = fit_subset(refs, targets, &sample, model) else {
            continue;
        };
        let scale = linear_scale(&hypothesis);
        if !(scale >= min_scale && scale <= max_scale) {
            continue;
        }

        let inliers = find_inliers(&hypothesis, refs, targets, config.inlier_threshold);
        if best.as_ref().is_none_or(|(_, b)| inliers.len() > b.len()) {
            let ratio = inliers.len() as f64 / n as f64;
            needed = adaptive_iterations(ratio, sample_size, config.confidence)
                .min(config.max_iterations);
            best = Some((hypothesis, inliers));
        }
    }

    let Some((mut transform, mut inliers)) = best else {
        return fail(RansacFailureReason::NoValidHypothesis, iterations, 0);
    };

    for _ in 0..REFINE_PASSES {
        let Some(refined) = fit_subset(refs, targets, &inliers, model) else {
            break;
        };
        let refined_inliers = find_inliers(&refined, refs, targets, config.inlier_threshold);
        if refined_inliers.len() < inliers.len() {
            break;
        }
        let unchanged = refined_inliers == inliers;
        transform = refined;
        inliers = refined_inliers;
        if unchanged {
            break;
        }
    }

    if inliers.len() < config.min_inliers.max(sample_size) {
        return fail(RansacFailureReason::TooFewInliers, iterations, inliers.len());
    }
    if (inliers.len() as f64) < config.min_inlier_ratio * n as f64 {
        return fail(RansacFailureReason::LowInlierRatio, iterations, inliers.len());
    }

    let sum_sq: f64 = inliers
        .iter()
        .map(|&i| residual(&transform, refs[i], targets[i]).powi(2))
        .sum();
    let rms_error = (sum_sq / inliers.len() as f64).sqrt();

    tracing::trace!(
        iterations,
        inliers = inliers.len(),
        candidates = n,
        rms_error,
        "RANSAC finished"
    );

    Ok(RansacResult {
        transform,
        inliers,
        iterations,
        rms_error,
    })
}

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::*;

fn random_points(count: usize, seed: u64) -> Vec<DVec2> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| DVec2::new(rng.random_range(0.0..64.0), rng.random_range(0.0..64.0)))
        .collect()
}

#[test]
fn adaptive_iteration_count() {
    assert_eq!(adaptive_iterations(1.0, 2, 0.99), 1);
    assert_eq!(adaptive_iterations(0.5, 2, 0.99), 17);
    assert_eq!(adaptive_iterations(0.0, 2, 0.99), usize::MAX);
}

#[test]
fn recovers_similarity_despite_outliers() {
    let truth = Transform::similarity(DVec2::new(2.5, -1.5), 0.05, 1.02);
    let mut refs = random_points(20, 1);
    let mut targets: Vec<DVec2> = refs.iter().map(|&p| truth.apply(p)).collect();
    // Outliers at the end, well off the true mapping.
    let outliers = random_points(8, 2);
    targets.extend(outliers.iter().map(|&p| truth.apply(p) + DVec2::new(15.0, -12.0)));
    refs.extend(outliers);

    let result = estimate_ransac(
        &refs,
        &targets,
        TransformType::Similarity,
        &RansacConfig::default(),
    )
    .unwrap();

    assert_eq!(result.inliers, (0..20).collect::<Vec<_>>());
    assert!(result.rms_error < 1e-6);
    for p in [DVec2::ZERO, DVec2::new(64.0, 64.0)] {
        assert!((result.transform.apply(p) - truth.apply(p)).length() < 1e-6);
    }
}

#[test]
fn same_seed_same_result() {
    let truth = Transform::translation(DVec2::new(-3.0, 4.0));
    let mut refs = random_points(12, 4);
    let mut targets: Vec<DVec2> = refs
        .iter()
        .map(|&p| truth.apply(p) + DVec2::splat(0.1))
        .collect();
    let outliers = random_points(5, 5);
    targets.extend(outliers.iter().map(|&p| truth.apply(p) + DVec2::new(-9.0, 11.0)));
    refs.extend(outliers);

    let config = RansacConfig::default();
    let a = estimate_ransac(&refs, &targets, TransformType::Affine, &config).unwrap();
    let b = estimate_ransac(&refs, &targets, TransformType::Affine, &config).unwrap();
    assert_eq!(a.transform, b.transform);
    assert_eq!(a.inliers, b.inliers);
    assert_eq!(a.iterations, b.iterations);
}

#[test]
fn too_few_correspondences() {
    let points = random_points(3, 7);
    let err = estimate_ransac(
        &points,
        &points,
        TransformType::Similarity,
        &RansacConfig::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::RansacFailed {
            reason: RansacFailureReason::TooFewCorrespondences,
            iterations: 0,
            best_inlier_count: 0,
        }
    );
}

#[test]
fn unrelated_points_fail() {
    let refs = random_points(10, 8);
    let targets = random_points(10, 9);
    let err = estimate_ransac(
        &refs,
        &targets,
        TransformType::Similarity,
        &RansacConfig::default(),
    )
    .unwrap_err();
    assert!(
        matches!(err, RegistrationError::RansacFailed { .. }),
        "unexpected error {err}"
    );
}

#[test]
fn implausible_scale_is_rejected() {
    let truth = Transform::similarity(DVec2::ZERO, 0.0, 3.0);
    let refs = random_points(10, 10);
    let targets: Vec<DVec2> = refs.iter().map(|&p| truth.apply(p)).collect();
    let err = estimate_ransac(
        &refs,
        &targets,
        TransformType::Similarity,
        &RansacConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::RansacFailed {
            reason: RansacFailureReason::NoValidHypothesis,
            ..
        }
    ));
}

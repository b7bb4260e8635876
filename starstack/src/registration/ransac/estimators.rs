//! Least-squares transform fits from point correspondences.
//!
//! Every estimator returns `T` with `T.apply(ref) ≈ target`.

use glam::DVec2;
use nalgebra::{DMatrix, DVector, SMatrix, SymmetricEigen};

use crate::math::DMat3;
use crate::registration::transform::{Transform, TransformType};

/// Fits `transform_type` to the pairs. `None` when there are too few
/// points or the configuration is degenerate.
pub(crate) fn estimate_transform(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    transform_type: TransformType,
) -> Option<Transform> {
    if ref_points.len() != target_points.len() || ref_points.len() < transform_type.min_points() {
        return None;
    }
    let transform = match transform_type {
        TransformType::Translation => estimate_translation(ref_points, target_points),
        TransformType::Euclidean => estimate_similarity(ref_points, target_points, false),
        TransformType::Similarity => estimate_similarity(ref_points, target_points, true),
        TransformType::Affine => estimate_affine(ref_points, target_points),
        TransformType::Homography => estimate_homography(ref_points, target_points),
    }?;
    transform.is_valid().then_some(transform)
}

pub(crate) fn centroid(points: &[DVec2]) -> DVec2 {
    points.iter().copied().sum::<DVec2>() / points.len().max(1) as f64
}

fn estimate_translation(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    Some(Transform::translation(
        centroid(target_points) - centroid(ref_points),
    ))
}

/// Closed-form fit of `t = s R r + d` on centered points. Treating the
/// points as complex numbers, the linear part is `a + ib` with
/// `a = Σ(r·t) / Σ|r|²` and `b = Σ(r × t) / Σ|r|²`. With `with_scale` unset
/// only the angle is kept.
fn estimate_similarity(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    with_scale: bool,
) -> Option<Transform> {
    let rc = centroid(ref_points);
    let tc = centroid(target_points);

    let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
    for (r, t) in ref_points.iter().zip(target_points) {
        let r = *r - rc;
        let t = *t - tc;
        dot += r.dot(t);
        cross += r.perp_dot(t);
        norm += r.length_squared();
    }
    if norm < 1e-10 {
        return None;
    }

    let angle = cross.atan2(dot);
    let scale = if with_scale {
        dot.hypot(cross) / norm
    } else {
        1.0
    };
    let (sin_a, cos_a) = angle.sin_cos();
    let linear = |p: DVec2| DVec2::new(cos_a * p.x - sin_a * p.y, sin_a * p.x + cos_a * p.y) * scale;
    let t = tc - linear(rc);

    Some(if with_scale {
        Transform::similarity(t, angle, scale)
    } else {
        Transform::euclidean(t, angle)
    })
}

fn estimate_affine(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    let n = ref_points.len();
    let design = DMatrix::from_fn(n, 3, |i, j| match j {
        0 => ref_points[i].x,
        1 => ref_points[i].y,
        _ => 1.0,
    });
    let svd = design.svd(true, true);
    if svd.singular_values.min() < 1e-9 * svd.singular_values.max().max(1.0) {
        return None;
    }

    let xs = DVector::from_iterator(n, target_points.iter().map(|p| p.x));
    let ys = DVector::from_iterator(n, target_points.iter().map(|p| p.y));
    let row_x = svd.solve(&xs, 1e-12).ok()?;
    let row_y = svd.solve(&ys, 1e-12).ok()?;

    Some(Transform::affine([
        row_x[0], row_x[1], row_x[2], row_y[0], row_y[1], row_y[2],
    ]))
}

/// Shifts the centroid to the origin and scales the mean distance to √2.
fn normalization(points: &[DVec2]) -> Option<(Vec<DVec2>, DMat3)> {
    let c = centroid(points);
    let mean_dist = points.iter().map(|p| p.distance(c)).sum::<f64>() / points.len() as f64;
    if mean_dist < 1e-10 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points.iter().map(|p| (*p - c) * s).collect();
    let matrix = DMat3::from_array([s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0]);
    Some((normalized, matrix))
}

/// Normalized direct linear transform. The solution is the eigenvector of
/// `AᵀA` with the smallest eigenvalue.
fn estimate_homography(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    let (refs, ref_norm) = normalization(ref_points)?;
    let (targets, target_norm) = normalization(target_points)?;

    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (r, t) in refs.iter().zip(&targets) {
        let rows = [
            [-r.x, -r.y, -1.0, 0.0, 0.0, 0.0, r.x * t.x, r.y * t.x, t.x],
            [0.0, 0.0, 0.0, -r.x, -r.y, -1.0, r.x * t.y, r.y * t.y, t.y],
        ];
        for row in &rows {
            for i in 0..9 {
                for j in 0..9 {
                    ata[(i, j)] += row[i] * row[j];
                }
            }
        }
    }

    let eigen = SymmetricEigen::new(ata);
    let smallest = eigen.eigenvalues.imin();
    let h = eigen.eigenvectors.column(smallest);
    let normalized = DMat3::from_array(std::array::from_fn(|i| h[i]));

    let matrix = target_norm
        .inverse()?
        .mul_mat(&normalized)
        .mul_mat(&ref_norm)
        .normalized()?;
    Some(Transform::from_matrix(matrix, TransformType::Homography))
}

//! Enhanced correlation coefficient (ECC) image registration.
//!
//! Maximizes the zero-mean normalized cross-correlation between the
//! reference (template) and the warped moving image with Gauss-Newton
//! steps on the warp parameters (Evangelidis & Psarakis, 2008).

use glam::DVec2;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::frame::ChannelFrame;
use crate::registration::blur::gaussian_blur_5x5;
use crate::registration::config::EccConfig;
use crate::registration::error::{ConvergenceReason, RegistrationError};
use crate::registration::interpolation::sample_bilinear;
use crate::registration::transform::{Transform, TransformType};
use crate::registration::{PreparedReference, RegistrationStrategy};


const MAX_PARAMS: usize = 8;

/// Result of a successful optimization.
#[derive(Debug, Clone, Copy)]
pub struct EccOutcome {
    pub transform: Transform,
    pub correlation: f64,
    pub iterations: usize,
    /// The epsilon criterion was met before the iteration ceiling.
    pub converged: bool,
}

/// Correlation-optimization strategy.
#[derive(Debug, Clone, Default)]
pub struct EccStrategy {
    config: EccConfig,
}

impl EccStrategy {
    pub fn new(config: EccConfig) -> Self {
        Self { config }
    }

    fn preprocess(&self, frame: &ChannelFrame) -> ChannelFrame {
        if self.config.pre_blur {
            gaussian_blur_5x5(frame)
        } else {
            frame.clone()
        }
    }
}

struct EccReference<'a> {
    strategy: &'a EccStrategy,
    template: ChannelFrame,
}

impl RegistrationStrategy for EccStrategy {
    fn name(&self) -> &'static str {
        "correlation optimization"
    }

    fn prepare<'a>(
        &'a self,
        reference: &ChannelFrame,
    ) -> Result<Box<dyn PreparedReference + 'a>, RegistrationError> {
        let template = self.preprocess(reference);
        if !has_variance(&template) {
            return Err(RegistrationError::ConvergenceFailure {
                iterations: 0,
                reason: ConvergenceReason::ZeroVariance,
            });
        }
        Ok(Box::new(EccReference {
            strategy: self,
            template,
        }))
    }
}

impl PreparedReference for EccReference<'_> {
    fn size(&self) -> (usize, usize) {
        (self.template.width(), self.template.height())
    }

    fn estimate(&self, moving: &ChannelFrame) -> Result<Transform, RegistrationError> {
        let input = self.strategy.preprocess(moving);
        find_transform_ecc(&self.template, &input, &self.strategy.config)
            .map(|outcome| outcome.transform)
    }
}

fn has_variance(frame: &ChannelFrame) -> bool {
    let mut values = frame.pixels().iter().filter(|v| v.is_finite());
    match values.next() {
        Some(first) => values.any(|v| v != first),
        None => false,
    }
}

/// Warp parameters of one motion model.
///
/// Layout per model:
/// - translation: `[tx, ty]`
/// - euclidean: `[theta, tx, ty]`
/// - affine: `[a, b, tx, c, d, ty]`
/// - homography: `[h00, h01, h02, h10, h11, h12, h20, h21]`
#[derive(Debug, Clone, Copy)]
struct WarpParams {
    motion: TransformType,
    p: [f64; MAX_PARAMS],
}

impl WarpParams {
    fn identity(motion: TransformType) -> Self {
        let p = match motion {
            TransformType::Translation | TransformType::Euclidean => [0.0; MAX_PARAMS],
            TransformType::Similarity | TransformType::Affine | TransformType::Homography => {
                [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]
            }
        };
        Self { motion, p }
    }

    fn count(&self) -> usize {
        match self.motion {
            TransformType::Translation => 2,
            TransformType::Euclidean => 3,
            TransformType::Similarity | TransformType::Affine => 6,
            TransformType::Homography => 8,
        }
    }

    fn transform(&self) -> Transform {
        let p = &self.p;
        match self.motion {
            TransformType::Translation => Transform::translation(DVec2::new(p[0], p[1])),
            TransformType::Euclidean => Transform::euclidean(DVec2::new(p[1], p[2]), p[0]),
            TransformType::Similarity | TransformType::Affine => {
                Transform::affine([p[0], p[1], p[2], p[3], p[4], p[5]])
            }
            TransformType::Homography => {
                Transform::homography([p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]])
            }
        }
    }

    /// Jacobian of the warped intensity w.r.t. the parameters at template
    /// pixel `(x, y)`, given the input gradient `g` sampled at the warped
    /// position `w`.
    #[inline]
    fn jacobian(&self, x: f64, y: f64, w: DVec2, g: DVec2, out: &mut [f64; MAX_PARAMS]) {
        let p = &self.p;
        match self.motion {
            TransformType::Translation => {
                out[0] = g.x;
                out[1] = g.y;
            }
            TransformType::Euclidean => {
                let (sin_t, cos_t) = p[0].sin_cos();
                let dx_dtheta = -sin_t * x - cos_t * y;
                let dy_dtheta = cos_t * x - sin_t * y;
                out[0] = g.x * dx_dtheta + g.y * dy_dtheta;
                out[1] = g.x;
                out[2] = g.y;
            }
            TransformType::Similarity | TransformType::Affine => {
                out[0] = g.x * x;
                out[1] = g.x * y;
                out[2] = g.x;
                out[3] = g.y * x;
                out[4] = g.y * y;
                out[5] = g.y;
            }
            TransformType::Homography => {
                let den = p[6] * x + p[7] * y + 1.0;
                let gx = g.x / den;
                let gy = g.y / den;
                let proj = gx * w.x + gy * w.y;
                *out = [
                    gx * x,
                    gx * y,
                    gx,
                    gy * x,
                    gy * y,
                    gy,
                    -proj * x,
                    -proj * y,
                ];
            }
        }
    }

    fn update(&mut self, delta: &DVector<f64>) {
        for (p, d) in self.p.iter_mut().zip(delta.iter()) {
            *p += d;
        }
    }

    fn is_finite(&self) -> bool {
        self.p.iter().all(|v| v.is_finite())
    }
}

/// Per-iteration sums over the overlap, reduced across rows in parallel.
#[derive(Clone)]
struct EccSums {
    count: usize,
    sum_i: f64,
    sum_t: f64,
    sum_ii: f64,
    sum_tt: f64,
    sum_it: f64,
    /// Upper triangle of J^T J.
    hessian: [f64; MAX_PARAMS * MAX_PARAMS],
    j_i: [f64; MAX_PARAMS],
    j_t: [f64; MAX_PARAMS],
    j_1: [f64; MAX_PARAMS],
}

impl EccSums {
    fn zero() -> Self {
        Self {
            count: 0,
            sum_i: 0.0,
            sum_t: 0.0,
            sum_ii: 0.0,
            sum_tt: 0.0,
            sum_it: 0.0,
            hessian: [0.0; MAX_PARAMS * MAX_PARAMS],
            j_i: [0.0; MAX_PARAMS],
            j_t: [0.0; MAX_PARAMS],
            j_1: [0.0; MAX_PARAMS],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        self.sum_i += other.sum_i;
        self.sum_t += other.sum_t;
        self.sum_ii += other.sum_ii;
        self.sum_tt += other.sum_tt;
        self.sum_it += other.sum_it;
        for (a, b) in self.hessian.iter_mut().zip(other.hessian.iter()) {
            *a += b;
        }
        for k in 0..MAX_PARAMS {
            self.j_i[k] += other.j_i[k];
            self.j_t[k] += other.j_t[k];
            self.j_1[k] += other.j_1[k];
        }
        self
    }
}

/// Central-difference gradients with zero derivative at the borders.
fn gradients(frame: &ChannelFrame) -> (ChannelFrame, ChannelFrame) {
    let width = frame.width();
    let height = frame.height();
    let grad_x = ChannelFrame::from_fn(width, height, |x, y| {
        if x == 0 || x + 1 >= width {
            0.0
        } else {
            0.5 * (frame.get(x + 1, y) - frame.get(x - 1, y))
        }
    });
    let grad_y = ChannelFrame::from_fn(width, height, |x, y| {
        if y == 0 || y + 1 >= height {
            0.0
        } else {
            0.5 * (frame.get(x, y + 1) - frame.get(x, y - 1))
        }
    });
    (grad_x, grad_y)
}

fn accumulate(
    template: &ChannelFrame,
    input: &ChannelFrame,
    grad_x: &ChannelFrame,
    grad_y: &ChannelFrame,
    params: &WarpParams,
) -> EccSums {
    let transform = params.transform();
    let n = params.count();
    let max_x = input.width() as f64 - 1.0;
    let max_y = input.height() as f64 - 1.0;

    (0..template.height())
        .into_par_iter()
        .fold(EccSums::zero, |mut acc, y| {
            let mut j = [0.0; MAX_PARAMS];
            for x in 0..template.width() {
                let tv = f64::from(*template.get(x, y));
                if !tv.is_finite() {
                    continue;
                }
                let (xf, yf) = (x as f64, y as f64);
                let w = transform.apply(DVec2::new(xf, yf));
                if !(w.x >= 0.0 && w.y >= 0.0 && w.x <= max_x && w.y <= max_y) {
                    continue;
                }
                let iv = f64::from(sample_bilinear(input, w.x, w.y));
                let g = DVec2::new(
                    f64::from(sample_bilinear(grad_x, w.x, w.y)),
                    f64::from(sample_bilinear(grad_y, w.x, w.y)),
                );
                params.jacobian(xf, yf, w, g, &mut j);

                acc.count += 1;
                acc.sum_i += iv;
                acc.sum_t += tv;
                acc.sum_ii += iv * iv;
                acc.sum_tt += tv * tv;
                acc.sum_it += iv * tv;
                for a in 0..n {
                    acc.j_i[a] += j[a] * iv;
                    acc.j_t[a] += j[a] * tv;
                    acc.j_1[a] += j[a];
                    for b in a..n {
                        acc.hessian[a * MAX_PARAMS + b] += j[a] * j[b];
                    }
                }
            }
            acc
        })
        .reduce(EccSums::zero, EccSums::merge)
}

/// Finds the warp mapping `template` coordinates into `input` that maximizes
/// their correlation.
///
/// Both images should already be smoothed. Iterates until the correlation
/// changes by less than `config.epsilon` or `config.max_iterations` is
/// reached; either way the result must reach `config.min_correlation`.
pub fn find_transform_ecc(
    template: &ChannelFrame,
    input: &ChannelFrame,
    config: &EccConfig,
) -> Result<EccOutcome, RegistrationError> {
    let fail = |iterations: usize, reason: ConvergenceReason| {
        Err(RegistrationError::ConvergenceFailure { iterations, reason })
    };

    let (grad_x, grad_y) = gradients(input);
    let mut params = WarpParams::identity(config.motion);
    let n = params.count();
    let total = template.len();
    let min_valid = (total / 10).max(4 * n);

    let mut last_rho = -1.0;
    let mut rho = -1.0;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;
        let sums = accumulate(template, input, &grad_x, &grad_y, &params);
        if sums.count < min_valid {
            return fail(
                iterations,
                ConvergenceReason::InsufficientOverlap {
                    valid: sums.count,
                    total,
                },
            );
        }

        let count = sums.count as f64;
        let i_mean = sums.sum_i / count;
        let t_mean = sums.sum_t / count;
        let i_norm_sq = sums.sum_ii - count * i_mean * i_mean;
        let t_norm_sq = sums.sum_tt - count * t_mean * t_mean;
        let tiny = f64::EPSILON * count;
        if !(i_norm_sq > tiny && t_norm_sq > tiny) {
            return fail(iterations, ConvergenceReason::ZeroVariance);
        }

        let correlation = sums.sum_it - count * i_mean * t_mean;
        rho = correlation / (i_norm_sq.sqrt() * t_norm_sq.sqrt());
        if !rho.is_finite() {
            return fail(iterations, ConvergenceReason::NonFinite);
        }

        let hessian = DMatrix::from_fn(n, n, |r, c| {
            let (a, b) = if r <= c { (r, c) } else { (c, r) };
            sums.hessian[a * MAX_PARAMS + b]
        });
        let Some(hessian_inv) = hessian.try_inverse() else {
            return fail(iterations, ConvergenceReason::SingularHessian);
        };

        // Projections of the zero-mean images onto the Jacobian.
        let image_proj = DVector::from_fn(n, |k, _| sums.j_i[k] - i_mean * sums.j_1[k]);
        let template_proj = DVector::from_fn(n, |k, _| sums.j_t[k] - t_mean * sums.j_1[k]);

        let image_proj_hessian = &hessian_inv * &image_proj;
        let lambda_n = i_norm_sq - image_proj.dot(&image_proj_hessian);
        let lambda_d = correlation - template_proj.dot(&image_proj_hessian);
        if !(lambda_d > 0.0) {
            return fail(iterations, ConvergenceReason::Uncorrelated);
        }
        let lambda = lambda_n / lambda_d;

        let error_proj = &template_proj * lambda - &image_proj;
        let delta = &hessian_inv * error_proj;
        params.update(&delta);
        if !params.is_finite() {
            return fail(iterations, ConvergenceReason::NonFinite);
        }

        if (rho - last_rho).abs() < config.epsilon {
            converged = true;
            break;
        }
        last_rho = rho;
    }

    if rho < config.min_correlation {
        return fail(
            iterations,
            ConvergenceReason::LowCorrelation {
                correlation: rho,
                min: config.min_correlation,
            },
        );
    }

    let transform = params.transform();
    if !transform.is_valid() {
        return fail(iterations, ConvergenceReason::NonFinite);
    }

    tracing::debug!(
        iterations,
        correlation = rho,
        converged,
        %transform,
        "ECC finished"
    );

    Ok(EccOutcome {
        transform,
        correlation: rho,
        iterations,
        converged,
    })
}

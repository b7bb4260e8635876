//! Synthetic star fields with known geometry.

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::frame::ChannelFrame;
use crate::registration::Transform;

/// Gaussian point source.
#[derive(Debug, Clone, Copy)]
pub struct Star {
    pub pos: DVec2,
    pub amplitude: f32,
}

#[derive(Debug, Clone)]
pub struct StarFieldConfig {
    pub width: usize,
    pub height: usize,
    pub num_stars: usize,
    /// Stars are kept at least this far from the edges.
    pub edge_margin: f64,
    /// Minimum distance between two stars.
    pub min_separation: f64,
    pub amplitude_range: (f32, f32),
    pub seed: u64,
}

impl Default for StarFieldConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            num_stars: 14,
            edge_margin: 8.0,
            min_separation: 7.0,
            amplitude_range: (0.4, 1.0),
            seed: 42,
        }
    }
}

/// How a frame of a star field is rendered.
#[derive(Debug, Clone)]
pub struct FrameStyle {
    pub psf_sigma: f64,
    pub background: f32,
    /// Multiplies the star amplitudes.
    pub gain: f32,
    pub noise_sigma: f32,
    pub noise_seed: u64,
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            psf_sigma: 1.2,
            background: 0.1,
            gain: 1.0,
            noise_sigma: 0.01,
            noise_seed: 7,
        }
    }
}

/// Places stars uniformly with a minimum separation.
pub fn generate_stars(config: &StarFieldConfig) -> Vec<Star> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut stars: Vec<Star> = Vec::with_capacity(config.num_stars);
    let (lo, hi) = config.amplitude_range;
    let mut attempts = 0;

    while stars.len() < config.num_stars && attempts < 10_000 {
        attempts += 1;
        let pos = DVec2::new(
            rng.random_range(config.edge_margin..config.width as f64 - config.edge_margin),
            rng.random_range(config.edge_margin..config.height as f64 - config.edge_margin),
        );
        if stars
            .iter()
            .any(|s| s.pos.distance(pos) < config.min_separation)
        {
            continue;
        }
        stars.push(Star {
            pos,
            amplitude: rng.random_range(lo..=hi),
        });
    }
    stars
}

/// Standard normal sample (Box-Muller).
pub fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Renders `stars` as seen by a frame whose pixel `q` shows the sky at
/// `reference_to_frame.inverse().apply(q)`.
///
/// With `reference_to_frame = T`, registering this frame against a frame
/// rendered with the identity should recover `T`.
pub fn render_frame(
    width: usize,
    height: usize,
    stars: &[Star],
    style: &FrameStyle,
    reference_to_frame: &Transform,
) -> ChannelFrame {
    let frame_to_reference = reference_to_frame
        .inverse()
        .unwrap_or_else(Transform::identity);
    let mut rng = ChaCha8Rng::seed_from_u64(style.noise_seed);
    let two_sigma_sq = 2.0 * style.psf_sigma * style.psf_sigma;

    ChannelFrame::from_fn(width, height, |x, y| {
        let sky = frame_to_reference.apply(DVec2::new(x as f64, y as f64));
        let signal: f64 = stars
            .iter()
            .map(|s| f64::from(s.amplitude) * (-(s.pos.distance_squared(sky)) / two_sigma_sq).exp())
            .sum();
        let noise = gaussian(&mut rng) * f64::from(style.noise_sigma);
        (f64::from(style.background) + f64::from(style.gain) * signal + noise) as f32
    })
}

/// Gaussian noise (sigma 0.02) around `level`, no stars.
pub fn noise_frame(width: usize, height: usize, level: f32, seed: u64) -> ChannelFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    ChannelFrame::from_fn(width, height, |_, _| {
        level + (gaussian(&mut rng) * 0.02) as f32
    })
}

/// Uniform noise in `[0, 1)`.
pub fn uniform_noise(width: usize, height: usize, seed: u64) -> ChannelFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    ChannelFrame::from_fn(width, height, |_, _| rng.random::<f32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stars_respect_margin_and_separation() {
        let config = StarFieldConfig::default();
        let stars = generate_stars(&config);
        assert_eq!(stars.len(), config.num_stars);
        for (i, a) in stars.iter().enumerate() {
            assert!(a.pos.x >= config.edge_margin && a.pos.y >= config.edge_margin);
            for b in &stars[i + 1..] {
                assert!(a.pos.distance(b.pos) >= config.min_separation);
            }
        }
    }

    #[test]
    fn render_peaks_at_star_positions() {
        let stars = [Star {
            pos: DVec2::new(10.0, 12.0),
            amplitude: 1.0,
        }];
        let style = FrameStyle {
            noise_sigma: 0.0,
            ..Default::default()
        };
        let frame = render_frame(24, 24, &stars, &style, &Transform::identity());
        assert!((frame.get(10, 12) - 1.1).abs() < 1e-6);

        let shifted = render_frame(
            24,
            24,
            &stars,
            &style,
            &Transform::translation(DVec2::new(3.0, -2.0)),
        );
        assert!((shifted.get(13, 10) - 1.1).abs() < 1e-6);
    }
}

//! Robust statistics over `f32` samples. Non-finite samples are ignored.

/// Scale factor turning the median absolute deviation into a Gaussian sigma.
pub const MAD_TO_SIGMA: f32 = 1.4826;

/// Mean of the finite samples, accumulated in f64.
pub fn mean_finite(values: &[f32]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(sum, count), &v| {
            (sum + f64::from(v), count + 1)
        });
    (count > 0).then(|| sum / count as f64)
}

/// Minimum and maximum of the finite samples.
pub fn min_max_finite(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Median computed in place by partial selection. Returns `None` for empty input.
pub fn median_in_place(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let len = values.len();
    let mid = len / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        return Some(upper);
    }
    let lower_max = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    Some((lower_max + upper) * 0.5)
}

/// Median and MAD-derived sigma of the finite samples.
pub fn median_and_sigma(values: &[f32]) -> Option<(f32, f32)> {
    let mut finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let median = median_in_place(&mut finite)?;
    for v in finite.iter_mut() {
        *v = (*v - median).abs();
    }
    let mad = median_in_place(&mut finite)?;
    Some((median, mad * MAD_TO_SIGMA))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_skips_non_finite() {
        assert_eq!(mean_finite(&[1.0, f32::NAN, 3.0, f32::INFINITY]), Some(2.0));
        assert_eq!(mean_finite(&[f32::NAN]), None);
        assert_eq!(mean_finite(&[]), None);
    }

    #[test]
    fn min_max_skips_non_finite() {
        assert_eq!(
            min_max_finite(&[2.0, f32::NEG_INFINITY, -1.0, 5.0]),
            Some((-1.0, 5.0))
        );
        assert_eq!(min_max_finite(&[f32::NAN]), None);
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_in_place(&mut []), None);
    }

    #[test]
    fn sigma_of_symmetric_samples() {
        let (median, sigma) = median_and_sigma(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(median, 3.0);
        assert!((sigma - MAD_TO_SIGMA).abs() < 1e-6);
    }
}

use glam::DVec2;

/// Minimum side length for valid triangles.
const MIN_TRIANGLE_SIDE: f64 = 1e-10;

/// Minimum squared area (Heron) relative to the squared longest side.
const MIN_RELATIVE_AREA_SQ: f64 = 1e-4;

/// Longest / shortest side above this makes the ratios unstable (Groth 1986).
const MAX_ELONGATION: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Orientation {
    Clockwise,
    CounterClockwise,
}

/// Three stars with scale- and rotation-invariant shape descriptors.
#[derive(Debug, Clone)]
pub(crate) struct Triangle {
    /// Star indices ordered by the length of the opposite side, shortest
    /// first, so equal-shaped triangles list corresponding stars in the
    /// same slots.
    pub vertices: [usize; 3],
    /// `(shortest / longest, middle / longest)`.
    pub ratios: (f64, f64),
    pub orientation: Orientation,
}

impl Triangle {
    /// Returns `None` for degenerate, flat or overly elongated triangles.
    pub fn new(indices: [usize; 3], positions: &[DVec2]) -> Option<Self> {
        let p = indices.map(|i| positions[i]);
        // Side opposite vertex k.
        let opposite = [
            p[1].distance(p[2]),
            p[2].distance(p[0]),
            p[0].distance(p[1]),
        ];

        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| opposite[a].total_cmp(&opposite[b]));
        let sides = order.map(|k| opposite[k]);

        if sides[0] < MIN_TRIANGLE_SIDE {
            return None;
        }
        let longest = sides[2];
        if longest / sides[0] > MAX_ELONGATION {
            return None;
        }

        let s = (sides[0] + sides[1] + sides[2]) * 0.5;
        let area_sq = s * (s - sides[0]) * (s - sides[1]) * (s - sides[2]);
        if area_sq < MIN_RELATIVE_AREA_SQ * longest.powi(4) {
            return None;
        }

        let v = order.map(|k| p[k]);
        let cross = (v[1] - v[0]).perp_dot(v[2] - v[0]);
        let orientation = if cross > 0.0 {
            Orientation::CounterClockwise
        } else {
            Orientation::Clockwise
        };

        Some(Self {
            vertices: order.map(|k| indices[k]),
            ratios: (sides[0] / longest, sides[1] / longest),
            orientation,
        })
    }

    pub fn is_similar(&self, other: &Triangle, tolerance: f64) -> bool {
        (self.ratios.0 - other.ratios.0).abs() < tolerance
            && (self.ratios.1 - other.ratios.1).abs() < tolerance
    }
}

/// Indices of the `k` nearest neighbours of every point (brute force).
pub(crate) fn nearest_neighbours(positions: &[DVec2], k: usize) -> Vec<Vec<usize>> {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut others: Vec<(f64, usize)> = positions
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, q)| (p.distance_squared(*q), j))
                .collect();
            others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            others.truncate(k);
            others.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

/// Triangles formed by each point and every pair of its `k` nearest
/// neighbours. Each vertex set appears once.
pub(crate) fn form_triangles(positions: &[DVec2], k: usize) -> Vec<Triangle> {
    let neighbours = nearest_neighbours(positions, k);
    let mut seen = std::collections::HashSet::new();
    let mut triangles = Vec::new();

    for (i, near) in neighbours.iter().enumerate() {
        for (a, &j) in near.iter().enumerate() {
            for &l in &near[a + 1..] {
                let mut key = [i, j, l];
                key.sort_unstable();
                if !seen.insert(key) {
                    continue;
                }
                if let Some(triangle) = Triangle::new(key, positions) {
                    triangles.push(triangle);
                }
            }
        }
    }
    triangles
}

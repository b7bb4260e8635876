use crate::registration::config::TriangleMatchConfig;

use super::geometry::Triangle;

/// A star correspondence supported by matching triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointMatch {
    pub ref_idx: usize,
    pub target_idx: usize,
    pub votes: u32,
}

/// Dense `n_ref x n_target` vote counts.
pub(crate) struct VoteMatrix {
    votes: Vec<u32>,
    n_target: usize,
}

impl VoteMatrix {
    pub fn new(n_ref: usize, n_target: usize) -> Self {
        Self {
            votes: vec![0; n_ref * n_target],
            n_target,
        }
    }

    #[inline]
    pub fn increment(&mut self, ref_idx: usize, target_idx: usize) {
        self.votes[ref_idx * self.n_target + target_idx] += 1;
    }

    fn entries(&self) -> impl Iterator<Item = PointMatch> + '_ {
        self.votes
            .iter()
            .enumerate()
            .filter(|&(_, &votes)| votes > 0)
            .map(|(i, &votes)| PointMatch {
                ref_idx: i / self.n_target,
                target_idx: i % self.n_target,
                votes,
            })
    }
}

/// Reference triangles sorted by their first ratio for windowed lookup.
pub(crate) struct TriangleIndex {
    triangles: Vec<Triangle>,
}

impl TriangleIndex {
    pub fn new(mut triangles: Vec<Triangle>) -> Self {
        triangles.sort_by(|a, b| a.ratios.0.total_cmp(&b.ratios.0));
        Self { triangles }
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Triangles whose first ratio lies within `tolerance` of `ratio`.
    pub fn window(&self, ratio: f64, tolerance: f64) -> &[Triangle] {
        let start = self
            .triangles
            .partition_point(|t| t.ratios.0 <= ratio - tolerance);
        let end = self
            .triangles
            .partition_point(|t| t.ratios.0 < ratio + tolerance);
        &self.triangles[start..end.max(start)]
    }
}

/// Every similar triangle pair votes for its three vertex pairings.
pub(crate) fn vote_for_correspondences(
    reference: &TriangleIndex,
    target_triangles: &[Triangle],
    config: &TriangleMatchConfig,
    n_ref: usize,
    n_target: usize,
) -> VoteMatrix {
    let mut matrix = VoteMatrix::new(n_ref, n_target);
    for target in target_triangles {
        for candidate in reference.window(target.ratios.0, config.ratio_tolerance) {
            if !candidate.is_similar(target, config.ratio_tolerance) {
                continue;
            }
            if config.check_orientation && candidate.orientation != target.orientation {
                continue;
            }
            for (&r, &t) in candidate.vertices.iter().zip(target.vertices.iter()) {
                matrix.increment(r, t);
            }
        }
    }
    matrix
}

/// Greedy one-to-one assignment, highest vote counts first.
///
/// Pairs below `min_votes` are dropped. Equal vote counts resolve by
/// reference index, then target index.
pub(crate) fn resolve_matches(
    matrix: &VoteMatrix,
    n_ref: usize,
    n_target: usize,
    min_votes: u32,
) -> Vec<PointMatch> {
    let mut candidates: Vec<PointMatch> =
        matrix.entries().filter(|m| m.votes >= min_votes).collect();
    candidates.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(a.ref_idx.cmp(&b.ref_idx))
            .then(a.target_idx.cmp(&b.target_idx))
    });

    let mut used_ref = vec![false; n_ref];
    let mut used_target = vec![false; n_target];
    let mut resolved = Vec::new();
    for m in candidates {
        if used_ref[m.ref_idx] || used_target[m.target_idx] {
            continue;
        }
        used_ref[m.ref_idx] = true;
        used_target[m.target_idx] = true;
        resolved.push(m);
    }
    resolved
}

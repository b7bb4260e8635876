//! Triangle (asterism) matching between two star lists.
//!
//! Triangles are formed from each star and pairs of its nearest neighbours
//! and described by their side ratios, which do not change under
//! translation, rotation or uniform scale. Similar triangle pairs vote for
//! the star correspondences they imply; the strongest consistent votes win.

mod geometry;
mod voting;

use glam::DVec2;

use crate::registration::config::TriangleMatchConfig;

pub(crate) use geometry::{Orientation, Triangle, form_triangles};
pub use voting::PointMatch;
pub(crate) use voting::{TriangleIndex, resolve_matches, vote_for_correspondences};

/// Triangles of a reference star list, ready for repeated matching.
pub(crate) struct ReferencePattern {
    count: usize,
    index: TriangleIndex,
}

impl ReferencePattern {
    pub fn new(positions: &[DVec2], config: &TriangleMatchConfig) -> Self {
        Self {
            count: positions.len(),
            index: TriangleIndex::new(form_triangles(positions, config.neighbours)),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.index.len()
    }

    /// Matches `target` positions against the reference stars.
    pub fn match_points(&self, target: &[DVec2], config: &TriangleMatchConfig) -> Vec<PointMatch> {
        if self.count < 3 || target.len() < 3 || self.index.is_empty() {
            return Vec::new();
        }
        let target_triangles = form_triangles(target, config.neighbours);
        if target_triangles.is_empty() {
            return Vec::new();
        }
        let votes = vote_for_correspondences(
            &self.index,
            &target_triangles,
            config,
            self.count,
            target.len(),
        );
        resolve_matches(&votes, self.count, target.len(), config.min_votes)
    }
}

/// Matches two star lists through similar triangles.
pub fn match_triangles(
    reference: &[DVec2],
    target: &[DVec2],
    config: &TriangleMatchConfig,
) -> Vec<PointMatch> {
    ReferencePattern::new(reference, config).match_points(target, config)
}

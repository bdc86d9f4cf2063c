// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Matching of features between the two images of a stereo pair,
//! and between two consecutive left images.
//!
//! Matches returned by the vision primitives are filtered by descriptor
//! distance, then by geometry (stereo) or by spatial distribution (temporal).
//! Indices of every returned match are valid in both feature sets.

use log::warn;

use crate::core::config::Config;
use crate::core::features::{FeatureSet, Keypoint, VisionPrimitives};
use crate::misc::type_aliases::Float;

/// Pairing of a query feature with a train feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Index in the query feature set.
    pub query_idx: usize,
    /// Index in the train feature set.
    pub train_idx: usize,
    /// Descriptor distance, lower is better.
    pub distance: Float,
}

impl Match {
    /// Create a match.
    pub fn new(query_idx: usize, train_idx: usize, distance: Float) -> Self {
        Match {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// Keep matches whose distance is at most `threshold`.
pub fn filter_by_distance(matches: Vec<Match>, threshold: Float) -> Vec<Match> {
    matches
        .into_iter()
        .filter(|m| m.distance <= threshold)
        .collect()
}

/// Discard matches referring to features that do not exist.
pub fn discard_out_of_range(matches: Vec<Match>, nb_query: usize, nb_train: usize) -> Vec<Match> {
    let total = matches.len();
    let valid: Vec<Match> = matches
        .into_iter()
        .filter(|m| m.query_idx < nb_query && m.train_idx < nb_train)
        .collect();
    if valid.len() < total {
        warn!(
            "discarded {} matches with out of range indices",
            total - valid.len()
        );
    }
    valid
}

/// Keep at most one match per train feature, the one of lowest distance.
/// The first one wins ties.
pub fn unique_train(matches: Vec<Match>, nb_train: usize) -> Vec<Match> {
    let mut best: Vec<Option<usize>> = vec![None; nb_train];
    for (i, m) in matches.iter().enumerate() {
        match best[m.train_idx] {
            Some(j) if matches[j].distance <= m.distance => {}
            _ => best[m.train_idx] = Some(i),
        }
    }
    let mut kept: Vec<usize> = best.into_iter().flatten().collect();
    kept.sort_unstable();
    kept.into_iter().map(|i| matches[i]).collect()
}

/// Regular partition of the image domain into `x_count * y_count` cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPartition {
    width: usize,
    height: usize,
    x_count: usize,
    y_count: usize,
}

impl GridPartition {
    /// Partition of a `width` x `height` image. Counts are at least 1.
    pub fn new(width: usize, height: usize, x_count: usize, y_count: usize) -> Self {
        GridPartition {
            width,
            height,
            x_count: x_count.max(1),
            y_count: y_count.max(1),
        }
    }

    /// `(width, height)` of the partitioned image.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.x_count * self.y_count
    }

    /// Index of the cell containing a point, `None` outside of the image.
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_of(&self, x: Float, y: Float) -> Option<usize> {
        let (w, h) = (self.width as Float, self.height as Float);
        if !(x >= 0.0 && y >= 0.0 && x < w && y < h) {
            return None;
        }
        let col = ((x * self.x_count as Float / w) as usize).min(self.x_count - 1);
        let row = ((y * self.y_count as Float / h) as usize).min(self.y_count - 1);
        Some(row * self.x_count + col)
    }

    /// Cell of a keypoint.
    pub fn cell_of_keypoint(&self, keypoint: &Keypoint) -> Option<usize> {
        self.cell_of(keypoint.x, keypoint.y)
    }
}

/// Keep the lowest distance match of each cell,
/// cells being those of the query keypoints. The first one wins ties.
pub fn grid_sample(matches: &[Match], query: &[Keypoint], grid: &GridPartition) -> Vec<Match> {
    let mut cells: Vec<Option<Match>> = vec![None; grid.cell_count()];
    for m in matches {
        let cell = match query.get(m.query_idx).and_then(|kp| grid.cell_of_keypoint(kp)) {
            Some(cell) => cell,
            None => continue,
        };
        match cells[cell] {
            Some(best) if best.distance <= m.distance => {}
            _ => cells[cell] = Some(*m),
        }
    }
    cells.into_iter().flatten().collect()
}

/// Match left features (query) to right features (train) of a rectified pair.
///
/// Accepted matches are on the same row up to `stereo_max_row_offset`
/// and have a disparity of at least `min_disparity`.
pub fn stereo_match<P: VisionPrimitives + ?Sized>(
    primitives: &P,
    left: &FeatureSet,
    right: &FeatureSet,
    config: &Config,
) -> Vec<Match> {
    let matches = primitives.match_descriptors(left.descriptors(), right.descriptors());
    let matches = discard_out_of_range(matches, left.len(), right.len());
    let matches = filter_by_distance(matches, config.match_distance_threshold);
    let matches = matches
        .into_iter()
        .filter(|m| {
            let (l, r) = (left.keypoint(m.query_idx), right.keypoint(m.train_idx));
            (l.y - r.y).abs() <= config.stereo_max_row_offset
                && l.x - r.x >= config.min_disparity
        })
        .collect();
    unique_train(matches, right.len())
}

/// Match current left features (query) to previous left features (train),
/// keeping at most one match per grid cell of the current image.
pub fn temporal_match<P: VisionPrimitives + ?Sized>(
    primitives: &P,
    previous: &FeatureSet,
    current: &FeatureSet,
    grid: &GridPartition,
    config: &Config,
) -> Vec<Match> {
    let matches = primitives.match_descriptors(current.descriptors(), previous.descriptors());
    let matches = discard_out_of_range(matches, current.len(), previous.len());
    let matches = filter_by_distance(matches, config.match_distance_threshold);
    let matches = unique_train(matches, previous.len());
    grid_sample(&matches, current.keypoints(), grid)
}

// TESTS #############################################################

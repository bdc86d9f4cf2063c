// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Vision primitives implemented in this crate.

use nalgebra::DMatrix;

use crate::core::correspondence::Match;
use crate::core::features::brief::{self, Brief};
use crate::core::features::disparity::BlockMatcher;
use crate::core::features::harris::HarrisDetector;
use crate::core::features::{Keypoint, VisionPrimitives};
use crate::misc::type_aliases::Float;

/// Harris corners, BRIEF descriptors, Hamming brute force matching
/// and SAD block matching stereo.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativePrimitives {
    /// Corner detector.
    pub detector: HarrisDetector,
    /// Descriptor extractor.
    pub descriptor: Brief,
    /// Dense stereo matcher.
    pub block_matcher: BlockMatcher,
    /// Keep only mutual nearest neighbors when matching descriptors.
    pub cross_check: bool,
}

impl NativePrimitives {
    /// Default primitives with mutual nearest neighbor matching.
    pub fn new() -> Self {
        NativePrimitives {
            cross_check: true,
            ..Default::default()
        }
    }
}

impl VisionPrimitives for NativePrimitives {
    fn detect(&self, image: &DMatrix<u8>) -> Vec<Keypoint> {
        self.detector.detect(image)
    }

    fn describe(&self, image: &DMatrix<u8>, keypoints: &[Keypoint]) -> DMatrix<u8> {
        self.descriptor.describe(image, keypoints)
    }

    fn match_descriptors(&self, query: &DMatrix<u8>, train: &DMatrix<u8>) -> Vec<Match> {
        brief::brute_force_match(query, train, self.cross_check)
    }

    fn compute_disparity(&self, left: &DMatrix<u8>, right: &DMatrix<u8>) -> DMatrix<Float> {
        self.block_matcher.compute(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::extract;

    /// Bright squares on a dark background, offset by `shift` columns.
    fn squares(shift: usize) -> DMatrix<u8> {
        DMatrix::from_fn(120, 160, |r, c| {
            let c = c + shift;
            if (r / 20 + c / 20) % 2 == 0 && r > 20 && r < 100 && c > 20 && c < 140 {
                220
            } else {
                30
            }
        })
    }

    #[test]
    fn stereo_pair_matches_along_rows() {
        let primitives = NativePrimitives::new();
        let left = extract(&primitives, &squares(0), 100).unwrap();
        let right = extract(&primitives, &squares(4), 100).unwrap();
        assert!(!left.is_empty());
        let matches = primitives.match_descriptors(left.descriptors(), right.descriptors());
        assert!(!matches.is_empty());
        let exact = matches
            .iter()
            .filter(|m| m.distance == 0.0)
            .filter(|m| {
                let (l, r) = (left.keypoint(m.query_idx), right.keypoint(m.train_idx));
                l.y == r.y && (l.x - r.x - 4.0).abs() < 1e-9
            })
            .count();
        assert!(exact > 0);
    }
}

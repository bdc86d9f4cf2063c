// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dense disparity by block matching on a rectified pair.
//!
//! The cost of disparity `d` at left pixel `(r, c)` is the sum of absolute
//! differences between the window around `(r, c)` in the left image
//! and the window around `(r, c - d)` in the right image.
//! The winning disparity is refined to sub-pixel precision
//! with a parabola through its neighboring costs.

use nalgebra::DMatrix;

use crate::core::features::filter::IntegralImage;
use crate::misc::type_aliases::Float;

/// Value of pixels without a reliable disparity.
pub const INVALID: Float = -1.0;

/// Sum of absolute differences block matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatcher {
    /// Largest disparity searched (pixels).
    pub max_disparity: usize,
    /// Radius of the matching window.
    pub window_radius: usize,
    /// The best cost must beat every non adjacent disparity by this ratio.
    pub uniqueness_ratio: Float,
}

impl Default for BlockMatcher {
    fn default() -> Self {
        BlockMatcher {
            max_disparity: 64,
            window_radius: 3,
            uniqueness_ratio: 0.1,
        }
    }
}

/// Best and runner-up costs of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    disparity: usize,
    cost: Float,
    before: Float,
    after: Float,
    runner_up: Float,
}

impl Default for Candidate {
    fn default() -> Self {
        Candidate {
            disparity: 0,
            cost: Float::INFINITY,
            before: Float::INFINITY,
            after: Float::INFINITY,
            runner_up: Float::INFINITY,
        }
    }
}

impl BlockMatcher {
    /// Disparity of every left pixel, `INVALID` where unknown.
    pub fn compute(&self, left: &DMatrix<u8>, right: &DMatrix<u8>) -> DMatrix<Float> {
        let (nrows, ncols) = left.shape();
        let radius = self.window_radius;
        let mut disparity = DMatrix::from_element(nrows, ncols, INVALID);
        if right.shape() != left.shape() || nrows <= 2 * radius || ncols <= 2 * radius {
            return disparity;
        }
        let mut best = DMatrix::from_element(nrows, ncols, Candidate::default());

        // First pass: winner take all.
        for d in 0..=self.max_disparity {
            self.for_each_cost(left, right, d, |r, c, cost| {
                let candidate = &mut best[(r, c)];
                if cost < candidate.cost {
                    candidate.cost = cost;
                    candidate.disparity = d;
                }
            });
        }

        // Second pass: neighbors of the winner and best non adjacent cost.
        for d in 0..=self.max_disparity {
            self.for_each_cost(left, right, d, |r, c, cost| {
                let candidate = &mut best[(r, c)];
                let winner = candidate.disparity;
                if d + 1 == winner {
                    candidate.before = cost;
                } else if d == winner + 1 {
                    candidate.after = cost;
                } else if d != winner {
                    candidate.runner_up = candidate.runner_up.min(cost);
                }
            });
        }

        for ((r, c), candidate) in best
            .iter()
            .enumerate()
            .map(|(i, cand)| ((i % nrows, i / nrows), cand))
        {
            if candidate.cost.is_finite() && self.is_unique(candidate) {
                disparity[(r, c)] = candidate.disparity as Float + subpixel_offset(candidate);
            }
        }
        disparity
    }

    fn is_unique(&self, candidate: &Candidate) -> bool {
        candidate.runner_up > candidate.cost * (1.0 + self.uniqueness_ratio)
    }

    /// Call `f(r, c, cost)` for every pixel whose matching windows
    /// are fully inside both images at disparity `d`.
    fn for_each_cost<F>(&self, left: &DMatrix<u8>, right: &DMatrix<u8>, d: usize, mut f: F)
    where
        F: FnMut(usize, usize, Float),
    {
        let (nrows, ncols) = left.shape();
        let radius = self.window_radius;
        if ncols <= d + 2 * radius {
            return;
        }
        let diff = DMatrix::from_fn(nrows, ncols, |r, c| {
            if c >= d {
                (Float::from(left[(r, c)]) - Float::from(right[(r, c - d)])).abs()
            } else {
                0.0
            }
        });
        let integral = IntegralImage::new(&diff);
        for c in d + radius..ncols - radius {
            for r in radius..nrows - radius {
                f(r, c, integral.block_sum(r - radius, c - radius, r + radius, c + radius));
            }
        }
    }
}

/// Parabolic interpolation of the cost minimum, in `[-0.5, 0.5]`.
fn subpixel_offset(candidate: &Candidate) -> Float {
    let (before, after) = (candidate.before, candidate.after);
    if !before.is_finite() || !after.is_finite() {
        return 0.0;
    }
    let curvature = before - 2.0 * candidate.cost + after;
    if curvature <= 0.0 {
        return 0.0;
    }
    (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn shifted_texture_gives_its_shift() {
        let mut rng = StdRng::seed_from_u64(11);
        let left: DMatrix<u8> = DMatrix::from_fn(40, 80, |_, _| rng.gen());
        let right = DMatrix::from_fn(40, 80, |r, c| left[(r, (c + 7).min(79))]);
        let matcher = BlockMatcher {
            max_disparity: 16,
            ..BlockMatcher::default()
        };
        let disparity = matcher.compute(&left, &right);
        let radius = matcher.window_radius;
        for c in matcher.max_disparity + radius..80 - radius {
            for r in radius..40 - radius {
                assert!((disparity[(r, c)] - 7.0).abs() < 0.5, "at ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn textureless_pair_is_invalid() {
        let flat = DMatrix::from_element(30, 50, 90);
        let disparity = BlockMatcher::default().compute(&flat, &flat);
        assert!(disparity.iter().all(|&d| d == INVALID));
    }

    #[test]
    fn subpixel_offset_points_to_the_lower_side() {
        let candidate = Candidate {
            disparity: 5,
            cost: 1.0,
            before: 2.0,
            after: 4.0,
            runner_up: 10.0,
        };
        let offset = subpixel_offset(&candidate);
        assert!(offset < 0.0 && offset > -0.5);
    }
}

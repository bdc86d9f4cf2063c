// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! BRIEF binary descriptors and brute force Hamming matching.

use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::core::correspondence::Match;
use crate::core::features::{filter, Keypoint};
use crate::misc::type_aliases::Float;

/// Number of intensity comparisons of a descriptor.
pub const NB_BITS: usize = 256;

/// Number of bytes of a descriptor.
pub const NB_BYTES: usize = NB_BITS / 8;

type Offset = (isize, isize);

/// BRIEF descriptor extractor with a fixed random sampling pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Brief {
    pairs: Vec<(Offset, Offset)>,
    smoothing_radius: usize,
}

impl Default for Brief {
    fn default() -> Self {
        Brief::new(15, 2, 0x5eed)
    }
}

impl Brief {
    /// Pattern of `NB_BITS` point pairs drawn uniformly in a square patch.
    /// The same seed always gives the same pattern.
    pub fn new(patch_radius: usize, smoothing_radius: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let r = patch_radius as isize;
        let mut offset = || (rng.gen_range(-r..=r), rng.gen_range(-r..=r));
        let pairs = (0..NB_BITS).map(|_| (offset(), offset())).collect();
        Brief {
            pairs,
            smoothing_radius,
        }
    }

    /// One `NB_BYTES` row per keypoint.
    ///
    /// Samples falling outside of the image are clamped to its border,
    /// so every keypoint gets a descriptor.
    pub fn describe(&self, image: &DMatrix<u8>, keypoints: &[Keypoint]) -> DMatrix<u8> {
        let smooth = filter::box_mean(&filter::to_float(image), self.smoothing_radius);
        let mut descriptors = DMatrix::zeros(keypoints.len(), NB_BYTES);
        for (i, kp) in keypoints.iter().enumerate() {
            let center = (kp.y.round() as isize, kp.x.round() as isize);
            for (bit, &(a, b)) in self.pairs.iter().enumerate() {
                if sample(&smooth, center, a) < sample(&smooth, center, b) {
                    descriptors[(i, bit / 8)] |= 1 << (bit % 8);
                }
            }
        }
        descriptors
    }
}

fn sample(smooth: &DMatrix<Float>, (row, col): (isize, isize), (dx, dy): Offset) -> Float {
    let r = (row + dy).clamp(0, smooth.nrows() as isize - 1) as usize;
    let c = (col + dx).clamp(0, smooth.ncols() as isize - 1) as usize;
    smooth[(r, c)]
}

/// Number of differing bits between two descriptor rows.
pub fn hamming<'a, I, J>(a: I, b: J) -> u32
where
    I: IntoIterator<Item = &'a u8>,
    J: IntoIterator<Item = &'a u8>,
{
    a.into_iter()
        .zip(b)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// Nearest train row (in Hamming distance) of every query row.
///
/// With `cross_check`, a match is kept only if the query row is also
/// the nearest query row of its train row.
/// Ties are resolved in favor of the lowest index.
pub fn brute_force_match(query: &DMatrix<u8>, train: &DMatrix<u8>, cross_check: bool) -> Vec<Match> {
    if query.ncols() != train.ncols() || query.nrows() == 0 || train.nrows() == 0 {
        return Vec::new();
    }
    let distances = DMatrix::from_fn(query.nrows(), train.nrows(), |q, t| {
        hamming(query.row(q).iter(), train.row(t).iter())
    });
    let best_train: Vec<usize> = (0..query.nrows())
        .map(|q| argmin(distances.row(q).iter().cloned()))
        .collect();
    let best_query: Vec<usize> = (0..train.nrows())
        .map(|t| argmin(distances.column(t).iter().cloned()))
        .collect();
    best_train
        .iter()
        .enumerate()
        .filter(|&(q, &t)| !cross_check || best_query[t] == q)
        .map(|(q, &t)| Match::new(q, t, Float::from(distances[(q, t)])))
        .collect()
}

fn argmin<I: Iterator<Item = u32>>(values: I) -> usize {
    let mut best = (0, u32::MAX);
    for (i, v) in values.enumerate() {
        if v < best.1 {
            best = (i, v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(nrows: usize, ncols: usize, seed: u64) -> DMatrix<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        DMatrix::from_fn(nrows, ncols, |_, _| rng.gen())
    }

    #[test]
    fn pattern_is_deterministic() {
        assert_eq!(Brief::new(15, 2, 7), Brief::new(15, 2, 7));
        assert_ne!(Brief::new(15, 2, 7), Brief::new(15, 2, 8));
    }

    #[test]
    fn one_row_per_keypoint_even_on_the_border() {
        let image = textured(40, 50, 1);
        let keypoints = [Keypoint::new(0.0, 0.0, 1.0), Keypoint::new(25.0, 20.0, 1.0)];
        let descriptors = Brief::default().describe(&image, &keypoints);
        assert_eq!(descriptors.shape(), (2, NB_BYTES));
    }

    #[test]
    fn hamming_counts_bits() {
        assert_eq!(hamming(&[0b1010_1010_u8, 0], &[0b0101_0101_u8, 1]), 9);
        assert_eq!(hamming(&[3_u8], &[3_u8]), 0);
    }

    #[test]
    fn translated_patches_match_each_other() {
        let image = textured(80, 100, 3);
        let shifted = DMatrix::from_fn(80, 100, |r, c| image[(r, (c + 5).min(99))]);
        let brief = Brief::default();
        let keypoints: Vec<_> = (0..4)
            .map(|i| Keypoint::new(30.0 + 10.0 * i as Float, 40.0, 1.0))
            .collect();
        let moved: Vec<_> = keypoints
            .iter()
            .map(|kp| Keypoint::new(kp.x - 5.0, kp.y, 1.0))
            .collect();
        let query = brief.describe(&image, &keypoints);
        let train = brief.describe(&shifted, &moved);
        let matches = brute_force_match(&query, &train, true);
        assert_eq!(matches.len(), 4);
        for m in matches {
            assert_eq!(m.query_idx, m.train_idx);
            assert_eq!(m.distance, 0.0);
        }
    }

    #[test]
    fn incompatible_descriptors_do_not_match() {
        let query = DMatrix::zeros(3, 32);
        let train = DMatrix::zeros(3, 16);
        assert!(brute_force_match(&query, &train, false).is_empty());
    }
}

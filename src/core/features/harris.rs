// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Harris corner detector.
//!
//! The structure tensor of the image gradients is accumulated over a box
//! window, and the corner response is `R = det(M) - k * trace(M)^2`.
//! Corners are the local maxima of R above a fraction of the strongest response.

use nalgebra::DMatrix;

use crate::core::features::{filter, Keypoint};
use crate::misc::type_aliases::Float;

/// Parameters of the Harris detector.
#[derive(Debug, Clone, PartialEq)]
pub struct HarrisDetector {
    /// Harris sensitivity parameter, usually in [0.04, 0.06].
    pub k: Float,
    /// Radius of the box window accumulating the structure tensor.
    pub window_radius: usize,
    /// Keep responses higher than this fraction of the maximum response.
    pub relative_threshold: Float,
    /// No corner is detected closer than this to the image border.
    pub border: usize,
}

impl Default for HarrisDetector {
    fn default() -> Self {
        HarrisDetector {
            k: 0.04,
            window_radius: 2,
            relative_threshold: 0.01,
            border: 16,
        }
    }
}

impl HarrisDetector {
    /// Harris response of every pixel.
    pub fn response(&self, image: &DMatrix<u8>) -> DMatrix<Float> {
        let (gx, gy) = filter::gradients(&filter::to_float(image));
        let sxx = filter::box_sum(&gx.component_mul(&gx), self.window_radius);
        let syy = filter::box_sum(&gy.component_mul(&gy), self.window_radius);
        let sxy = filter::box_sum(&gx.component_mul(&gy), self.window_radius);
        DMatrix::from_fn(image.nrows(), image.ncols(), |r, c| {
            let (a, b, d) = (sxx[(r, c)], syy[(r, c)], sxy[(r, c)]);
            let trace = a + b;
            a * b - d * d - self.k * trace * trace
        })
    }

    /// Detect corners, in raster order.
    #[allow(clippy::cast_precision_loss)]
    pub fn detect(&self, image: &DMatrix<u8>) -> Vec<Keypoint> {
        let (nrows, ncols) = image.shape();
        let border = self.border.max(1);
        if nrows <= 2 * border || ncols <= 2 * border {
            return Vec::new();
        }
        let response = self.response(image);
        let mut max_response: Float = 0.0;
        for c in border..ncols - border {
            for r in border..nrows - border {
                max_response = max_response.max(response[(r, c)]);
            }
        }
        // A flat image has no positive response.
        if max_response <= 0.0 {
            return Vec::new();
        }
        let threshold = self.relative_threshold * max_response;
        let mut keypoints = Vec::new();
        for r in border..nrows - border {
            for c in border..ncols - border {
                let value = response[(r, c)];
                if value > threshold && is_local_max(&response, r, c) {
                    keypoints.push(Keypoint::new(c as Float, r as Float, value));
                }
            }
        }
        keypoints
    }
}

/// 3x3 non maximum suppression.
/// On plateaus, only the first pixel in raster order survives.
fn is_local_max(response: &DMatrix<Float>, r: usize, c: usize) -> bool {
    let value = response[(r, c)];
    for nr in r - 1..=r + 1 {
        for nc in c - 1..=c + 1 {
            let neighbor = response[(nr, nc)];
            let before = nr < r || (nr == r && nc < c);
            let after = nr > r || (nr == r && nc > c);
            if (before && neighbor >= value) || (after && neighbor > value) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four squares of 20 pixels meeting at (40, 40).
    fn checker() -> DMatrix<u8> {
        DMatrix::from_fn(80, 80, |r, c| {
            if (r < 40) ^ (c < 40) {
                200
            } else {
                20
            }
        })
    }

    #[test]
    fn flat_image_has_no_corner() {
        let image = DMatrix::from_element(64, 64, 128);
        assert!(HarrisDetector::default().detect(&image).is_empty());
    }

    #[test]
    fn checker_junction_is_detected() {
        let keypoints = HarrisDetector::default().detect(&checker());
        assert!(!keypoints.is_empty());
        let strongest = keypoints
            .iter()
            .max_by(|a, b| a.response.partial_cmp(&b.response).unwrap())
            .unwrap();
        assert!((strongest.x - 39.5).abs() <= 1.5);
        assert!((strongest.y - 39.5).abs() <= 1.5);
    }

    #[test]
    fn straight_edge_is_not_a_corner() {
        let image = DMatrix::from_fn(64, 64, |_, c| if c < 32 { 10 } else { 240 });
        assert!(HarrisDetector::default().detect(&image).is_empty());
    }

    #[test]
    fn keypoints_respect_the_border() {
        let detector = HarrisDetector::default();
        for kp in detector.detect(&checker()) {
            assert!(kp.x >= detector.border as Float && kp.x < (80 - detector.border) as Float);
            assert!(kp.y >= detector.border as Float && kp.y < (80 - detector.border) as Float);
        }
    }

    #[test]
    fn plateau_keeps_a_single_maximum() {
        let mut response = DMatrix::zeros(5, 5);
        response[(2, 2)] = 1.0;
        response[(2, 3)] = 1.0;
        assert!(is_local_max(&response, 2, 2));
        assert!(!is_local_max(&response, 2, 3));
    }
}

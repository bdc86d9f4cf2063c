// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image filters shared by the native primitives.

use nalgebra::DMatrix;

use crate::misc::type_aliases::Float;

/// Convert an intensity image into a float matrix.
pub fn to_float(image: &DMatrix<u8>) -> DMatrix<Float> {
    image.map(Float::from)
}

/// Centered differences along columns (x) and rows (y).
/// Gradients are zero on the image border.
pub fn gradients(image: &DMatrix<Float>) -> (DMatrix<Float>, DMatrix<Float>) {
    let (nrows, ncols) = image.shape();
    let mut gx = DMatrix::zeros(nrows, ncols);
    let mut gy = DMatrix::zeros(nrows, ncols);
    for c in 1..ncols.saturating_sub(1) {
        for r in 1..nrows.saturating_sub(1) {
            gx[(r, c)] = 0.5 * (image[(r, c + 1)] - image[(r, c - 1)]);
            gy[(r, c)] = 0.5 * (image[(r + 1, c)] - image[(r - 1, c)]);
        }
    }
    (gx, gy)
}

/// Summed area table with one extra leading row and column of zeros.
pub struct IntegralImage {
    sums: DMatrix<Float>,
}

impl IntegralImage {
    /// Build the summed area table of a matrix.
    pub fn new(mat: &DMatrix<Float>) -> Self {
        let (nrows, ncols) = mat.shape();
        let mut sums = DMatrix::zeros(nrows + 1, ncols + 1);
        for c in 0..ncols {
            for r in 0..nrows {
                sums[(r + 1, c + 1)] =
                    mat[(r, c)] + sums[(r, c + 1)] + sums[(r + 1, c)] - sums[(r, c)];
            }
        }
        IntegralImage { sums }
    }

    /// Sum over the inclusive block of rows `r0..=r1` and columns `c0..=c1`.
    pub fn block_sum(&self, r0: usize, c0: usize, r1: usize, c1: usize) -> Float {
        self.sums[(r1 + 1, c1 + 1)] - self.sums[(r0, c1 + 1)] - self.sums[(r1 + 1, c0)]
            + self.sums[(r0, c0)]
    }

    /// Sum and number of pixels of the window of given radius,
    /// clamped to the matrix boundaries.
    fn window(&self, r: usize, c: usize, radius: usize) -> (Float, usize) {
        let (nrows, ncols) = (self.sums.nrows() - 1, self.sums.ncols() - 1);
        let (r0, r1) = (r.saturating_sub(radius), (r + radius).min(nrows - 1));
        let (c0, c1) = (c.saturating_sub(radius), (c + radius).min(ncols - 1));
        let count = (r1 - r0 + 1) * (c1 - c0 + 1);
        (self.block_sum(r0, c0, r1, c1), count)
    }
}

/// Sum over a square window of side `2 * radius + 1` around each pixel.
pub fn box_sum(mat: &DMatrix<Float>, radius: usize) -> DMatrix<Float> {
    let integral = IntegralImage::new(mat);
    DMatrix::from_fn(mat.nrows(), mat.ncols(), |r, c| integral.window(r, c, radius).0)
}

/// Mean over a square window of side `2 * radius + 1` around each pixel.
#[allow(clippy::cast_precision_loss)]
pub fn box_mean(mat: &DMatrix<Float>, radius: usize) -> DMatrix<Float> {
    let integral = IntegralImage::new(mat);
    DMatrix::from_fn(mat.nrows(), mat.ncols(), |r, c| {
        let (sum, count) = integral.window(r, c, radius);
        sum / count as Float
    })
}

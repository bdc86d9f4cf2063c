// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image and matrix types.

use image::GrayImage;
use nalgebra::DMatrix;

use crate::misc::type_aliases::Float;

/// Convert a `GrayImage` into an `u8` matrix.
///
/// The image buffer is row major, the matrix keeps the image orientation.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Convert a row major 16 bits disparity buffer into a disparity matrix.
///
/// Uses the KITTI convention: `disparity = value / scale`,
/// and 0 encodes an invalid disparity (mapped to -1).
pub fn disparity_from_u16(width: usize, height: usize, buffer: &[u16], scale: Float) -> DMatrix<Float> {
    DMatrix::from_row_slice(height, width, buffer).map(|v| match v {
        0 => -1.0,
        _ => Float::from(v) / scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_to_matrix_keeps_orientation() {
        let img = GrayImage::from_fn(5, 3, |x, y| image::Luma([(10 * y + x) as u8]));
        let mat = matrix_from_image(img);
        assert_eq!(mat.shape(), (3, 5));
        assert_eq!(mat[(2, 4)], 24);
        assert_eq!(mat[(0, 1)], 1);
    }

    #[test]
    fn zero_disparity_is_invalid() {
        let disparity = disparity_from_u16(2, 1, &[0, 512], 256.0);
        assert_eq!(disparity[(0, 0)], -1.0);
        assert_eq!(disparity[(0, 1)], 2.0);
    }
}

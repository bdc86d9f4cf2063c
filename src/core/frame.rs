// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Borrowed image buffers of one timestep.

use nalgebra::DMatrix;

use crate::core::error::VoError;
use crate::misc::type_aliases::Float;

/// Images of one timestep, borrowed for the duration of one update.
///
/// Images are intensity matrices with one row per image line.
/// A frame without right image must carry a disparity map
/// (aligned with the left image) so that depth can be recovered.
#[derive(Debug, Clone, Copy)]
pub struct StereoFrame<'a> {
    /// Left (reference) image.
    pub left: &'a DMatrix<u8>,
    /// Right image of the rectified pair.
    pub right: Option<&'a DMatrix<u8>>,
    /// Precomputed disparity of the left image, non positive values are invalid.
    pub disparity: Option<&'a DMatrix<Float>>,
}

impl<'a> StereoFrame<'a> {
    /// A rectified stereo pair.
    pub fn stereo(left: &'a DMatrix<u8>, right: &'a DMatrix<u8>) -> Self {
        StereoFrame {
            left,
            right: Some(right),
            disparity: None,
        }
    }

    /// A single image with an externally computed disparity map.
    pub fn monocular(left: &'a DMatrix<u8>, disparity: &'a DMatrix<Float>) -> Self {
        StereoFrame {
            left,
            right: None,
            disparity: Some(disparity),
        }
    }

    /// Attach a precomputed disparity map, skipping its computation.
    pub fn with_disparity(self, disparity: &'a DMatrix<Float>) -> Self {
        StereoFrame {
            disparity: Some(disparity),
            ..self
        }
    }

    /// `(width, height)` of the frame.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.left.ncols(), self.left.nrows())
    }

    /// Check the frame preconditions: non empty buffers of identical shapes,
    /// and at least one source of depth.
    pub fn validate(&self) -> Result<(), VoError> {
        let expected = self.left.shape();
        if expected.0 == 0 || expected.1 == 0 {
            return Err(VoError::EmptyImage("left"));
        }
        if let Some(right) = self.right {
            if right.shape() != expected {
                return Err(VoError::SizeMismatch {
                    what: "right image",
                    expected,
                    found: right.shape(),
                });
            }
        }
        if let Some(disparity) = self.disparity {
            if disparity.shape() != expected {
                return Err(VoError::SizeMismatch {
                    what: "disparity map",
                    expected,
                    found: disparity.shape(),
                });
            }
        }
        if self.right.is_none() && self.disparity.is_none() {
            return Err(VoError::MissingDepthSource);
        }
        Ok(())
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Feature layer: keypoints, descriptors and the vision primitives they come from.
//!
//! Detection, description, matching and dense stereo are consumed
//! through the `VisionPrimitives` trait, so that the odometry can run
//! on top of any implementation of those primitives.
//! `native::NativePrimitives` is the one provided by this crate.

pub mod brief;
pub mod disparity;
pub mod filter;
pub mod harris;
pub mod native;

use log::trace;
use nalgebra::DMatrix;
use std::cmp::Ordering;

use crate::core::correspondence::Match;
use crate::core::error::VoError;
use crate::misc::type_aliases::{Float, Point2};

/// A detected image location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Column coordinate (pixels).
    pub x: Float,
    /// Row coordinate (pixels).
    pub y: Float,
    /// Detector response, higher is stronger.
    pub response: Float,
}

impl Keypoint {
    /// Create a keypoint.
    pub fn new(x: Float, y: Float, response: Float) -> Self {
        Keypoint { x, y, response }
    }

    /// Image coordinates of the keypoint.
    pub fn point(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Capabilities the odometry needs from a computer vision toolkit.
///
/// Implementations are treated as stateless and reentrant.
pub trait VisionPrimitives {
    /// Detect keypoints in an image. May return an empty vector.
    fn detect(&self, image: &DMatrix<u8>) -> Vec<Keypoint>;

    /// Compute one descriptor row per keypoint, in the same order.
    fn describe(&self, image: &DMatrix<u8>, keypoints: &[Keypoint]) -> DMatrix<u8>;

    /// Match each query descriptor row to at most one train descriptor row.
    fn match_descriptors(&self, query: &DMatrix<u8>, train: &DMatrix<u8>) -> Vec<Match>;

    /// Dense disparity of the left image of a rectified pair.
    /// Non positive values mean "unknown".
    fn compute_disparity(&self, left: &DMatrix<u8>, right: &DMatrix<u8>) -> DMatrix<Float>;
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: DMatrix<u8>,
}

impl FeatureSet {
    /// Build a feature set, checking that there is exactly one descriptor row per keypoint.
    pub fn new(keypoints: Vec<Keypoint>, descriptors: DMatrix<u8>) -> Result<Self, VoError> {
        if keypoints.len() == descriptors.nrows() {
            Ok(FeatureSet {
                keypoints,
                descriptors,
            })
        } else {
            Err(VoError::MisalignedFeatures {
                keypoints: keypoints.len(),
                descriptors: descriptors.nrows(),
            })
        }
    }

    /// Build a feature set from descriptor rows of length `descriptor_len`.
    pub fn from_rows(
        keypoints: Vec<Keypoint>,
        rows: &[Vec<u8>],
        descriptor_len: usize,
    ) -> Result<Self, VoError> {
        let aligned = rows.len() == keypoints.len();
        if !aligned || rows.iter().any(|row| row.len() != descriptor_len) {
            return Err(VoError::MisalignedFeatures {
                keypoints: keypoints.len(),
                descriptors: rows.len(),
            });
        }
        let descriptors = DMatrix::from_fn(rows.len(), descriptor_len, |r, c| rows[r][c]);
        Self::new(keypoints, descriptors)
    }

    /// A set without any feature.
    pub fn empty(descriptor_len: usize) -> Self {
        FeatureSet {
            keypoints: Vec::new(),
            descriptors: DMatrix::zeros(0, descriptor_len),
        }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// True if there is no feature.
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// All keypoints.
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Descriptor matrix, one row per keypoint.
    pub fn descriptors(&self) -> &DMatrix<u8> {
        &self.descriptors
    }

    /// Number of bytes of a descriptor.
    pub fn descriptor_len(&self) -> usize {
        self.descriptors.ncols()
    }

    /// Keypoint at a given index.
    pub fn keypoint(&self, index: usize) -> &Keypoint {
        &self.keypoints[index]
    }

    /// Copy of the descriptor at a given index.
    pub fn descriptor_row(&self, index: usize) -> Vec<u8> {
        self.descriptors.row(index).iter().cloned().collect()
    }
}

/// Detect at most `k_features` keypoints (strongest first) and describe them.
///
/// An image without structure gives an empty set, not an error.
/// The only error is a `describe` implementation breaking index alignment.
#[allow(clippy::cast_precision_loss)]
pub fn extract<P: VisionPrimitives + ?Sized>(
    primitives: &P,
    image: &DMatrix<u8>,
    k_features: usize,
) -> Result<FeatureSet, VoError> {
    let (nrows, ncols) = image.shape();
    let mut keypoints = primitives.detect(image);
    keypoints.retain(|kp| {
        kp.x.is_finite()
            && kp.y.is_finite()
            && kp.x >= 0.0
            && kp.y >= 0.0
            && kp.x < ncols as Float
            && kp.y < nrows as Float
    });
    // Stable sort: equal responses keep the detection order.
    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(Ordering::Equal)
    });
    keypoints.truncate(k_features);
    let descriptors = primitives.describe(image, &keypoints);
    trace!("extracted {} keypoints", keypoints.len());
    FeatureSet::new(keypoints, descriptors)
}

/// Extract features of the left and optional right images,
/// in parallel if asked to. Both results are available when this returns.
pub fn extract_pair<P: VisionPrimitives + Sync + ?Sized>(
    primitives: &P,
    left: &DMatrix<u8>,
    right: Option<&DMatrix<u8>>,
    k_features: usize,
    parallel: bool,
) -> Result<(FeatureSet, Option<FeatureSet>), VoError> {
    match right {
        Some(right) if parallel => {
            let (left_set, right_set) = rayon::join(
                || extract(primitives, left, k_features),
                || extract(primitives, right, k_features),
            );
            Ok((left_set?, Some(right_set?)))
        }
        Some(right) => Ok((
            extract(primitives, left, k_features)?,
            Some(extract(primitives, right, k_features)?),
        )),
        None => Ok((extract(primitives, left, k_features)?, None)),
    }
}

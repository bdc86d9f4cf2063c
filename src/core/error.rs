// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Precondition violations of the odometry API.
//!
//! These are the only errors returned as `Err` by the tracker.
//! They are raised before any state mutation and mean that the input
//! itself is malformed: retrying with the same input is pointless.
//! Difficult sensor data (no texture, fast motion) is never an `Err`,
//! see `FrameStatus` in the tracking module.

use thiserror::Error;

/// Errors due to malformed inputs or configuration.
#[derive(Error, Debug)]
pub enum VoError {
    /// An image buffer has zero rows or columns.
    #[error("empty {0} image")]
    EmptyImage(&'static str),

    /// Two buffers of the same frame do not share the same dimensions.
    #[error("{what} has shape {found:?} but the left image has shape {expected:?}")]
    SizeMismatch {
        /// Name of the offending buffer.
        what: &'static str,
        /// Shape (rows, cols) of the left image.
        expected: (usize, usize),
        /// Shape (rows, cols) of the offending buffer.
        found: (usize, usize),
    },

    /// A monocular frame was given without a disparity map.
    #[error("frame without right image nor disparity map, no depth can be recovered")]
    MissingDepthSource,

    /// Keypoints and descriptors are not index-aligned.
    #[error("{keypoints} keypoints but {descriptors} descriptor rows")]
    MisalignedFeatures {
        /// Number of keypoints.
        keypoints: usize,
        /// Number of descriptor rows.
        descriptors: usize,
    },

    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("cannot read configuration file")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for `Config`.
    #[error("cannot parse configuration file")]
    Json(#[from] serde_json::Error),
}

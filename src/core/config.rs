// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tunable thresholds of the odometry pipeline.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::core::error::VoError;
use crate::misc::type_aliases::Float;

/// How 3D landmarks are obtained from a stereo frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriangulationStrategy {
    /// Read the depth of each keypoint from a dense disparity map.
    Disparity,
    /// Intersect the rays of matched left/right keypoints.
    Correspondence,
}

/// Configuration of the tracker.
///
/// Every field has a default, so a configuration file
/// only needs to list the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of keypoints kept per image (`kFeatures`).
    pub k_features: usize,
    /// Tracked landmarks floor under which re-detection is triggered (`kMinFeatures`).
    pub k_min_features: usize,
    /// Number of grid cells along the image width.
    pub x_grid_count: usize,
    /// Number of grid cells along the image height.
    pub y_grid_count: usize,
    /// Maximum descriptor distance of an accepted match.
    pub match_distance_threshold: Float,
    /// Maximum row difference (pixels) of a stereo match.
    pub stereo_max_row_offset: Float,
    /// Minimum disparity (pixels) of a stereo match.
    pub min_disparity: Float,
    /// Triangulated points farther than this depth (meters) are rejected.
    pub max_depth: Float,
    /// Maximum reprojection residual (pixels) of a triangulated point.
    pub max_reprojection_residual: Float,
    /// Triangulation strategy for stereo frames.
    pub triangulation: TriangulationStrategy,
    /// Maximum number of RANSAC hypotheses.
    pub ransac_iterations: usize,
    /// Reprojection error (pixels) under which a correspondence is an inlier.
    pub ransac_threshold: Float,
    /// Probability of drawing at least one outlier free sample,
    /// used for early termination of RANSAC.
    pub ransac_confidence: Float,
    /// Minimum number of inliers of an accepted motion.
    pub min_inliers: usize,
    /// A landmark is dropped after more consecutive frames without inlier match.
    pub max_missed_frames: usize,
    /// Extract left and right features in parallel.
    pub parallel_extraction: bool,
    /// Seed of the RANSAC random generator, for reproducible runs.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            k_features: 500,
            k_min_features: 60,
            x_grid_count: 16,
            y_grid_count: 12,
            match_distance_threshold: 50.0,
            stereo_max_row_offset: 2.0,
            min_disparity: 0.5,
            max_depth: 80.0,
            max_reprojection_residual: 2.0,
            triangulation: TriangulationStrategy::Disparity,
            ransac_iterations: 200,
            ransac_threshold: 2.0,
            ransac_confidence: 0.999,
            min_inliers: 10,
            max_missed_frames: 0,
            parallel_extraction: false,
            seed: 42,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Config, VoError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is in its valid range.
    pub fn validate(&self) -> Result<(), VoError> {
        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(VoError::Config(msg.to_string()))
            }
        };
        check(self.k_features > 0, "k_features must be positive")?;
        check(
            self.x_grid_count > 0 && self.y_grid_count > 0,
            "grid counts must be positive",
        )?;
        check(
            self.match_distance_threshold >= 0.0,
            "match_distance_threshold must be non negative",
        )?;
        check(self.min_disparity > 0.0, "min_disparity must be positive")?;
        check(self.max_depth > 0.0, "max_depth must be positive")?;
        check(
            self.max_reprojection_residual > 0.0 && self.ransac_threshold > 0.0,
            "pixel thresholds must be positive",
        )?;
        check(self.ransac_iterations > 0, "ransac_iterations must be positive")?;
        check(
            self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0,
            "ransac_confidence must be in ]0, 1[",
        )?;
        check(self.min_inliers >= 3, "min_inliers must be at least 3")
    }
}

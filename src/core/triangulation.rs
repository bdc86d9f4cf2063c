// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Recovery of 3D points, expressed in the left camera frame.
//!
//! Two strategies are available: reading a disparity at the keypoint
//! location, or intersecting the rays of a left/right keypoint match.
//! Results are index-aligned with the left features:
//! `None` marks a feature without reliable depth.

use nalgebra::Matrix4;

use crate::core::camera::CameraModel;
use crate::core::config::Config;
use crate::core::correspondence::Match;
use crate::core::features::FeatureSet;
use crate::misc::helper;
use crate::misc::type_aliases::{Float, Point2, Point3};

/// Depth of a disparity, `None` if the disparity is not positive
/// or the depth beyond `max_depth`.
pub fn depth_from_disparity(camera: &CameraModel, disparity: Float, max_depth: Float) -> Option<Float> {
    if !disparity.is_finite() || disparity <= 0.0 {
        return None;
    }
    let depth = camera.baseline_focal() / disparity;
    if depth.is_finite() && depth > 0.0 && depth <= max_depth {
        Some(depth)
    } else {
        None
    }
}

/// Back project a left pixel with a known disparity.
pub fn from_disparity(
    camera: &CameraModel,
    pixel: Point2,
    disparity: Float,
    max_depth: Float,
) -> Option<Point3> {
    depth_from_disparity(camera, disparity, max_depth).map(|z| camera.back_project(pixel, z))
}

/// 3D point of every left feature, reading the disparity map
/// at the nearest pixel of each keypoint.
pub fn from_disparity_map(
    camera: &CameraModel,
    features: &FeatureSet,
    disparity: &nalgebra::DMatrix<Float>,
    config: &Config,
) -> Vec<Option<Point3>> {
    features
        .keypoints()
        .iter()
        .map(|kp| {
            let (row, col) = helper::nearest_pixel(kp.x, kp.y, disparity.shape())?;
            let d = disparity[(row, col)];
            if d < config.min_disparity {
                return None;
            }
            from_disparity(camera, kp.point(), d, config.max_depth)
        })
        .collect()
}

/// Linear (DLT) triangulation of a left/right pixel pair.
///
/// The point is rejected if it is not in front of the rig,
/// beyond `max_depth`, or reprojects farther than `max_residual`
/// pixels from one of its observations.
pub fn triangulate_pair(
    camera: &CameraModel,
    left: Point2,
    right: Point2,
    max_depth: Float,
    max_residual: Float,
) -> Option<Point3> {
    let (p_left, p_right) = camera.projection_matrices();
    let mut a = Matrix4::zeros();
    for (i, (p, uv)) in [(p_left, left), (p_right, right)].iter().enumerate() {
        a.set_row(2 * i, &(p.row(2) * uv.x - p.row(0)));
        a.set_row(2 * i + 1, &(p.row(2) * uv.y - p.row(1)));
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h = v_t.row(svd.singular_values.imin()).transpose();
    if h[3].abs() < Float::EPSILON {
        return None;
    }
    let point = Point3::new(h[0] / h[3], h[1] / h[3], h[2] / h[3]);
    if !(point.z > 0.0 && point.z <= max_depth) {
        return None;
    }
    let residual_left = (camera.project_left(&point)? - left).norm();
    let residual_right = (camera.project_right(&point)? - right).norm();
    if residual_left <= max_residual && residual_right <= max_residual {
        Some(point)
    } else {
        None
    }
}

/// 3D point of every left feature that has a stereo match.
pub fn from_stereo_matches(
    camera: &CameraModel,
    left: &FeatureSet,
    right: &FeatureSet,
    matches: &[Match],
    config: &Config,
) -> Vec<Option<Point3>> {
    let mut points = vec![None; left.len()];
    for m in matches {
        points[m.query_idx] = triangulate_pair(
            camera,
            left.keypoint(m.query_idx).point(),
            right.keypoint(m.train_idx).point(),
            config.max_depth,
            config.max_reprojection_residual,
        );
    }
    points
}

// TESTS #############################################################

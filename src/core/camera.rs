// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera intrinsics and the rectified stereo rig model.
//!
//! The right camera of the rig is translated by `baseline` along the x axis
//! of the left camera, with the same orientation and intrinsics.
//! All camera frames follow the usual computer vision convention:
//! x to the right, y down, z forward (optical axis).

use nalgebra::Matrix3x4;
use serde::{Deserialize, Serialize};

use crate::misc::type_aliases::{Float, Mat3, Point2, Point3, Vec3};

/// Intrinsic parameters of a pinhole camera.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Principal point `(cx, cy)` in pixels.
    pub principal_point: (Float, Float),
    /// Focal lengths `(fx, fy)` in pixels.
    pub focal: (Float, Float),
    /// Skew coefficient, usually 0.
    pub skew: Float,
}

impl Intrinsics {
    /// Matrix form of the intrinsics, usually noted K.
    #[rustfmt::skip]
    pub fn matrix(&self) -> Mat3 {
        Mat3::new(
            self.focal.0, self.skew,    self.principal_point.0,
            0.0,          self.focal.1, self.principal_point.1,
            0.0,          0.0,          1.0,
        )
    }

    /// Project a 3D point into homogeneous image coordinates `(u*z, v*z, z)`.
    pub fn project(&self, point: Point3) -> Vec3 {
        Vec3::new(
            self.focal.0 * point[0] + self.skew * point[1] + self.principal_point.0 * point[2],
            self.focal.1 * point[1] + self.principal_point.1 * point[2],
            point[2],
        )
    }

    /// Back project a pixel at a given depth into a 3D point.
    pub fn back_project(&self, point: Point2, depth: Float) -> Point3 {
        let z = depth;
        let y = (point[1] - self.principal_point.1) * z / self.focal.1;
        let x = ((point[0] - self.principal_point.0) * z - self.skew * y) / self.focal.0;
        Point3::new(x, y, z)
    }
}

/// Calibration of a rectified stereo rig.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CameraModel {
    /// Intrinsics shared by the left and right cameras.
    pub intrinsics: Intrinsics,
    /// Distance (meters) between the left and right optical centers.
    pub baseline: Float,
}

impl CameraModel {
    /// Create a camera model with no skew.
    pub fn new(focal: (Float, Float), principal_point: (Float, Float), baseline: Float) -> Self {
        CameraModel {
            intrinsics: Intrinsics {
                principal_point,
                focal,
                skew: 0.0,
            },
            baseline,
        }
    }

    /// Horizontal focal length times baseline,
    /// such that `depth = baseline_focal() / disparity`.
    pub fn baseline_focal(&self) -> Float {
        self.baseline * self.intrinsics.focal.0
    }

    /// Project a point expressed in the left camera frame into the left image.
    /// Returns `None` for points not strictly in front of the camera.
    pub fn project_left(&self, point: &Point3) -> Option<Point2> {
        dehomogenize(self.intrinsics.project(*point))
    }

    /// Project a point expressed in the left camera frame into the right image.
    pub fn project_right(&self, point: &Point3) -> Option<Point2> {
        self.project_left(&self.left_to_right(point))
    }

    /// Express a point of the left camera frame in the right camera frame.
    pub fn left_to_right(&self, point: &Point3) -> Point3 {
        Point3::new(point.x - self.baseline, point.y, point.z)
    }

    /// Back project a left image pixel at a given depth.
    pub fn back_project(&self, pixel: Point2, depth: Float) -> Point3 {
        self.intrinsics.back_project(pixel, depth)
    }

    /// Projection matrices `(P_left, P_right)` mapping homogeneous points
    /// of the left camera frame into homogeneous pixel coordinates.
    pub fn projection_matrices(&self) -> (Matrix3x4<Float>, Matrix3x4<Float>) {
        let k = self.intrinsics.matrix();
        let mut left = Matrix3x4::zeros();
        left.fixed_view_mut::<3, 3>(0, 0).copy_from(&k);
        let mut right = left;
        right.set_column(3, &(k * Vec3::new(-self.baseline, 0.0, 0.0)));
        (left, right)
    }
}

/// Pixel coordinates of homogeneous image coordinates with positive depth.
fn dehomogenize(uvz: Vec3) -> Option<Point2> {
    if uvz.z > 0.0 {
        Some(Point2::new(uvz.x / uvz.z, uvz.y / uvz.z))
    } else {
        None
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to handle sequences in the KITTI odometry format.
//!
//! A sequence directory contains `calib.txt`, `times.txt`,
//! and the rectified stereo pairs in `image_0/` (left) and `image_1/` (right).

use itertools::Itertools;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::misc::type_aliases::{Float, Iso3};

/// Timestamp and 3D camera pose of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Timestamp of the frame, in seconds.
    pub timestamp: Float,
    /// Pose (camera to world) of the frame.
    pub pose: Iso3,
}

/// Write Frame data in the TUM RGB-D format for trajectories:
/// `timestamp tx ty tz qx qy qz qw`.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = self.pose.translation.vector;
        let q = self.pose.rotation.into_inner().coords;
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.timestamp, t.x, t.y, t.z, q.x, q.y, q.z, q.w
        )
    }
}

/// Pose in the KITTI ground truth format:
/// the 12 values of the top 3x4 block of the pose matrix, row major.
pub fn kitti_pose_line(pose: &Iso3) -> String {
    let mat = pose.to_homogeneous();
    (0..3)
        .cartesian_product(0..4)
        .map(|(r, c)| mat[(r, c)])
        .join(" ")
}

/// Paths of the left and right images of frame `index` in a sequence directory.
pub fn image_paths<P: AsRef<Path>>(sequence_dir: P, index: usize) -> (PathBuf, PathBuf) {
    let name = format!("{:06}.png", index);
    let dir = sequence_dir.as_ref();
    (dir.join("image_0").join(&name), dir.join("image_1").join(name))
}

/// Parse calibration, timestamps and ground truth files of a KITTI sequence.
pub mod parse {
    use super::*;
    use nom::{
        bytes::complete::{tag, take_till1},
        character::complete::{space0, space1},
        combinator::all_consuming,
        multi::separated_list1,
        number::complete::double,
        sequence::{delimited, pair, terminated},
        IResult,
    };

    use crate::core::camera::CameraModel;
    use crate::math::so3;
    use crate::misc::type_aliases::Mat3;

    /// Parse a `calib.txt` file into the model of the rectified stereo rig.
    ///
    /// Intrinsics come from the left projection matrix `P0`,
    /// the baseline from the right one: `b = -P1[0][3] / fx`.
    pub fn calibration(file_content: &str) -> Result<CameraModel, String> {
        let mut p0 = None;
        let mut p1 = None;
        for line in non_empty_lines(file_content) {
            let (_, (name, values)) =
                calibration_line(line).map_err(|e| format!("Parsing error in calibration: {}", e))?;
            match name {
                "P0" => p0 = Some(projection(&values)?),
                "P1" => p1 = Some(projection(&values)?),
                _ => (),
            }
        }
        let p0 = p0.ok_or("Missing P0 in calibration")?;
        let p1 = p1.ok_or("Missing P1 in calibration")?;
        let (fx, fy) = (p0[0], p0[5]);
        if fx <= 0.0 || fy <= 0.0 {
            return Err(format!("Invalid focal lengths ({}, {})", fx, fy));
        }
        let baseline = -p1[3] / p1[0];
        if baseline.is_nan() || baseline <= 0.0 {
            return Err(format!("Invalid stereo baseline {}", baseline));
        }
        Ok(CameraModel::new((fx, fy), (p0[2], p0[6]), baseline))
    }

    /// Parse a `times.txt` file, one timestamp per line.
    pub fn timestamps(file_content: &str) -> Result<Vec<Float>, String> {
        non_empty_lines(file_content)
            .map(|line| {
                timestamp(line)
                    .map(|(_, t)| t)
                    .map_err(|e| format!("Parsing error in timestamps: {}", e))
            })
            .collect()
    }

    /// Parse a ground truth poses file, one 3x4 row major matrix per line.
    pub fn poses(file_content: &str) -> Result<Vec<Iso3>, String> {
        non_empty_lines(file_content)
            .map(|line| {
                let (_, values) =
                    values(line).map_err(|e| format!("Parsing error in poses: {}", e))?;
                pose(&values)
            })
            .collect()
    }

    fn non_empty_lines(file_content: &str) -> impl Iterator<Item = &str> {
        file_content.lines().map(str::trim).filter(|l| !l.is_empty())
    }

    fn projection(values: &[Float]) -> Result<[Float; 12], String> {
        <[Float; 12]>::try_from(values)
            .map_err(|_| format!("Expected 12 values in a projection matrix, got {}", values.len()))
    }

    fn pose(values: &[Float]) -> Result<Iso3, String> {
        let m = projection(values)?;
        #[rustfmt::skip]
        let rotation = Mat3::new(
            m[0], m[1], m[2],
            m[4], m[5], m[6],
            m[8], m[9], m[10],
        );
        let rotation = so3::closest_rotation(rotation).ok_or("Degenerate rotation in pose")?;
        let translation = nalgebra::Translation3::new(m[3], m[7], m[11]);
        Ok(Iso3::from_parts(translation, rotation))
    }

    // nom parsers #############################################################

    // Calibration line: a matrix name, a colon and its values.
    fn calibration_line(input: &str) -> IResult<&str, (&str, Vec<Float>)> {
        all_consuming(pair(
            terminated(take_till1(|c: char| c == ':'), tag(":")),
            delimited(space0, separated_list1(space1, double), space0),
        ))(input)
    }

    // A single number filling the whole line.
    fn timestamp(input: &str) -> IResult<&str, Float> {
        all_consuming(double)(input)
    }

    // Space separated values filling the whole line.
    fn values(input: &str) -> IResult<&str, Vec<Float>> {
        all_consuming(separated_list1(space1, double))(input)
    }
} // pub mod parse

// TESTS #############################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::se3;
    use crate::misc::type_aliases::Vec6;
    use approx;

    const CALIB_00: &str = "\
P0: 7.188560000000e+02 0.000000000000e+00 6.071928000000e+02 0.000000000000e+00 0.000000000000e+00 7.188560000000e+02 1.852157000000e+02 0.000000000000e+00 0.000000000000e+00 0.000000000000e+00 1.000000000000e+00 0.000000000000e+00
P1: 7.188560000000e+02 0.000000000000e+00 6.071928000000e+02 -3.861448000000e+02 0.000000000000e+00 7.188560000000e+02 1.852157000000e+02 0.000000000000e+00 0.000000000000e+00 0.000000000000e+00 1.000000000000e+00 0.000000000000e+00
P2: 7.188560000000e+02 0.000000000000e+00 6.071928000000e+02 4.538225000000e+01 0.000000000000e+00 7.188560000000e+02 1.852157000000e+02 -1.130887000000e-01 0.000000000000e+00 0.000000000000e+00 1.000000000000e+00 3.779761000000e-03
";

    #[test]
    fn calibration_of_sequence_00() {
        let camera = parse::calibration(CALIB_00).unwrap();
        approx::assert_relative_eq!(camera.intrinsics.focal.0, 718.856);
        approx::assert_relative_eq!(camera.intrinsics.principal_point.0, 607.1928);
        approx::assert_relative_eq!(camera.intrinsics.principal_point.1, 185.2157);
        approx::assert_relative_eq!(camera.baseline, 386.1448 / 718.856, epsilon = 1e-12);
    }

    #[test]
    fn calibration_without_right_camera_is_rejected() {
        let left_only = CALIB_00.lines().next().unwrap();
        assert!(parse::calibration(left_only).is_err());
        assert!(parse::calibration("P0: 1.0 2.0").is_err());
    }

    #[test]
    fn timestamps_skip_blank_lines() {
        let times = parse::timestamps("0.000000e+00\n1.036400e-01\r\n\n2.072800e-01\n").unwrap();
        assert_eq!(times, vec![0.0, 0.10364, 0.20728]);
        assert!(parse::timestamps("0.0\nnot a number\n").is_err());
    }

    #[test]
    fn ground_truth_poses_parse_back() {
        let pose = se3::exp(Vec6::new(0.5, -0.1, 3.0, 0.02, 0.1, -0.05));
        let content = format!("{}\n{}\n", kitti_pose_line(&Iso3::identity()), kitti_pose_line(&pose));
        let poses = parse::poses(&content).unwrap();
        assert_eq!(poses.len(), 2);
        approx::assert_relative_eq!(poses[0], Iso3::identity(), epsilon = 1e-12);
        approx::assert_relative_eq!(poses[1], pose, epsilon = 1e-9);
    }

    #[test]
    fn tum_line_of_a_translated_frame() {
        let frame = Frame {
            timestamp: 0.5,
            pose: Iso3::translation(1.0, 2.0, 3.0),
        };
        assert_eq!(frame.to_string(), "0.5 1 2 3 0 0 0 1");
    }

    #[test]
    fn image_paths_are_zero_padded() {
        let (left, right) = image_paths("seq", 42);
        assert_eq!(left, PathBuf::from("seq/image_0/000042.png"));
        assert_eq!(right, PathBuf::from("seq/image_1/000042.png"));
    }
}

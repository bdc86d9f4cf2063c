// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Default configuration with the native primitives:
//! Harris and BRIEF features, depth from a block matching disparity map.

use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};

use stereo_odometry_rs::core::camera::CameraModel;
use stereo_odometry_rs::core::config::{Config, TriangulationStrategy};
use stereo_odometry_rs::core::features::native::NativePrimitives;
use stereo_odometry_rs::core::frame::StereoFrame;
use stereo_odometry_rs::core::motion::EstimationError;
use stereo_odometry_rs::core::tracking::{FrameStatus, Tracker};
use stereo_odometry_rs::math::se3;
use stereo_odometry_rs::misc::type_aliases::Float;

const SHIFT: usize = 10;

/// `b * f = 250`, so a shift of 10 pixels is 25 meters away.
fn camera(width: usize, height: usize) -> CameraModel {
    CameraModel::new(
        (500.0, 500.0),
        (width as Float / 2.0, height as Float / 2.0),
        0.5,
    )
}

fn tracker(width: usize, height: usize) -> Tracker<NativePrimitives> {
    Tracker::new(Config::default(), camera(width, height), NativePrimitives::new()).unwrap()
}

/// Random 8x8 blocks.
fn block_texture(nrows: usize, ncols: usize, seed: u64) -> DMatrix<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks = DMatrix::from_fn(nrows / 8 + 1, ncols / 8 + 1, |_, _| rng.gen::<u8>());
    DMatrix::from_fn(nrows, ncols, |r, c| blocks[(r / 8, c / 8)])
}

/// Left and right images of a fronto parallel texture: `left(c) = right(c - SHIFT)`.
fn shifted_pair(nrows: usize, ncols: usize) -> (DMatrix<u8>, DMatrix<u8>) {
    let right = block_texture(nrows, ncols, 7);
    let left = DMatrix::from_fn(nrows, ncols, |r, c| right[(r, c.saturating_sub(SHIFT))]);
    (left, right)
}

#[test]
fn default_pipeline_tracks_a_static_textured_pair() {
    let (left, right) = shifted_pair(240, 320);
    let mut tracker = tracker(320, 240);
    assert_eq!(tracker.config().triangulation, TriangulationStrategy::Disparity);

    let first = tracker.update(&StereoFrame::stereo(&left, &right)).unwrap();
    assert_eq!(first.status, FrameStatus::Initialized);
    assert!(first.nb_born > 0);
    assert_eq!(tracker.landmark_store().len(), first.nb_born);
    let (_, landmark) = tracker.landmarks().next().unwrap();
    assert_eq!(landmark.provenance.strategy, TriangulationStrategy::Disparity);
    assert_eq!(landmark.provenance.right_index, None);

    // Most landmarks lie on the textured plane.
    let mut depths: Vec<Float> = tracker
        .landmarks()
        .map(|(_, landmark)| landmark.camera_point.z)
        .collect();
    depths.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = depths[depths.len() / 2];
    approx::assert_relative_eq!(median, 25.0, max_relative = 0.2);

    let second = tracker.update(&StereoFrame::stereo(&left, &right)).unwrap();
    assert_eq!(second.status, FrameStatus::Tracked);
    assert!(second.nb_inliers >= tracker.config().min_inliers);
    let (angle, translation) = se3::magnitude(&second.motion.unwrap());
    assert!(angle < 1e-6, "rotation of {} rad", angle);
    assert!(translation < 1e-6, "translation of {} m", translation);
    assert_eq!(tracker.trajectory().len(), 2);
}

#[test]
fn tiny_images_fail_without_panicking() {
    for &(nrows, ncols) in &[(1, 1), (2, 3), (7, 7), (33, 33), (40, 200)] {
        let (left, right) = shifted_pair(nrows, ncols);
        let mut tracker = tracker(ncols, nrows);
        let report = tracker.update(&StereoFrame::stereo(&left, &right)).unwrap();
        assert_eq!(
            report.status,
            FrameStatus::Failed(EstimationError::TooFewCorrespondences {
                found: 0,
                required: 3
            }),
            "{}x{} image",
            nrows,
            ncols
        );
        assert!(tracker.landmark_store().is_empty());
    }
}

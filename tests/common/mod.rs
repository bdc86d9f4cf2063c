// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic stereo scene shared by the integration tests.
//!
//! Every landmark is drawn as a single pixel whose intensity is its identifier,
//! so that the primitives below detect and match them exactly.

#![allow(dead_code)]

use nalgebra::DMatrix;

use stereo_odometry_rs::core::camera::CameraModel;
use stereo_odometry_rs::core::config::{Config, TriangulationStrategy};
use stereo_odometry_rs::core::correspondence::Match;
use stereo_odometry_rs::core::features::{Keypoint, VisionPrimitives};
use stereo_odometry_rs::misc::type_aliases::{Float, Iso3, Point2, Point3};

pub const WIDTH: usize = 640;
pub const HEIGHT: usize = 480;

/// Rig with `b * f = 250`.
pub fn camera() -> CameraModel {
    CameraModel::new((500.0, 500.0), (320.0, 240.0), 0.5)
}

/// One landmark per grid cell, correspondence triangulation.
pub fn config() -> Config {
    Config {
        x_grid_count: 32,
        y_grid_count: 24,
        triangulation: TriangulationStrategy::Correspondence,
        ..Config::default()
    }
}

/// A 9x9 lattice of points seen from the identity pose,
/// with integer pixels and disparities.
pub struct Scene {
    /// `(identifier, world point)`, identifiers in `1..=81`.
    pub points: Vec<(u8, Point3)>,
}

/// Images of one frame rendered from a camera pose.
pub struct Rendered {
    pub left: DMatrix<u8>,
    pub right: DMatrix<u8>,
    pub disparity: DMatrix<Float>,
}

impl Scene {
    pub fn lattice() -> Self {
        let camera = camera();
        let disparities = [16.0, 20.0, 25.0, 32.0, 40.0];
        let mut points = Vec::new();
        for j in 0..9 {
            for i in 0..9 {
                let id = (j * 9 + i + 1) as u8;
                let pixel = Point2::new(80.0 + 60.0 * i as Float, 60.0 + 45.0 * j as Float);
                let depth = camera.baseline_focal() / disparities[(i + j) % 5];
                points.push((id, camera.back_project(pixel, depth)));
            }
        }
        Scene { points }
    }

    /// Same points with the identifiers of each pair exchanged,
    /// so that every pair is drawn at each other's place.
    pub fn swapped(&self, pairs: &[(u8, u8)]) -> Self {
        let swap = |id: u8| {
            pairs
                .iter()
                .find_map(|&(a, b)| match id {
                    _ if id == a => Some(b),
                    _ if id == b => Some(a),
                    _ => None,
                })
                .unwrap_or(id)
        };
        let points = self.points.iter().map(|&(id, p)| (swap(id), p)).collect();
        Scene { points }
    }

    /// Same points except the hidden ones.
    pub fn without(&self, hidden: &[u8]) -> Self {
        let points = self
            .points
            .iter()
            .filter(|(id, _)| !hidden.contains(id))
            .cloned()
            .collect();
        Scene { points }
    }

    /// World point of an identifier.
    pub fn point(&self, id: u8) -> Option<Point3> {
        self.points.iter().find(|(i, _)| *i == id).map(|&(_, p)| p)
    }

    /// Render the stereo pair seen from a camera to world pose.
    pub fn render(&self, pose: &Iso3) -> Rendered {
        let camera = camera();
        let mut left = DMatrix::zeros(HEIGHT, WIDTH);
        let mut right = DMatrix::zeros(HEIGHT, WIDTH);
        let mut disparity = DMatrix::from_element(HEIGHT, WIDTH, -1.0);
        let world_to_camera = pose.inverse();
        for &(id, world) in &self.points {
            let point = world_to_camera * world;
            let left_pixel = match camera.project_left(&point).and_then(pixel_of) {
                Some(pixel) => pixel,
                None => continue,
            };
            left[left_pixel] = id;
            disparity[left_pixel] = camera.baseline_focal() / point.z;
            if let Some(right_pixel) = camera.project_right(&point).and_then(pixel_of) {
                right[right_pixel] = id;
            }
        }
        Rendered {
            left,
            right,
            disparity,
        }
    }
}

/// Nearest `(row, col)` inside the image.
fn pixel_of(p: Point2) -> Option<(usize, usize)> {
    let (col, row) = (p.x.round(), p.y.round());
    if col >= 0.0 && row >= 0.0 && col < WIDTH as Float && row < HEIGHT as Float {
        Some((row as usize, col as usize))
    } else {
        None
    }
}

/// Detects non zero pixels, describes them by their intensity,
/// and matches equal intensities.
#[derive(Debug, Default)]
pub struct SyntheticPrimitives;

impl VisionPrimitives for SyntheticPrimitives {
    fn detect(&self, image: &DMatrix<u8>) -> Vec<Keypoint> {
        let mut keypoints = Vec::new();
        for r in 0..image.nrows() {
            for c in 0..image.ncols() {
                if image[(r, c)] > 0 {
                    keypoints.push(Keypoint::new(c as Float, r as Float, 1.0));
                }
            }
        }
        keypoints
    }

    fn describe(&self, image: &DMatrix<u8>, keypoints: &[Keypoint]) -> DMatrix<u8> {
        DMatrix::from_fn(keypoints.len(), 1, |i, _| {
            image[(keypoints[i].y as usize, keypoints[i].x as usize)]
        })
    }

    fn match_descriptors(&self, query: &DMatrix<u8>, train: &DMatrix<u8>) -> Vec<Match> {
        (0..query.nrows())
            .filter_map(|q| {
                (0..train.nrows())
                    .find(|&t| train[(t, 0)] == query[(q, 0)])
                    .map(|t| Match::new(q, t, 0.0))
            })
            .collect()
    }

    fn compute_disparity(&self, left: &DMatrix<u8>, _right: &DMatrix<u8>) -> DMatrix<Float> {
        DMatrix::from_element(left.nrows(), left.ncols(), -1.0)
    }
}

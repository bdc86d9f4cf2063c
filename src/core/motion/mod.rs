// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust estimation of the camera motion between two frames.
//!
//! Hypotheses are rigid alignments of three 3D-3D correspondences
//! (previous landmark, current stereo point), drawn at random and scored
//! by the reprojection error of all previous landmarks in the current image.
//! The best hypothesis is refined on its inliers by Levenberg-Marquardt.

pub mod lm_optimizer;

use log::{debug, trace};
use rand::{seq::index, Rng};
use thiserror::Error;

use crate::core::camera::CameraModel;
use crate::core::config::Config;
use crate::math::optimizer::State;
use crate::math::{se3, so3};
use crate::misc::type_aliases::{Float, Iso3, Mat3, Point2, Point3, Vec3};

use self::lm_optimizer::{LMOptimizerState, Obs};

/// Number of correspondences of a minimal sample.
pub const SAMPLE_SIZE: usize = 3;

/// One landmark seen in both frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Landmark position in the previous camera frame.
    pub previous: Point3,
    /// Observation of the landmark in the current left image.
    pub current: Point2,
    /// Position triangulated in the current camera frame, if any.
    pub current_point: Option<Point3>,
}

/// Why no motion could be estimated for a frame.
///
/// These are expected outcomes of difficult inputs,
/// reported in the frame status rather than as errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstimationError {
    /// Not enough correspondences to draw a hypothesis.
    #[error("too few correspondences: {found} < {required}")]
    TooFewCorrespondences {
        /// Number of usable correspondences.
        found: usize,
        /// Number required.
        required: usize,
    },
    /// Every sample drawn was degenerate (collinear points).
    #[error("degenerate configuration, no valid hypothesis")]
    Degenerate,
    /// The best hypothesis is not supported by enough inliers.
    #[error("not enough inliers: {found} < {required}")]
    NotEnoughInliers {
        /// Number of inliers of the best hypothesis.
        found: usize,
        /// Number required.
        required: usize,
    },
}

/// Parameters of the robust estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacParams {
    /// Maximum number of hypotheses.
    pub iterations: usize,
    /// Inlier reprojection threshold (pixels).
    pub threshold: Float,
    /// Confidence used for early termination.
    pub confidence: Float,
    /// Minimum number of inliers of an accepted motion.
    pub min_inliers: usize,
}

impl RansacParams {
    /// Extract the motion parameters of a configuration.
    pub fn from_config(config: &Config) -> Self {
        RansacParams {
            iterations: config.ransac_iterations,
            threshold: config.ransac_threshold,
            confidence: config.ransac_confidence,
            min_inliers: config.min_inliers,
        }
    }
}

/// Estimated inter-frame motion.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEstimate {
    /// Pose of the current camera in the previous camera frame,
    /// such that `pose_current = pose_previous * motion`.
    pub motion: Iso3,
    /// Inlier flag of each correspondence, in input order.
    pub inliers: Vec<bool>,
    /// Number of inliers.
    pub nb_inliers: usize,
    /// Root mean squared reprojection error of the inliers (pixels).
    pub rms_error: Float,
    /// Number of hypotheses drawn.
    pub iterations: usize,
}

impl MotionEstimate {
    /// Transformation of points from the previous camera frame
    /// to the current camera frame.
    pub fn transform_points(&self) -> Iso3 {
        self.motion.inverse()
    }
}

/// Robustly estimate the motion from correspondences.
///
/// Deterministic for a given state of `rng`.
pub fn estimate<R: Rng>(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    params: &RansacParams,
    rng: &mut R,
) -> Result<MotionEstimate, EstimationError> {
    let required = params.min_inliers.max(SAMPLE_SIZE);
    if correspondences.len() < required {
        return Err(EstimationError::TooFewCorrespondences {
            found: correspondences.len(),
            required,
        });
    }
    let candidates: Vec<(Point3, Point3)> = correspondences
        .iter()
        .filter_map(|c| c.current_point.map(|q| (c.previous, q)))
        .collect();
    if candidates.len() < SAMPLE_SIZE {
        return Err(EstimationError::TooFewCorrespondences {
            found: candidates.len(),
            required: SAMPLE_SIZE,
        });
    }

    // Hypotheses.
    let mut best: Option<(Iso3, usize, Float)> = None;
    let mut max_iterations = params.iterations;
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        let sample = index::sample(rng, candidates.len(), SAMPLE_SIZE);
        let (previous, current): (Vec<Point3>, Vec<Point3>) =
            sample.iter().map(|i| candidates[i]).unzip();
        if is_degenerate(&previous) || is_degenerate(&current) {
            continue;
        }
        let model = match rigid_alignment(&previous, &current) {
            Some(model) => model,
            None => continue,
        };
        let (nb_inliers, sq_error) = score(camera, correspondences, &model, params.threshold);
        let improves = match best {
            None => true,
            Some((_, n, e)) => nb_inliers > n || (nb_inliers == n && sq_error < e),
        };
        if improves {
            best = Some((model, nb_inliers, sq_error));
            let ratio = nb_inliers as Float / correspondences.len() as Float;
            max_iterations = max_iterations.min(adaptive_iterations(ratio, params.confidence));
        }
    }
    let (model, nb_inliers, _) = best.ok_or(EstimationError::Degenerate)?;
    trace!("best hypothesis: {} inliers after {} iterations", nb_inliers, iterations);
    if nb_inliers < required {
        return Err(EstimationError::NotEnoughInliers {
            found: nb_inliers,
            required,
        });
    }

    // Refinement on the inliers.
    let inliers = inlier_mask(camera, correspondences, &model, params.threshold);
    let refined = refine(camera, correspondences, &inliers, model);
    let refined_inliers = inlier_mask(camera, correspondences, &refined, params.threshold);
    let (model, inliers) = if count(&refined_inliers) >= count(&inliers) {
        (refined, refined_inliers)
    } else {
        debug!("refinement lost inliers, keeping the sampled hypothesis");
        (model, inliers)
    };
    let nb_inliers = count(&inliers);
    let sq_error: Float = correspondences
        .iter()
        .zip(&inliers)
        .filter(|(_, &inlier)| inlier)
        .filter_map(|(c, _)| reprojection_error(camera, c, &model))
        .map(|e| e * e)
        .sum();
    Ok(MotionEstimate {
        motion: se3::renormalize(model.inverse()),
        inliers,
        nb_inliers,
        rms_error: (sq_error / nb_inliers.max(1) as Float).sqrt(),
        iterations,
    })
}

/// Rigid motion `T` minimizing `sum |T * previous_i - current_i|^2`.
///
/// Returns `None` with less than 3 points or if the SVD fails.
pub fn rigid_alignment(previous: &[Point3], current: &[Point3]) -> Option<Iso3> {
    if previous.len() < SAMPLE_SIZE || previous.len() != current.len() {
        return None;
    }
    let n = previous.len() as Float;
    let centroid = |points: &[Point3]| points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;
    let (p_mean, q_mean) = (centroid(previous), centroid(current));
    let mut cross_covariance = Mat3::zeros();
    for (p, q) in previous.iter().zip(current) {
        cross_covariance += (q.coords - q_mean) * (p.coords - p_mean).transpose();
    }
    let rotation = so3::closest_rotation(cross_covariance)?;
    let translation = q_mean - rotation * p_mean;
    Some(Iso3::from_parts(translation.into(), rotation))
}

/// Three points too close to a line do not define a rigid motion.
fn is_degenerate(points: &[Point3]) -> bool {
    let (u, v) = (points[1] - points[0], points[2] - points[0]);
    let scale = u.norm() * v.norm();
    scale < Float::EPSILON || u.cross(&v).norm() < 1e-6 * scale
}

/// Number of hypotheses after which an outlier free sample has been drawn
/// with the given confidence, for a given inlier ratio.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn adaptive_iterations(inlier_ratio: Float, confidence: Float) -> usize {
    let good_sample = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if good_sample >= 1.0 {
        return 1;
    }
    if good_sample <= 0.0 {
        return usize::MAX;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - good_sample).ln();
    if needed.is_finite() {
        needed.ceil().max(1.0) as usize
    } else {
        usize::MAX
    }
}

/// Reprojection error in the current image of the previous landmark position.
fn reprojection_error(camera: &CameraModel, c: &Correspondence, model: &Iso3) -> Option<Float> {
    camera
        .project_left(&(model * c.previous))
        .map(|uv| (uv - c.current).norm())
}

fn inlier_mask(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    model: &Iso3,
    threshold: Float,
) -> Vec<bool> {
    correspondences
        .iter()
        .map(|c| reprojection_error(camera, c, model).map_or(false, |e| e <= threshold))
        .collect()
}

/// `(nb_inliers, sum of squared inlier errors)`.
fn score(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    model: &Iso3,
    threshold: Float,
) -> (usize, Float) {
    correspondences
        .iter()
        .filter_map(|c| reprojection_error(camera, c, model))
        .filter(|&e| e <= threshold)
        .fold((0, 0.0), |(n, sq), e| (n + 1, sq + e * e))
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&inlier| inlier).count()
}

/// Levenberg-Marquardt refinement of a motion on the inlier correspondences.
fn refine(
    camera: &CameraModel,
    correspondences: &[Correspondence],
    inliers: &[bool],
    model: Iso3,
) -> Iso3 {
    let (points, pixels): (Vec<Point3>, Vec<Point2>) = correspondences
        .iter()
        .zip(inliers)
        .filter(|(_, &inlier)| inlier)
        .map(|(c, _)| (c.previous, c.current))
        .unzip();
    let obs = Obs {
        intrinsics: &camera.intrinsics,
        points: &points,
        pixels: &pixels,
    };
    match LMOptimizerState::iterative_solve(&obs, model) {
        Ok((state, nb_iter)) => {
            trace!(
                "refinement: {} iterations, energy {}",
                nb_iter,
                state.eval_data.energy
            );
            state.eval_data.model
        }
        Err(error) => {
            debug!("refinement failed: {}", error);
            model
        }
    }
}

// TESTS #############################################################

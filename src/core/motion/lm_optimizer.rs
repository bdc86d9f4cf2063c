// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Levenberg-Marquardt implementation of the `optimizer::State` trait
//! for the refinement of a rigid body motion minimizing reprojection errors.

use nalgebra::{Matrix2x3, Matrix3x6};

use crate::core::camera::Intrinsics;
use crate::math::optimizer::{self, Continue};
use crate::math::{se3, so3};
use crate::misc::type_aliases::{Float, Iso3, Mat2x6, Mat3, Mat6, Point2, Point3, Vec2, Vec6};

/// Iterations are stopped after this many steps.
const MAX_ITERATIONS: usize = 20;

/// Iterations are stopped when the energy decreases less than this.
const MIN_ENERGY_DECREASE: Float = 1e-12;

/// State of the Levenberg-Marquardt optimizer.
pub struct LMOptimizerState {
    /// Levenberg-Marquardt hessian diagonal coefficient.
    pub lm_coef: Float,
    /// Data resulting of a successful model evaluation.
    pub eval_data: EvalData,
}

/// Either a successfully constructed `EvalData`
/// or an error containing the energy of a given model.
///
/// The error is returned when the new computed energy
/// is higher than the previous iteration energy.
pub type EvalState = Result<EvalData, Float>;

/// Data resulting of a successful model evaluation.
pub struct EvalData {
    /// The Gauss-Newton approximation of the hessian.
    pub hessian: Mat6,
    /// The gradient of the energy.
    pub gradient: Vec6,
    /// Mean squared reprojection error of the model.
    pub energy: Float,
    /// Motion (previous camera frame to current camera frame)
    /// at the current state of iterations.
    pub model: Iso3,
}

/// Observations available for the optimizer iterations.
pub struct Obs<'a> {
    /// Intrinsic parameters of the camera.
    pub intrinsics: &'a Intrinsics,
    /// 3D points in the previous camera frame.
    pub points: &'a [Point3],
    /// Their observations in the current image.
    pub pixels: &'a [Point2],
}

/// `(energy, [(transformed point, residual)])` of the points in front of the camera.
type Precomputed = (Float, Vec<(Point3, Vec2)>);

impl LMOptimizerState {
    /// Precompute the energy of a model.
    /// Points behind the camera are ignored.
    #[allow(clippy::cast_precision_loss)]
    fn eval_energy(obs: &Obs, model: &Iso3) -> Precomputed {
        let mut residuals = Vec::with_capacity(obs.points.len());
        let mut energy_sum = 0.0;
        for (point, pixel) in obs.points.iter().zip(obs.pixels) {
            let transformed = model * point;
            let uvz = obs.intrinsics.project(transformed);
            if uvz.z > Float::EPSILON {
                let r = Vec2::new(uvz.x / uvz.z - pixel.x, uvz.y / uvz.z - pixel.y);
                energy_sum += r.norm_squared();
                residuals.push((transformed, r));
            }
        }
        let energy = if residuals.is_empty() {
            Float::INFINITY
        } else {
            energy_sum / residuals.len() as Float
        };
        (energy, residuals)
    }

    /// Fully evaluate a model.
    fn compute_eval_data(obs: &Obs, model: Iso3, pre: Precomputed) -> EvalData {
        let (energy, residuals) = pre;
        let mut gradient = Vec6::zeros();
        let mut hessian = Mat6::zeros();
        for (transformed, r) in residuals {
            let jac = jacobian(obs.intrinsics, &transformed);
            gradient += jac.transpose() * r;
            hessian += jac.transpose() * jac;
        }
        EvalData {
            hessian,
            gradient,
            energy,
            model,
        }
    }
}

/// `impl<'a> optimizer::State<Obs<'a>, EvalState, Iso3, String> for LMOptimizerState`.
impl<'a> optimizer::State<Obs<'a>, EvalState, Iso3, String> for LMOptimizerState {
    /// Initialize the optimizer state.
    fn init(obs: &Obs, model: Iso3) -> Self {
        Self {
            lm_coef: 0.1,
            eval_data: Self::compute_eval_data(obs, model, Self::eval_energy(obs, &model)),
        }
    }

    /// Compute the step using Levenberg-Marquardt.
    /// The step is applied on the left of the current motion.
    /// May return an error at the Cholesky decomposition of the hessian.
    fn step(&self) -> Result<Iso3, String> {
        let mut hessian = self.eval_data.hessian;
        for i in 0..6 {
            hessian[(i, i)] *= 1.0 + self.lm_coef;
        }
        let cholesky = hessian
            .cholesky()
            .ok_or("Error at Cholesky decomposition of hessian")?;
        let delta = -cholesky.solve(&self.eval_data.gradient);
        Ok(se3::renormalize(se3::exp(delta) * self.eval_data.model))
    }

    /// Compute residuals and energy of the new model.
    /// Then, evaluate the new hessian and gradient if the energy has decreased.
    fn eval(&self, obs: &Obs, model: Iso3) -> EvalState {
        let pre = Self::eval_energy(obs, &model);
        let energy = pre.0;
        let old_energy = self.eval_data.energy;
        if energy > old_energy || !energy.is_finite() {
            Err(energy)
        } else {
            Ok(Self::compute_eval_data(obs, model, pre))
        }
    }

    /// Stop after too many iterations,
    /// or if the energy variation is too low.
    ///
    /// Also update the Levenberg-Marquardt coefficient
    /// depending on if the energy increased or decreased.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue) {
        let too_many_iterations = nb_iter > MAX_ITERATIONS;
        match (eval_state, too_many_iterations) {
            // Max number of iterations reached:
            (Err(_), true) => (self, Continue::Stop),
            (Ok(eval_data), true) => {
                let kept_state = Self {
                    lm_coef: self.lm_coef,
                    eval_data,
                };
                (kept_state, Continue::Stop)
            }
            // Can continue to iterate:
            (Err(_), false) => {
                let mut kept_state = self;
                kept_state.lm_coef *= 10.0;
                (kept_state, Continue::Forward)
            }
            (Ok(eval_data), false) => {
                let d_energy = self.eval_data.energy - eval_data.energy;
                let continuation = if d_energy > MIN_ENERGY_DECREASE {
                    Continue::Forward
                } else {
                    Continue::Stop
                };
                let kept_state = Self {
                    lm_coef: 0.1 * self.lm_coef,
                    eval_data,
                };
                (kept_state, continuation)
            }
        }
    }
}

/// Jacobian of the projection of `exp(delta) * P` with respect to `delta`,
/// at `delta = 0`, where `P` is the transformed point.
fn jacobian(intrinsics: &Intrinsics, transformed: &Point3) -> Mat2x6 {
    let (fx, fy) = intrinsics.focal;
    let s = intrinsics.skew;
    let (x, y, z) = (transformed.x, transformed.y, transformed.z);
    let z_inv = 1.0 / z;
    let z_inv_2 = z_inv * z_inv;
    #[rustfmt::skip]
    let d_proj = Matrix2x3::new(
        fx * z_inv, s * z_inv,  -(fx * x + s * y) * z_inv_2,
        0.0,        fy * z_inv, -fy * y * z_inv_2,
    );
    let mut d_point = Matrix3x6::zeros();
    d_point.fixed_view_mut::<3, 3>(0, 0).copy_from(&Mat3::identity());
    d_point
        .fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(-so3::hat(transformed.coords)));
    d_proj * d_point
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::optimizer::State;
    use approx;

    fn intrinsics() -> Intrinsics {
        Intrinsics {
            principal_point: (320.0, 240.0),
            focal: (500.0, 500.0),
            skew: 0.0,
        }
    }

    #[test]
    fn refinement_recovers_a_perturbed_motion() {
        let intrinsics = intrinsics();
        let truth = se3::exp(Vec6::new(0.1, -0.05, 0.3, 0.01, 0.02, -0.015));
        let points: Vec<Point3> = (0..30)
            .map(|i| {
                let i = i as Float;
                Point3::new((i % 6.0) - 2.5, (i / 6.0).floor() - 2.0, 5.0 + 0.3 * i)
            })
            .collect();
        let pixels: Vec<Point2> = points
            .iter()
            .map(|p| {
                let uvz = intrinsics.project(truth * p);
                Point2::new(uvz.x / uvz.z, uvz.y / uvz.z)
            })
            .collect();
        let obs = Obs {
            intrinsics: &intrinsics,
            points: &points,
            pixels: &pixels,
        };
        let initial = se3::exp(Vec6::new(0.05, 0.0, 0.2, 0.0, 0.0, 0.0));
        let (state, _) = LMOptimizerState::iterative_solve(&obs, initial).unwrap();
        let error = se3::log(state.eval_data.model * truth.inverse());
        assert!(error.norm() < 1e-6, "error: {}", error.norm());
        approx::assert_abs_diff_eq!(state.eval_data.energy, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let intrinsics = intrinsics();
        let point = Point3::new(0.4, -0.3, 3.0);
        let project = |p: Point3| {
            let uvz = intrinsics.project(p);
            Vec2::new(uvz.x / uvz.z, uvz.y / uvz.z)
        };
        let jac = jacobian(&intrinsics, &point);
        let h = 1e-6;
        for k in 0..6 {
            let mut delta = Vec6::zeros();
            delta[k] = h;
            let numeric = (project(se3::exp(delta) * point) - project(point)) / h;
            approx::assert_abs_diff_eq!(numeric, jac.column(k).into_owned(), epsilon = 1e-3);
        }
    }
}

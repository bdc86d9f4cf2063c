// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lie algebra/group functions for 3D rigid body motion.
//!
//! Interesting reads:
//! - Sophus c++ library: <https://github.com/strasdat/Sophus>
//! - Ethan Eade course on Lie Groups for 2D and 3D transformations:
//!     - details: <http://ethaneade.com/lie.pdf>
//!     - summary: <http://ethaneade.com/lie_groups.pdf>

use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use std::f64::consts::PI;

use crate::math::so3;
use crate::misc::type_aliases::{Float, Iso3, Mat3, Vec3, Vec6};

const EPSILON_TAYLOR_SERIES: Float = 1e-2;
const EPSILON_TAYLOR_SERIES_2: Float = EPSILON_TAYLOR_SERIES * EPSILON_TAYLOR_SERIES;
const _1_6: Float = 1.0 / 6.0;
const _1_8: Float = 0.125;
const _1_12: Float = 1.0 / 12.0;
const _1_15: Float = 1.0 / 15.0;
const _1_24: Float = 1.0 / 24.0;
const _1_48: Float = 1.0 / 48.0;
const _1_120: Float = 1.0 / 120.0;

/// Parameterization of a twist (element of se3).
pub type Twist = Vec6;

/// Retrieve the linear velocity part of the twist parameterization.
pub fn linear_velocity(xi: Twist) -> Vec3 {
    Vec3::new(xi[0], xi[1], xi[2])
}

/// Retrieve the angular velocity part of the twist parameterization.
pub fn angular_velocity(xi: Twist) -> Vec3 {
    Vec3::new(xi[3], xi[4], xi[5])
}

/// Compute the exponential map from Lie algebra se3 to Lie group SE3.
/// Goes from se3 parameterization to SE3 element (rigid body motion).
pub fn exp(xi: Twist) -> Iso3 {
    let xi_v = linear_velocity(xi);
    let xi_w = angular_velocity(xi);
    let theta_2 = xi_w.norm_squared();
    let (omega, omega_2) = (so3::hat(xi_w), so3::hat_2(xi_w));
    if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        let real_factor = 1.0 - _1_8 * theta_2; // TAYLOR
        let imag_factor = 0.5 - _1_48 * theta_2; // TAYLOR
        let coef_omega = 0.5 - _1_24 * theta_2; // TAYLOR
        let coef_omega_2 = _1_6 - _1_120 * theta_2; // TAYLOR
        let v = Mat3::identity() + coef_omega * omega + coef_omega_2 * omega_2;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::from_parts(
            real_factor,
            imag_factor * xi_w,
        ));
        Iso3::from_parts(Translation3::from(v * xi_v), rotation)
    } else {
        let theta = theta_2.sqrt();
        let half_theta = 0.5 * theta;
        let real_factor = half_theta.cos();
        let imag_factor = half_theta.sin() / theta;
        let coef_omega = (1.0 - theta.cos()) / theta_2;
        let coef_omega_2 = (theta - theta.sin()) / (theta * theta_2);
        let v = Mat3::identity() + coef_omega * omega + coef_omega_2 * omega_2;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::from_parts(
            real_factor,
            imag_factor * xi_w,
        ));
        Iso3::from_parts(Translation3::from(v * xi_v), rotation)
    }
}

/// Compute the logarithm map from the Lie group SE3 to the Lie algebra se3.
/// Inverse of the exponential map.
pub fn log(iso: Iso3) -> Twist {
    let imag_vector = iso.rotation.vector();
    let imag_norm_2 = imag_vector.norm_squared();
    let real_factor = iso.rotation.scalar();
    if imag_norm_2 < EPSILON_TAYLOR_SERIES_2 {
        let theta_by_imag_norm = 2.0 / real_factor; // TAYLOR
        let w = theta_by_imag_norm * imag_vector;
        let (omega, omega_2) = (so3::hat(w), so3::hat_2(w));
        let x_2 = imag_norm_2 / (real_factor * real_factor);
        let coef_omega_2 = _1_12 * (1.0 + _1_15 * x_2); // TAYLOR
        let v_inv = Mat3::identity() - 0.5 * omega + coef_omega_2 * omega_2;
        let xi_v = v_inv * iso.translation.vector;
        Vec6::new(xi_v[0], xi_v[1], xi_v[2], w[0], w[1], w[2])
    } else {
        let imag_norm = imag_norm_2.sqrt();
        let theta = if real_factor.abs() < EPSILON_TAYLOR_SERIES {
            let alpha = real_factor.abs() / imag_norm;
            real_factor.signum() * (PI - 2.0 * alpha) // TAYLOR
        } else {
            2.0 * (imag_norm / real_factor).atan()
        };
        let theta_2 = theta * theta;
        let w = (theta / imag_norm) * imag_vector;
        let (omega, omega_2) = (so3::hat(w), so3::hat_2(w));
        let coef_omega_2 = (1.0 - 0.5 * theta * real_factor / imag_norm) / theta_2;
        let v_inv = Mat3::identity() - 0.5 * omega + coef_omega_2 * omega_2;
        let xi_v = v_inv * iso.translation.vector;
        Vec6::new(xi_v[0], xi_v[1], xi_v[2], w[0], w[1], w[2])
    }
}

/// Compose two rigid body motions (`a ∘ b`),
/// re-normalizing the rotation so that it stays a proper rotation.
pub fn compose(a: &Iso3, b: &Iso3) -> Iso3 {
    renormalize(a * b)
}

/// Re-normalize the rotation part of a rigid body motion.
pub fn renormalize(motion: Iso3) -> Iso3 {
    let mut motion = motion;
    motion.rotation = so3::renormalize(motion.rotation);
    motion
}

/// Distance of the rotation matrix of a motion to the set of proper rotations:
/// `max(|R^T R - I|_max, |det(R) - 1|)`.
pub fn orthonormality_error(motion: &Iso3) -> Float {
    let rotation = motion.rotation.to_rotation_matrix().into_inner();
    let gram_error = (rotation.transpose() * rotation - Mat3::identity()).amax();
    gram_error.max((rotation.determinant() - 1.0).abs())
}

/// Angle (radians) and translation norm of a rigid body motion.
pub fn magnitude(motion: &Iso3) -> (Float, Float) {
    (motion.rotation.angle(), motion.translation.vector.norm())
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    // Taylor branches near PI and translations up to 10 limit
    // the round trip precision to around 1e-5.
    const EPSILON_ROUNDTRIP_APPROX: Float = 1e-4;

    #[test]
    fn exp_log_round_trip() {
        let xi = Vec6::zeros();
        assert_eq!(xi, log(exp(xi)));
    }

    #[test]
    fn composing_identities_gives_identity() {
        let composed = compose(&Iso3::identity(), &Iso3::identity());
        assert_eq!(composed, Iso3::identity());
    }

    #[test]
    fn composing_with_inverse_gives_identity() {
        let motion = gen_rigid_motion(1200, -300, 4000, 2000, -9000, 300);
        let composed = compose(&motion, &motion.inverse());
        assert!(approx::relative_eq!(composed, Iso3::identity(), epsilon = 1e-9));
    }

    #[test]
    fn long_composition_chains_stay_orthonormal() {
        let step = exp(Vec6::new(0.01, 0.0, 0.1, 0.003, -0.002, 0.001));
        let mut pose = Iso3::identity();
        for _ in 0..10_000 {
            pose = compose(&pose, &step);
        }
        assert!(orthonormality_error(&pose) < 1e-9);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn log_exp_round_trip(t1: i16, t2: i16, t3: i16, a1: i16, a2: i16, a3: i16) -> bool {
        let rigid_motion = gen_rigid_motion(t1, t2, t3, a1, a2, a3);
        approx::relative_eq!(
            rigid_motion,
            exp(log(rigid_motion)),
            epsilon = EPSILON_ROUNDTRIP_APPROX
        )
    }

    #[quickcheck_macros::quickcheck]
    fn compose_inverse_is_identity(t1: i16, t2: i16, t3: i16, a1: i16, a2: i16, a3: i16) -> bool {
        let motion = gen_rigid_motion(t1, t2, t3, a1, a2, a3);
        approx::relative_eq!(
            compose(&motion.inverse(), &motion),
            Iso3::identity(),
            epsilon = 1e-6
        )
    }

    // GENERATORS ####################################################

    /// Translations in [-10, 10] and angles in [-PI, PI] from integers,
    /// since quickcheck floats may be NaN or infinite.
    fn gen_rigid_motion(t1: i16, t2: i16, t3: i16, a1: i16, a2: i16, a3: i16) -> Iso3 {
        let scaled = |x: i16, s: Float| s * Float::from(x) / Float::from(i16::MAX);
        let translation = Translation3::new(scaled(t1, 10.0), scaled(t2, 10.0), scaled(t3, 10.0));
        let rotation =
            UnitQuaternion::from_euler_angles(scaled(a1, PI), scaled(a2, PI), scaled(a3, PI));
        Iso3::from_parts(translation, rotation)
    }
}

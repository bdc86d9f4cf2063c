// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Feature-based stereo visual odometry.
//!
//! A `core::tracking::Tracker` is fed with rectified stereo frames
//! (or left images with a disparity map) and estimates the camera pose
//! of every frame relative to the first one, while maintaining
//! a set of triangulated landmarks and a history of keyframes.
//!
//! Computer vision primitives (detection, description, matching, dense stereo)
//! are injected through the `core::features::VisionPrimitives` trait.
//! `core::features::native::NativePrimitives` implements them in pure Rust.

#![warn(missing_docs)]

pub mod core;
pub mod dataset;
pub mod math;
pub mod misc;

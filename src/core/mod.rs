// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Core functionalities of the stereo odometry.

pub mod camera;
pub mod config;
pub mod correspondence;
pub mod error;
pub mod features;
pub mod frame;
pub mod landmarks;
pub mod motion;
pub mod tracking;
pub mod triangulation;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::{info, warn};
use nalgebra::DMatrix;
use std::{env, error::Error, fs, path::Path, path::PathBuf};

use stereo_odometry_rs::core::config::Config;
use stereo_odometry_rs::core::features::native::NativePrimitives;
use stereo_odometry_rs::core::frame::StereoFrame;
use stereo_odometry_rs::core::tracking::Tracker;
use stereo_odometry_rs::dataset::kitti;
use stereo_odometry_rs::math::se3;
use stereo_odometry_rs::misc::type_aliases::Float;
use stereo_odometry_rs::misc::{helper, interop};

/// KITTI 16 bits disparity maps store `256 * disparity`.
const DISPARITY_SCALE: Float = 256.0;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = my_run(&args) {
        eprintln!("{}", error);
    }
}

const USAGE: &str = "Usage: ./vors_stereo sequence_dir [config.json [disparity_dir]]";

fn my_run(args: &[String]) -> Result<(), Box<dyn Error>> {
    // Check that the arguments are correct.
    let valid_args = check_args(args)?;

    // Read the calibration and the timestamps of the sequence.
    let calib = fs::read_to_string(valid_args.sequence_dir.join("calib.txt"))?;
    let camera = kitti::parse::calibration(&calib)?;
    let times = fs::read_to_string(valid_args.sequence_dir.join("times.txt"))?;
    let timestamps = kitti::parse::timestamps(&times)?;

    // Setup the tracker.
    let config = match &valid_args.config_file_path {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let mut tracker = Tracker::new(config, camera, NativePrimitives::new())?;
    info!(
        "{} frames, baseline {:.3} m, focal {:.1} px, {:?} triangulation",
        timestamps.len(),
        tracker.camera().baseline,
        tracker.camera().intrinsics.focal.0,
        tracker.config().triangulation
    );

    // Track every stereo pair of the sequence.
    let mut nb_failed = 0;
    for (index, &timestamp) in timestamps.iter().enumerate() {
        let (left, right) = read_pair(&valid_args.sequence_dir, index)?;
        let disparity = match &valid_args.disparity_dir {
            Some(dir) => Some(read_disparity(dir, index)?),
            None => None,
        };
        let frame = match &disparity {
            Some(map) => StereoFrame::stereo(&left, &right).with_disparity(map),
            None => StereoFrame::stereo(&left, &right),
        };
        let report = tracker.update(&frame)?;
        if !report.success() {
            nb_failed += 1;
            warn!("frame {}: {:?}", index, report.status);
        }

        // Print to stdout the frame pose.
        let pose = report.pose;
        println!("{}", kitti::Frame { timestamp, pose });
    }

    info!(
        "{} keyframes, {} live landmarks, {} failed frames",
        tracker.keyframes().len(),
        tracker.landmark_store().len(),
        nb_failed
    );
    info!(
        "final pose rotation orthonormality error: {:e}",
        se3::orthonormality_error(&tracker.pose())
    );
    Ok(())
}

struct Args {
    sequence_dir: PathBuf,
    config_file_path: Option<PathBuf>,
    disparity_dir: Option<PathBuf>,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    let (sequence_dir, config_file_path, disparity_dir) = match args {
        [_, seq] => (PathBuf::from(seq), None, None),
        [_, seq, config] => (PathBuf::from(seq), Some(PathBuf::from(config)), None),
        [_, seq, config, disp] => (
            PathBuf::from(seq),
            Some(PathBuf::from(config)),
            Some(PathBuf::from(disp)),
        ),
        _ => {
            eprintln!("{}", USAGE);
            return Err("Wrong number of arguments".to_string());
        }
    };
    if !sequence_dir.is_dir() {
        eprintln!("{}", USAGE);
        return Err(format!(
            "The sequence directory does not exist or is not reachable: {}",
            sequence_dir.display()
        ));
    }
    if let Some(path) = &config_file_path {
        if !path.is_file() {
            return Err(format!("The configuration file does not exist: {}", path.display()));
        }
    }
    Ok(Args {
        sequence_dir,
        config_file_path,
        disparity_dir,
    })
}

/// Read the left and right images of a frame.
fn read_pair(sequence_dir: &Path, index: usize) -> Result<(DMatrix<u8>, DMatrix<u8>), Box<dyn Error>> {
    let (left_path, right_path) = kitti::image_paths(sequence_dir, index);
    let left = interop::matrix_from_image(image::open(left_path)?.to_luma8());
    let right = interop::matrix_from_image(image::open(right_path)?.to_luma8());
    Ok((left, right))
}

/// Read a 16 bits disparity map of a frame.
fn read_disparity(dir: &Path, index: usize) -> Result<DMatrix<Float>, Box<dyn Error>> {
    let path = dir.join(format!("{:06}.png", index));
    let (w, h, buffer) = helper::read_png_16bits(path)?;
    Ok(interop::disparity_from_u16(w, h, &buffer, DISPARITY_SCALE))
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frame to frame tracking of the stereo camera pose.
//!
//! The `Tracker` is a state machine fed with one `StereoFrame` per call.
//! Each call extracts features, recovers their depth, matches them
//! with the tracked landmarks, estimates the inter-frame motion,
//! and updates the pose, the landmarks and the keyframes.

use log::{debug, info, warn};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, SeedableRng};
use std::mem;

use crate::core::camera::CameraModel;
use crate::core::config::{Config, TriangulationStrategy};
use crate::core::correspondence::{self, GridPartition, Match};
use crate::core::error::VoError;
use crate::core::features::{self, FeatureSet, Keypoint, VisionPrimitives};
use crate::core::frame::StereoFrame;
use crate::core::landmarks::{
    Keyframe, KeyframeId, Landmark, LandmarkId, LandmarkStore, Provenance,
};
use crate::core::motion::{self, Correspondence, EstimationError, MotionEstimate, RansacParams};
use crate::core::triangulation;
use crate::math::se3;
use crate::misc::type_aliases::{Float, Iso3, Point3};

/// A landmark followed from frame to frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Tracked landmark.
    pub landmark: LandmarkId,
    /// Last observation of the landmark in a left image.
    pub keypoint: Keypoint,
    /// Descriptor of that observation.
    pub descriptor: Vec<u8>,
    /// Number of consecutive frames without inlier match.
    pub misses: usize,
}

/// Everything carried from one frame to the next while tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    /// Live tracks.
    pub tracks: Vec<Track>,
    /// Number of bytes of the descriptors.
    pub descriptor_len: usize,
    /// Camera to world pose of the previous frame.
    pub pose: Iso3,
    /// The next frame is a full re-detection.
    pub redetect: bool,
}

impl TrackingState {
    /// Features of the previous frame of the live tracks, in track order.
    pub fn features(&self) -> Result<FeatureSet, VoError> {
        let keypoints = self.tracks.iter().map(|t| t.keypoint).collect();
        let rows: Vec<Vec<u8>> = self.tracks.iter().map(|t| t.descriptor.clone()).collect();
        FeatureSet::from_rows(keypoints, &rows, self.descriptor_len)
    }
}

/// State of the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    /// No frame processed yet.
    Uninitialized,
    /// Landmarks are tracked.
    Tracking(TrackingState),
    /// The last motion estimation failed, the next frame re-initializes.
    Degraded {
        /// Last valid pose, held until recovery.
        pose: Iso3,
        /// Cause of the failure.
        failure: EstimationError,
    },
}

impl EngineState {
    /// Short name of the state, for logs.
    pub fn label(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Tracking(_) => "tracking",
            EngineState::Degraded { .. } => "degraded",
        }
    }
}

/// Outcome of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    /// First frame: landmarks created, pose is the identity.
    Initialized,
    /// Motion estimated and landmarks tracked.
    Tracked,
    /// Motion estimated, landmarks re-detected over the whole image.
    Redetected,
    /// First frame after a failure: landmarks re-created, pose held.
    Recovered,
    /// No motion could be estimated, pose held.
    Failed(EstimationError),
}

/// What happened during one call to `Tracker::update`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Index of the frame, counting every accepted frame.
    pub frame_index: u64,
    /// Outcome of the frame.
    pub status: FrameStatus,
    /// Camera to world pose after the frame.
    pub pose: Iso3,
    /// Estimated motion since the previous frame, see `MotionEstimate::motion`.
    pub motion: Option<Iso3>,
    /// Number of landmark correspondences given to the motion estimation.
    pub nb_correspondences: usize,
    /// Number of inliers of the estimated motion.
    pub nb_inliers: usize,
    /// Number of landmarks matched as inliers in this frame.
    pub nb_tracked: usize,
    /// Number of landmarks created in this frame.
    pub nb_born: usize,
    /// Number of landmarks dropped in this frame.
    pub nb_dropped: usize,
    /// The next frame will be a full re-detection.
    pub redetect_next: bool,
    /// Keyframe promoted at this frame.
    pub keyframe: Option<KeyframeId>,
}

impl FrameReport {
    /// True if a pose is available for this frame.
    pub fn success(&self) -> bool {
        !matches!(self.status, FrameStatus::Failed(_))
    }
}

/// Features and 3D points of the left image of a frame.
struct Observation {
    features: FeatureSet,
    points: Vec<Option<Point3>>,
    right_indices: Vec<Option<usize>>,
    strategy: TriangulationStrategy,
}

impl Observation {
    fn nb_points(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

/// Stereo visual odometry engine.
pub struct Tracker<P> {
    config: Config,
    camera: CameraModel,
    primitives: P,
    store: LandmarkStore,
    state: EngineState,
    grid: Option<GridPartition>,
    trajectory: Vec<(u64, Iso3)>,
    frame_count: u64,
    rng: StdRng,
}

impl<P: VisionPrimitives + Sync> Tracker<P> {
    /// Create a tracker after checking the configuration and the camera.
    pub fn new(config: Config, camera: CameraModel, primitives: P) -> Result<Self, VoError> {
        config.validate()?;
        let (fx, fy) = camera.intrinsics.focal;
        if !(camera.baseline > 0.0 && fx > 0.0 && fy > 0.0) {
            return Err(VoError::Config(
                "camera baseline and focal lengths must be positive".to_string(),
            ));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Tracker {
            config,
            camera,
            primitives,
            store: LandmarkStore::new(),
            state: EngineState::Uninitialized,
            grid: None,
            trajectory: Vec::new(),
            frame_count: 0,
            rng,
        })
    }

    /// Process one frame.
    ///
    /// Returns `Err` only for malformed inputs, in which case the tracker
    /// is left untouched. Estimation failures are reported in the status.
    pub fn update(&mut self, frame: &StereoFrame) -> Result<FrameReport, VoError> {
        frame.validate()?;
        let observation = self.observe(frame)?;
        let previous = match &self.state {
            EngineState::Tracking(state) => Some(state.features()?),
            _ => None,
        };

        // No error past this point.
        let (width, height) = frame.dimensions();
        let grid = self.refresh_grid(width, height);
        let frame_index = self.frame_count;
        self.frame_count += 1;
        let state = mem::replace(&mut self.state, EngineState::Uninitialized);
        let label = state.label();
        let (next, report) = match (state, previous) {
            (EngineState::Tracking(state), Some(previous)) => {
                self.track(frame_index, state, &previous, observation, &grid)
            }
            (EngineState::Degraded { pose, failure }, _) => self.initialize(
                frame_index,
                pose,
                observation,
                FrameStatus::Recovered,
                EngineState::Degraded { pose, failure },
            ),
            _ => self.initialize(
                frame_index,
                Iso3::identity(),
                observation,
                FrameStatus::Initialized,
                EngineState::Uninitialized,
            ),
        };
        if next.label() != label {
            info!(
                "frame {}: {} -> {}",
                frame_index,
                label,
                next.label()
            );
        }
        self.state = next;
        if report.success() {
            self.trajectory.push((frame_index, report.pose));
        }
        Ok(report)
    }

    /// Features and 3D points of the left image.
    fn observe(&self, frame: &StereoFrame) -> Result<Observation, VoError> {
        let strategy = match (self.config.triangulation, frame.right) {
            (TriangulationStrategy::Correspondence, Some(_)) => TriangulationStrategy::Correspondence,
            _ => TriangulationStrategy::Disparity,
        };
        let right_image = match strategy {
            TriangulationStrategy::Correspondence => frame.right,
            TriangulationStrategy::Disparity => None,
        };
        let (left, right) = features::extract_pair(
            &self.primitives,
            frame.left,
            right_image,
            self.config.k_features,
            self.config.parallel_extraction,
        )?;

        let observation = match right {
            Some(right) => {
                let matches = correspondence::stereo_match(&self.primitives, &left, &right, &self.config);
                let points = triangulation::from_stereo_matches(
                    &self.camera,
                    &left,
                    &right,
                    &matches,
                    &self.config,
                );
                let mut right_indices = vec![None; left.len()];
                for m in &matches {
                    right_indices[m.query_idx] = Some(m.train_idx);
                }
                debug!(
                    "{} left and {} right features, {} stereo matches",
                    left.len(),
                    right.len(),
                    matches.len()
                );
                Observation {
                    points,
                    right_indices,
                    features: left,
                    strategy,
                }
            }
            None => {
                let points = match (frame.disparity, frame.right) {
                    (Some(map), _) => {
                        triangulation::from_disparity_map(&self.camera, &left, map, &self.config)
                    }
                    (None, Some(right_image)) => {
                        let map = self.primitives.compute_disparity(frame.left, right_image);
                        check_disparity_shape(&map, frame.left)?;
                        triangulation::from_disparity_map(&self.camera, &left, &map, &self.config)
                    }
                    (None, None) => return Err(VoError::MissingDepthSource),
                };
                Observation {
                    points,
                    right_indices: vec![None; left.len()],
                    features: left,
                    strategy,
                }
            }
        };
        debug!(
            "{} features, {} with depth",
            observation.features.len(),
            observation.nb_points()
        );
        Ok(observation)
    }

    /// Grid of the current image size, recomputed when the size changes.
    fn refresh_grid(&mut self, width: usize, height: usize) -> GridPartition {
        match self.grid {
            Some(grid) if grid.dimensions() == (width, height) => grid,
            _ => {
                debug!("grid partition for {}x{} images", width, height);
                let grid = GridPartition::new(
                    width,
                    height,
                    self.config.x_grid_count,
                    self.config.y_grid_count,
                );
                self.grid = Some(grid);
                grid
            }
        }
    }

    /// Create landmarks from every 3D point of a frame.
    /// Transition out of `Uninitialized` and `Degraded`.
    fn initialize(
        &mut self,
        frame_index: u64,
        pose: Iso3,
        observation: Observation,
        status: FrameStatus,
        fallback: EngineState,
    ) -> (EngineState, FrameReport) {
        let indices: Vec<usize> = (0..observation.points.len())
            .filter(|&i| observation.points[i].is_some())
            .collect();
        if indices.is_empty() {
            let failure = EstimationError::TooFewCorrespondences {
                found: 0,
                required: motion::SAMPLE_SIZE,
            };
            warn!(
                "frame {}: no triangulated point, cannot initialize",
                frame_index
            );
            let report = FrameReport {
                frame_index,
                status: FrameStatus::Failed(failure),
                pose,
                motion: None,
                nb_correspondences: 0,
                nb_inliers: 0,
                nb_tracked: 0,
                nb_born: 0,
                nb_dropped: 0,
                redetect_next: true,
                keyframe: None,
            };
            return (fallback, report);
        }
        let keyframe = self.store.promote_keyframe(frame_index, pose);
        let tracks = self.birth(&observation, &indices, &pose, frame_index, keyframe);
        self.store
            .attach(keyframe, tracks.iter().map(|t| t.landmark).collect());
        let nb_born = tracks.len();
        let redetect = nb_born < self.config.k_min_features;
        info!(
            "frame {}: {} landmarks created at keyframe {}",
            frame_index, nb_born, keyframe.0
        );
        let state = TrackingState {
            tracks,
            descriptor_len: observation.features.descriptor_len(),
            pose,
            redetect,
        };
        let report = FrameReport {
            frame_index,
            status,
            pose,
            motion: None,
            nb_correspondences: 0,
            nb_inliers: 0,
            nb_tracked: nb_born,
            nb_born,
            nb_dropped: 0,
            redetect_next: redetect,
            keyframe: Some(keyframe),
        };
        (EngineState::Tracking(state), report)
    }

    /// Estimate the motion since the previous frame and update the landmarks.
    /// Transition out of `Tracking`.
    fn track(
        &mut self,
        frame_index: u64,
        state: TrackingState,
        previous: &FeatureSet,
        observation: Observation,
        grid: &GridPartition,
    ) -> (EngineState, FrameReport) {
        let matches = correspondence::temporal_match(
            &self.primitives,
            previous,
            &observation.features,
            grid,
            &self.config,
        );
        let previous_from_world = state.pose.inverse();
        let (used, correspondences): (Vec<Match>, Vec<Correspondence>) = matches
            .iter()
            .filter_map(|m| {
                let landmark = self.store.get(state.tracks[m.train_idx].landmark)?;
                let correspondence = Correspondence {
                    previous: previous_from_world * landmark.world_point,
                    current: observation.features.keypoint(m.query_idx).point(),
                    current_point: observation.points[m.query_idx],
                };
                Some((*m, correspondence))
            })
            .unzip();
        debug!(
            "frame {}: {} temporal matches over {} tracks",
            frame_index,
            correspondences.len(),
            state.tracks.len()
        );
        let params = RansacParams::from_config(&self.config);
        match motion::estimate(&self.camera, &correspondences, &params, &mut self.rng) {
            Ok(estimate) => self.advance(frame_index, state, observation, grid, &used, estimate),
            Err(failure) => self.degrade(frame_index, state, failure, correspondences.len()),
        }
    }

    /// Compose the pose and update tracks, landmarks and keyframes.
    fn advance(
        &mut self,
        frame_index: u64,
        state: TrackingState,
        observation: Observation,
        grid: &GridPartition,
        used: &[Match],
        estimate: MotionEstimate,
    ) -> (EngineState, FrameReport) {
        let pose = se3::compose(&state.pose, &estimate.motion);
        let full = state.redetect;
        let features = &observation.features;

        // Survivors: inlier matches.
        let mut matched = vec![false; state.tracks.len()];
        let mut taken = vec![false; features.len()];
        let mut occupied = vec![false; grid.cell_count()];
        let mut tracks = Vec::with_capacity(state.tracks.len());
        for (m, _) in used
            .iter()
            .zip(&estimate.inliers)
            .filter(|(_, &inlier)| inlier)
        {
            matched[m.train_idx] = true;
            taken[m.query_idx] = true;
            let keypoint = *features.keypoint(m.query_idx);
            if let Some(cell) = grid.cell_of_keypoint(&keypoint) {
                occupied[cell] = true;
            }
            tracks.push(Track {
                landmark: state.tracks[m.train_idx].landmark,
                keypoint,
                descriptor: features.descriptor_row(m.query_idx),
                misses: 0,
            });
        }
        let nb_tracked = tracks.len();

        // Misses.
        let mut nb_dropped = 0;
        for (track, matched) in state.tracks.into_iter().zip(matched) {
            if matched {
                continue;
            }
            if track.misses + 1 > self.config.max_missed_frames {
                self.store.remove(track.landmark);
                nb_dropped += 1;
            } else {
                tracks.push(Track {
                    misses: track.misses + 1,
                    ..track
                });
            }
        }

        let redetect_next = nb_tracked < self.config.k_min_features;
        let keyframe = if redetect_next {
            Some(self.store.promote_keyframe(frame_index, pose))
        } else {
            None
        };
        let anchor = keyframe
            .or_else(|| self.store.last_keyframe().map(|kf| kf.id))
            .unwrap_or(KeyframeId(0));

        // Births: everywhere on a re-detection, else in free cells only.
        let mut births = Vec::new();
        for i in 0..features.len() {
            if taken[i] || observation.points[i].is_none() {
                continue;
            }
            if full {
                births.push(i);
            } else if let Some(cell) = grid.cell_of_keypoint(features.keypoint(i)) {
                if !occupied[cell] {
                    occupied[cell] = true;
                    births.push(i);
                }
            }
        }
        let born = self.birth(&observation, &births, &pose, frame_index, anchor);
        let nb_born = born.len();
        tracks.extend(born);
        if let Some(kf) = keyframe {
            self.store
                .attach(kf, tracks.iter().map(|t| t.landmark).collect());
            info!(
                "frame {}: {} tracked < {}, keyframe {} promoted",
                frame_index, nb_tracked, self.config.k_min_features, kf.0
            );
        }
        debug!(
            "frame {}: {} inliers, {} tracked, {} born, {} dropped",
            frame_index, estimate.nb_inliers, nb_tracked, nb_born, nb_dropped
        );

        let report = FrameReport {
            frame_index,
            status: if full {
                FrameStatus::Redetected
            } else {
                FrameStatus::Tracked
            },
            pose,
            motion: Some(estimate.motion),
            nb_correspondences: used.len(),
            nb_inliers: estimate.nb_inliers,
            nb_tracked,
            nb_born,
            nb_dropped,
            redetect_next,
            keyframe,
        };
        let next = TrackingState {
            tracks,
            descriptor_len: features.descriptor_len(),
            pose,
            redetect: redetect_next,
        };
        (EngineState::Tracking(next), report)
    }

    /// Hold the pose and drop the tracked landmarks.
    /// Transition from `Tracking` to `Degraded`.
    fn degrade(
        &mut self,
        frame_index: u64,
        state: TrackingState,
        failure: EstimationError,
        nb_correspondences: usize,
    ) -> (EngineState, FrameReport) {
        warn!(
            "frame {}: motion estimation failed ({}), holding pose",
            frame_index, failure
        );
        let nb_dropped = state
            .tracks
            .iter()
            .filter(|t| self.store.remove(t.landmark).is_some())
            .count();
        let report = FrameReport {
            frame_index,
            status: FrameStatus::Failed(failure.clone()),
            pose: state.pose,
            motion: None,
            nb_correspondences,
            nb_inliers: 0,
            nb_tracked: 0,
            nb_born: 0,
            nb_dropped,
            redetect_next: true,
            keyframe: None,
        };
        let next = EngineState::Degraded {
            pose: state.pose,
            failure,
        };
        (next, report)
    }

    /// Create one landmark and its track per given feature index.
    fn birth(
        &mut self,
        observation: &Observation,
        indices: &[usize],
        pose: &Iso3,
        frame_index: u64,
        keyframe: KeyframeId,
    ) -> Vec<Track> {
        let mut tracks = Vec::with_capacity(indices.len());
        for &i in indices {
            if let Some(point) = observation.points[i] {
                let landmark = self.store.insert(Landmark {
                    camera_point: point,
                    world_point: pose * point,
                    frame_index,
                    keyframe,
                    provenance: Provenance {
                        strategy: observation.strategy,
                        left_index: i,
                        right_index: observation.right_indices[i],
                    },
                });
                tracks.push(Track {
                    landmark,
                    keypoint: *observation.features.keypoint(i),
                    descriptor: observation.features.descriptor_row(i),
                    misses: 0,
                });
            }
        }
        tracks
    }

    /// Current camera to world pose.
    pub fn pose(&self) -> Iso3 {
        match &self.state {
            EngineState::Tracking(state) => state.pose,
            EngineState::Degraded { pose, .. } => *pose,
            EngineState::Uninitialized => self
                .trajectory
                .last()
                .map_or_else(Iso3::identity, |&(_, pose)| pose),
        }
    }

    /// Current state of the engine.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Live landmarks.
    pub fn landmarks(&self) -> impl Iterator<Item = (LandmarkId, &Landmark)> {
        self.store.iter()
    }

    /// Landmark and keyframe storage.
    pub fn landmark_store(&self) -> &LandmarkStore {
        &self.store
    }

    /// All keyframes, oldest first.
    pub fn keyframes(&self) -> &[Keyframe] {
        self.store.keyframes()
    }

    /// Pose of every successful frame.
    pub fn trajectory(&self) -> &[(u64, Iso3)] {
        &self.trajectory
    }

    /// Configuration of the tracker.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Camera model of the tracker.
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }
}

/// A computed disparity map must be aligned with the left image.
fn check_disparity_shape(map: &DMatrix<Float>, left: &DMatrix<u8>) -> Result<(), VoError> {
    if map.shape() == left.shape() {
        Ok(())
    } else {
        Err(VoError::SizeMismatch {
            what: "computed disparity map",
            expected: left.shape(),
            found: map.shape(),
        })
    }
}

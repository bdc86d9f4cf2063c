// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Storage of the live landmarks and of the keyframes.
//!
//! Landmarks live in a slot map: identifiers of dropped landmarks
//! are never handed out again for another landmark.
//! Keyframes are only appended, their identifier is their index.

use slotmap::{new_key_type, SlotMap};

use crate::core::config::TriangulationStrategy;
use crate::misc::type_aliases::{Iso3, Point3};

new_key_type! {
    /// Stable identifier of a landmark.
    pub struct LandmarkId;
}

/// Identifier of a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyframeId(pub usize);

/// How a landmark was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    /// Triangulation method used.
    pub strategy: TriangulationStrategy,
    /// Index of the left feature in the frame of birth.
    pub left_index: usize,
    /// Index of the matched right feature, for stereo correspondences.
    pub right_index: Option<usize>,
}

/// A triangulated 3D point.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    /// Position in the left camera frame of the frame of birth.
    pub camera_point: Point3,
    /// Position in the world frame, fixed at birth.
    pub world_point: Point3,
    /// Index of the frame of birth.
    pub frame_index: u64,
    /// Keyframe anchoring the landmark.
    pub keyframe: KeyframeId,
    /// How the landmark was triangulated.
    pub provenance: Provenance,
}

/// A frame whose pose and observed landmarks are recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    /// Identifier of the keyframe.
    pub id: KeyframeId,
    /// Index of the frame.
    pub frame_index: u64,
    /// Camera to world pose.
    pub pose: Iso3,
    /// Landmarks tracked or born at this keyframe.
    pub landmarks: Vec<LandmarkId>,
}

/// Live landmarks and keyframe history.
#[derive(Debug, Default)]
pub struct LandmarkStore {
    landmarks: SlotMap<LandmarkId, Landmark>,
    keyframes: Vec<Keyframe>,
}

impl LandmarkStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new landmark.
    pub fn insert(&mut self, landmark: Landmark) -> LandmarkId {
        self.landmarks.insert(landmark)
    }

    /// Landmark of a given identifier, `None` if it was dropped.
    pub fn get(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(id)
    }

    /// Drop a landmark.
    pub fn remove(&mut self, id: LandmarkId) -> Option<Landmark> {
        self.landmarks.remove(id)
    }

    /// Number of live landmarks.
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    /// True if there is no live landmark.
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// All live landmarks.
    pub fn iter(&self) -> impl Iterator<Item = (LandmarkId, &Landmark)> {
        self.landmarks.iter()
    }

    /// Record a new keyframe, without landmarks yet.
    pub fn promote_keyframe(&mut self, frame_index: u64, pose: Iso3) -> KeyframeId {
        let id = KeyframeId(self.keyframes.len());
        self.keyframes.push(Keyframe {
            id,
            frame_index,
            pose,
            landmarks: Vec::new(),
        });
        id
    }

    /// Set the landmarks observed at a keyframe.
    pub fn attach(&mut self, keyframe: KeyframeId, landmarks: Vec<LandmarkId>) {
        if let Some(kf) = self.keyframes.get_mut(keyframe.0) {
            kf.landmarks = landmarks;
        }
    }

    /// All keyframes, oldest first.
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Most recent keyframe.
    pub fn last_keyframe(&self) -> Option<&Keyframe> {
        self.keyframes.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmark(z: f64) -> Landmark {
        Landmark {
            camera_point: Point3::new(0.0, 0.0, z),
            world_point: Point3::new(0.0, 0.0, z),
            frame_index: 0,
            keyframe: KeyframeId(0),
            provenance: Provenance {
                strategy: TriangulationStrategy::Disparity,
                left_index: 0,
                right_index: None,
            },
        }
    }

    #[test]
    fn dropped_identifiers_are_not_reused() {
        let mut store = LandmarkStore::new();
        let first = store.insert(landmark(1.0));
        assert!(store.remove(first).is_some());
        let second = store.insert(landmark(2.0));
        assert_ne!(first, second);
        assert_eq!(store.get(first), None);
        assert!(store.get(second).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn keyframes_are_appended() {
        let mut store = LandmarkStore::new();
        let id = store.insert(landmark(3.0));
        let kf0 = store.promote_keyframe(0, Iso3::identity());
        let kf1 = store.promote_keyframe(4, Iso3::translation(0.0, 0.0, 1.0));
        store.attach(kf1, vec![id]);
        assert_eq!((kf0, kf1), (KeyframeId(0), KeyframeId(1)));
        assert_eq!(store.keyframes().len(), 2);
        let last = store.last_keyframe().unwrap();
        assert_eq!(last.frame_index, 4);
        assert_eq!(last.landmarks, vec![id]);
    }
}

use std::fmt;

use crate::error::{TrajvizError, TrajvizResult};

pub use kurbo::{Point, Rect};

/// Joint count of a COCO skeleton.
pub const COCO_JOINTS: usize = 17;
/// Joint count of the extended (neck-augmented) skeleton.
pub const EXTENDED_JOINTS: usize = 18;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameId(pub u64);

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PersonId(pub u32);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which trajectory set an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Source {
    Prediction,
    GroundTruth,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Prediction, Source::GroundTruth];

    /// Category suffix used in output paths (`all_pred`, `all_gt`).
    pub fn tag(self) -> &'static str {
        match self {
            Source::Prediction => "pred",
            Source::GroundTruth => "gt",
        }
    }
}

/// Camera + scene pair, e.g. camera `01`, scene `0025`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SceneId {
    pub camera: String,
    pub scene: String,
}

impl SceneId {
    pub fn new(camera: impl Into<String>, scene: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            scene: scene.into(),
        }
    }

    /// Parses a `<camera>_<scene>` directory or file stem.
    pub fn parse(composite: &str) -> Option<Self> {
        let (camera, scene) = composite.split_once('_')?;
        if camera.is_empty() || scene.is_empty() {
            return None;
        }
        Some(Self::new(camera, scene))
    }

    /// Composite key used by anomaly masks.
    pub fn key(&self) -> String {
        format!("{}_{}", self.camera, self.scene)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.camera, self.scene)
    }
}

/// A joint location in source-frame pixels.
///
/// A coordinate of exactly zero marks the joint as undetected; such joints are
/// excluded from drawing and from every extent computation.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keypoint(pub Point);

impl Keypoint {
    pub const MISSING: Keypoint = Keypoint(Point::ZERO);

    pub fn new(x: f64, y: f64) -> Self {
        Self(Point::new(x, y))
    }

    pub fn is_missing(self) -> bool {
        self.0.x == 0.0 || self.0.y == 0.0
    }

    pub fn x(self) -> f64 {
        self.0.x
    }

    pub fn y(self) -> f64 {
        self.0.y
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Skeleton {
    joints: Vec<Keypoint>,
}

impl Skeleton {
    pub fn new(joints: Vec<Keypoint>) -> TrajvizResult<Self> {
        if joints.len() != COCO_JOINTS && joints.len() != EXTENDED_JOINTS {
            return Err(TrajvizError::data(format!(
                "skeleton must have {COCO_JOINTS} or {EXTENDED_JOINTS} joints, got {}",
                joints.len()
            )));
        }
        Ok(Self { joints })
    }

    /// Builds a skeleton from interleaved `x0,y0,x1,y1,...` coordinates.
    pub fn from_flat(coords: &[f64]) -> TrajvizResult<Self> {
        if !coords.len().is_multiple_of(2) {
            return Err(TrajvizError::data(format!(
                "odd coordinate count {}",
                coords.len()
            )));
        }
        Self::new(
            coords
                .chunks_exact(2)
                .map(|xy| Keypoint::new(xy[0], xy[1]))
                .collect(),
        )
    }

    pub fn joints(&self) -> &[Keypoint] {
        &self.joints
    }

    pub fn joint(&self, id: usize) -> Option<Keypoint> {
        self.joints.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.iter().all(|k| k.is_missing())
    }

    /// Extent of the detected joints, `None` when every joint is missing.
    pub fn bounds(&self) -> Option<Rect> {
        let mut visible = self.joints.iter().filter(|k| !k.is_missing());
        let first = visible.next()?;
        let init = Rect::from_points(first.0, first.0);
        Some(visible.fold(init, |r, k| r.union_pt(k.0)))
    }

    /// Multiplies every detected joint by `factor`; missing joints stay missing.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            joints: self
                .joints
                .iter()
                .map(|&k| {
                    if k.is_missing() {
                        k
                    } else {
                        Keypoint::new(k.x() * factor, k.y() * factor)
                    }
                })
                .collect(),
        }
    }

    /// Joint used to anchor text labels: joint 1, else the first detected joint.
    pub fn anchor(&self) -> Option<Keypoint> {
        self.joint(1)
            .filter(|k| !k.is_missing())
            .or_else(|| self.joints.iter().copied().find(|k| !k.is_missing()))
    }
}

/// One loaded trajectory row.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryRecord {
    pub frame: FrameId,
    pub person: PersonId,
    pub skeleton: Skeleton,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords_with_first(n: usize) -> Vec<f64> {
        let mut v = vec![0.0; COCO_JOINTS * 2];
        for i in 0..n {
            v[2 * i] = 10.0 + i as f64;
            v[2 * i + 1] = 20.0 + i as f64;
        }
        v
    }

    #[test]
    fn skeleton_rejects_bad_joint_counts() {
        assert!(Skeleton::from_flat(&[1.0; 10]).is_err());
        assert!(Skeleton::from_flat(&[1.0; 35]).is_err());
        assert!(Skeleton::from_flat(&[1.0; 34]).is_ok());
        assert!(Skeleton::from_flat(&[1.0; 36]).is_ok());
    }

    #[test]
    fn bounds_ignore_missing_joints() {
        let s = Skeleton::from_flat(&coords_with_first(3)).unwrap();
        let b = s.bounds().unwrap();
        assert_eq!((b.x0, b.y0, b.x1, b.y1), (10.0, 20.0, 12.0, 22.0));

        let empty = Skeleton::from_flat(&coords_with_first(0)).unwrap();
        assert!(empty.is_empty());
        assert!(empty.bounds().is_none());
    }

    #[test]
    fn anchor_falls_back_when_reference_joint_missing() {
        let mut c = coords_with_first(0);
        c[8] = 50.0;
        c[9] = 60.0;
        let s = Skeleton::from_flat(&c).unwrap();
        assert_eq!(s.anchor(), Some(Keypoint::new(50.0, 60.0)));
    }

    #[test]
    fn scene_id_parses_composite_names() {
        let id = SceneId::parse("01_0025").unwrap();
        assert_eq!(id, SceneId::new("01", "0025"));
        assert_eq!(id.key(), "01_0025");
        assert!(SceneId::parse("nounderscore").is_none());
    }
}

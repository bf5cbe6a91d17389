use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    compositor::SourceDraw,
    core::{PersonId, SceneId, Source},
    error::{TrajvizError, TrajvizResult},
    trajectory::{TrackFilter, TrajectoryFormat},
};

fn default_scale() -> u32 {
    1
}

fn default_max_tracks() -> usize {
    TrackFilter::default().max_tracks
}

/// Everything one scene render needs.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderConfig {
    /// Directory of decoded frames, usually named `<camera>_<scene>`.
    pub frames: PathBuf,
    pub write_dir: PathBuf,
    #[serde(default)]
    pub trajectories: Option<PathBuf>,
    #[serde(default)]
    pub gt_trajectories: Option<PathBuf>,
    /// Mask table file or directory of per-scene `.npy` arrays.
    #[serde(default)]
    pub masks: Option<PathBuf>,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub person: Option<u32>,
    #[serde(default = "default_max_tracks")]
    pub max_tracks: usize,
    /// Isolated-view mode; requires `person`.
    #[serde(default)]
    pub local_skeleton: bool,
    #[serde(default)]
    pub prediction: SourceDraw,
    #[serde(default)]
    pub ground_truth: SourceDraw,
    #[serde(default)]
    pub format: TrajectoryFormat,
}

impl RenderConfig {
    pub fn new(frames: impl Into<PathBuf>, write_dir: impl Into<PathBuf>) -> Self {
        Self {
            frames: frames.into(),
            write_dir: write_dir.into(),
            trajectories: None,
            gt_trajectories: None,
            masks: None,
            camera: None,
            scene: None,
            scale: default_scale(),
            person: None,
            max_tracks: default_max_tracks(),
            local_skeleton: false,
            prediction: SourceDraw::default(),
            ground_truth: SourceDraw::default(),
            format: TrajectoryFormat::default(),
        }
    }

    pub fn from_json_file(path: &Path) -> TrajvizResult<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("open config '{}'", path.display()))?;
        let cfg = serde_json::from_reader(std::io::BufReader::new(f))
            .with_context(|| format!("parse config '{}'", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> TrajvizResult<()> {
        if self.trajectories.is_none() && self.gt_trajectories.is_none() {
            return Err(TrajvizError::config(
                "at least one of the predicted or ground-truth trajectory directories must be given",
            ));
        }
        let draws = [self.prediction, self.ground_truth];
        if !self.local_skeleton && !draws.iter().any(|d| d.skeleton || d.bbox) {
            return Err(TrajvizError::config(
                "nothing to draw: enable a skeleton or bounding box for at least one source",
            ));
        }
        if self.local_skeleton && self.person.is_none() {
            return Err(TrajvizError::config(
                "local skeleton mode needs a person id to isolate",
            ));
        }
        if self.scale == 0 {
            return Err(TrajvizError::config("scale must be >= 1"));
        }
        if self.max_tracks == 0 {
            return Err(TrajvizError::config("max_tracks must be >= 1"));
        }
        Ok(())
    }

    /// Drawing options after mode overrides: local mode draws skeletons only.
    pub fn effective_draw(&self, source: Source) -> SourceDraw {
        let draw = match source {
            Source::Prediction => self.prediction,
            Source::GroundTruth => self.ground_truth,
        };
        if self.local_skeleton {
            SourceDraw {
                skeleton: true,
                bbox: false,
                ..draw
            }
        } else {
            draw
        }
    }

    pub fn trajectory_dir(&self, source: Source) -> Option<&Path> {
        match source {
            Source::Prediction => self.trajectories.as_deref(),
            Source::GroundTruth => self.gt_trajectories.as_deref(),
        }
    }

    pub fn track_filter(&self) -> TrackFilter {
        TrackFilter {
            person: self.person.map(PersonId),
            max_tracks: self.max_tracks,
        }
    }

    /// Camera from the frames directory prefix (`01_0025` -> `01`), scene
    /// from the trajectory directory name, unless set explicitly.
    pub fn scene_id(&self) -> TrajvizResult<SceneId> {
        let camera = match &self.camera {
            Some(c) => c.clone(),
            None => {
                let name = dir_name(&self.frames).ok_or_else(|| {
                    TrajvizError::config(format!(
                        "cannot derive camera id from '{}'",
                        self.frames.display()
                    ))
                })?;
                name.split('_').next().unwrap_or(&name).to_string()
            }
        };
        let scene = match &self.scene {
            Some(s) => s.clone(),
            None => self
                .trajectories
                .as_deref()
                .or(self.gt_trajectories.as_deref())
                .and_then(dir_name)
                .ok_or_else(|| TrajvizError::config("cannot derive scene id"))?,
        };
        Ok(SceneId::new(camera, scene))
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|s| !s.is_empty() && s != "." && s != "/")
}

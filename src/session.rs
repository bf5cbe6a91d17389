//! One render pass over a scene, and the batch driver over a dataset tree.
//!
//! Each source is walked in frame order. A frame's buffers are written and
//! released as soon as every track has moved past it, so memory holds one
//! frame's cells per source at a time while producing the same images as
//! drawing each person's whole track in turn.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    compositor::{Applied, Compositor, CompositorOpts},
    config::RenderConfig,
    core::{FrameId, PersonId, SceneId, Source},
    error::{TrajvizError, TrajvizResult},
    frames::{DirFrameSource, FrameSource},
    mask::AnomalyMask,
    output::{OutputLayout, OutputWriter, WriteStats},
    trajectory::{Track, open_source},
};

/// Per-source counters of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub tracks: usize,
    pub drawn: u64,
    pub anomalous: u64,
    pub out_of_range: u64,
    pub empty: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderReport {
    pub scene: SceneId,
    pub frames: u64,
    pub prediction: SourceReport,
    pub ground_truth: SourceReport,
    pub written: WriteStats,
}

impl RenderReport {
    pub fn source(&self, source: Source) -> &SourceReport {
        match source {
            Source::Prediction => &self.prediction,
            Source::GroundTruth => &self.ground_truth,
        }
    }

    fn source_mut(&mut self, source: Source) -> &mut SourceReport {
        match source {
            Source::Prediction => &mut self.prediction,
            Source::GroundTruth => &mut self.ground_truth,
        }
    }
}

/// Renders one scene from the paths in `config`.
pub fn render_scene(config: &RenderConfig) -> TrajvizResult<RenderReport> {
    config.validate()?;
    warn_if_overwriting(&config.write_dir);
    open_and_render(config)
}

#[tracing::instrument(skip(config), fields(frames = %config.frames.display()))]
fn open_and_render(config: &RenderConfig) -> TrajvizResult<RenderReport> {
    let scene = config.scene_id()?;
    let frames = DirFrameSource::open(&config.frames)?;
    let mask = match config.masks.as_deref() {
        Some(path) => AnomalyMask::load_or_empty(path),
        None => AnomalyMask::empty(),
    };
    render_with(config, &scene, &frames, &mask)
}

/// One notice per run, before any image is written.
fn warn_if_overwriting(write_dir: &Path) -> bool {
    let exists = write_dir.exists();
    if exists {
        tracing::warn!(
            dir = %write_dir.display(),
            "output directory exists; images will be overwritten"
        );
    }
    exists
}

/// Renders one scene from already-opened inputs. Callers own the
/// overwrite notice.
pub fn render_with(
    config: &RenderConfig,
    scene: &SceneId,
    frames: &dyn FrameSource,
    mask: &AnomalyMask,
) -> TrajvizResult<RenderReport> {
    config.validate()?;

    let mut writer = OutputWriter::new(OutputLayout::new(&config.write_dir, scene.clone()));
    writer.prepare()?;

    let opts = CompositorOpts {
        scene: scene.clone(),
        scale: config.scale,
        prediction: config.effective_draw(Source::Prediction),
        ground_truth: config.effective_draw(Source::GroundTruth),
    };
    let mut compositor = Compositor::new(frames, mask, opts)?;

    let mut report = RenderReport {
        scene: scene.clone(),
        frames: frames.frame_count(),
        prediction: SourceReport::default(),
        ground_truth: SourceReport::default(),
        written: WriteStats::default(),
    };

    let filter = config.track_filter();
    for source in Source::ALL {
        let tracks = match config.trajectory_dir(source) {
            Some(dir) => open_source(config.format, dir).load_tracks(&filter)?,
            None => Vec::new(),
        };
        let counts = render_source(&mut compositor, &mut writer, source, &tracks)?;
        tracing::info!(
            source = source.tag(),
            tracks = counts.tracks,
            drawn = counts.drawn,
            anomalous = counts.anomalous,
            "source rendered"
        );
        *report.source_mut(source) = counts;
    }

    report.written = writer.stats();
    tracing::info!(
        scene = %scene,
        images = report.written.images,
        "scene rendered"
    );
    Ok(report)
}

/// Walks every frame of the scene for one source and flushes it.
///
/// Within a frame, tracks are applied in ascending person order, and each
/// track's rows for that frame in file order.
pub fn render_source(
    compositor: &mut Compositor<'_>,
    writer: &mut OutputWriter,
    source: Source,
    tracks: &[Track],
) -> TrajvizResult<SourceReport> {
    let mut report = SourceReport {
        tracks: tracks.len(),
        ..SourceReport::default()
    };
    let persons: Vec<PersonId> = tracks.iter().map(|t| t.person).collect();
    let mut cursors = vec![0usize; tracks.len()];
    let frame_count = compositor.frames().frame_count();

    for f in 0..frame_count {
        let frame = FrameId(f);
        for (track, cursor) in tracks.iter().zip(cursors.iter_mut()) {
            while let Some(record) = track.records.get(*cursor)
                && record.frame <= frame
            {
                *cursor += 1;
                match compositor.apply(record, source)? {
                    Applied::Drawn { anomalous } => {
                        report.drawn += 1;
                        report.anomalous += u64::from(anomalous);
                    }
                    Applied::Empty => {
                        tracing::debug!(person = track.person.0, frame = f, "skipping empty skeleton");
                        report.empty += 1;
                    }
                    Applied::OutOfRange => report.out_of_range += 1,
                }
            }
        }
        writer.flush_frame(compositor, source, frame, &persons)?;
    }

    for (track, cursor) in tracks.iter().zip(&cursors) {
        let rest = track.records.len().saturating_sub(*cursor);
        if rest > 0 {
            tracing::debug!(
                person = track.person.0,
                rows = rest,
                frames = frame_count,
                "rows past the last frame skipped"
            );
            report.out_of_range += rest as u64;
        }
    }
    Ok(report)
}

/// Roots of a dataset laid out as
/// `frames/<camera>_<scene>/`, `pred/<scene>/`, `gt/<camera>/<scene>/`
/// and `<test_data>/frame_level_masks/<camera>/`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BatchRoots {
    pub frames: PathBuf,
    pub predictions: PathBuf,
    #[serde(default)]
    pub ground_truth: Option<PathBuf>,
    #[serde(default)]
    pub test_data: Option<PathBuf>,
}

impl BatchRoots {
    /// Per-scene config derived from `template`, or `None` when the scene has
    /// no predicted trajectories.
    pub fn scene_config(&self, template: &RenderConfig, frames_dir: &Path) -> Option<RenderConfig> {
        let name = frames_dir.file_name()?.to_string_lossy().into_owned();
        let (camera, scene) = name.split_once('_')?;
        let pred = self.predictions.join(scene);
        if !pred.is_dir() {
            return None;
        }
        let mut cfg = template.clone();
        cfg.frames = frames_dir.to_path_buf();
        cfg.trajectories = Some(pred);
        cfg.gt_trajectories = self
            .ground_truth
            .as_ref()
            .map(|root| root.join(camera).join(scene))
            .filter(|dir| dir.is_dir());
        cfg.masks = self
            .test_data
            .as_ref()
            .map(|root| root.join("frame_level_masks").join(camera));
        cfg.camera = Some(camera.to_string());
        cfg.scene = Some(scene.to_string());
        Some(cfg)
    }
}

/// Renders every `<camera>_<scene>` directory under `roots.frames` in name order.
#[tracing::instrument(skip_all, fields(frames = %roots.frames.display()))]
pub fn render_batch(template: &RenderConfig, roots: &BatchRoots) -> TrajvizResult<Vec<RenderReport>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&roots.frames)
        .with_context(|| format!("read frames root '{}'", roots.frames.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    warn_if_overwriting(&template.write_dir);
    let mut reports = Vec::new();
    for dir in dirs {
        let Some(cfg) = roots.scene_config(template, &dir) else {
            tracing::info!(dir = %dir.display(), "no predicted trajectories; skipping scene");
            continue;
        };
        reports.push(open_and_render(&cfg)?);
    }
    if reports.is_empty() {
        return Err(TrajvizError::data(format!(
            "no renderable scenes under '{}'",
            roots.frames.display()
        )));
    }
    Ok(reports)
}

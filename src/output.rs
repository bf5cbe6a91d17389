use std::{
    collections::HashSet,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use image::{RgbImage, codecs::jpeg::JpegEncoder};

use crate::{
    compositor::{AggregateCell, Compositor, IndividualCell},
    core::{FrameId, PersonId, SceneId, Source},
    error::{TrajvizError, TrajvizResult},
};

pub const JPEG_QUALITY: u8 = 95;

/// Photographic renders go under `frames/`, blank-canvas renders under `trajectories/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanvasKind {
    Photo,
    Blank,
}

impl CanvasKind {
    fn dir_name(self) -> &'static str {
        match self {
            CanvasKind::Photo => "frames",
            CanvasKind::Blank => "trajectories",
        }
    }
}

/// `<root>/<frames|trajectories>/all_<pred|gt>/<camera>/<scene>[/<person>]/<stem>.jpg`
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
    scene: SceneId,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, scene: SceneId) -> Self {
        Self {
            root: root.into(),
            scene,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scene_dir(&self, kind: CanvasKind, source: Source) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("all_{}", source.tag()))
            .join(&self.scene.camera)
            .join(&self.scene.scene)
    }

    pub fn aggregate_path(&self, kind: CanvasKind, source: Source, frame_name: &str) -> PathBuf {
        self.scene_dir(kind, source).join(output_file_name(frame_name))
    }

    pub fn individual_path(
        &self,
        kind: CanvasKind,
        source: Source,
        person: PersonId,
        frame_name: &str,
    ) -> PathBuf {
        self.scene_dir(kind, source)
            .join(person.to_string())
            .join(output_file_name(frame_name))
    }
}

/// `000.png` -> `000.jpg`
pub fn output_file_name(frame_name: &str) -> String {
    let stem = Path::new(frame_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| frame_name.to_string());
    format!("{stem}.jpg")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub images: u64,
    pub gap_filled_aggregate: u64,
    pub gap_filled_individual: u64,
}

/// Persists drained compositor cells, gap-filling untouched ones.
pub struct OutputWriter {
    layout: OutputLayout,
    quality: u8,
    created_dirs: HashSet<PathBuf>,
    stats: WriteStats,
}

impl OutputWriter {
    pub fn new(layout: OutputLayout) -> Self {
        Self {
            layout,
            quality: JPEG_QUALITY,
            created_dirs: HashSet::new(),
            stats: WriteStats::default(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Creates the four aggregate category directories for both canvas kinds.
    pub fn prepare(&mut self) -> TrajvizResult<()> {
        for kind in [CanvasKind::Photo, CanvasKind::Blank] {
            for source in Source::ALL {
                let dir = self.layout.scene_dir(kind, source);
                self.ensure_dir(&dir)?;
            }
        }
        Ok(())
    }

    fn ensure_dir(&mut self, dir: &Path) -> TrajvizResult<()> {
        if self.created_dirs.contains(dir) {
            return Ok(());
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir '{}'", dir.display()))?;
        self.created_dirs.insert(dir.to_path_buf());
        Ok(())
    }

    fn write(&mut self, path: &Path, img: &RgbImage) -> TrajvizResult<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent)?;
        }
        write_jpeg(path, img, self.quality)?;
        self.stats.images += 1;
        Ok(())
    }

    /// Writes and drops every buffer of `frame` for `source`. Each person in
    /// `persons` gets an individual image even if it never touched the frame.
    pub fn flush_frame(
        &mut self,
        compositor: &mut Compositor<'_>,
        source: Source,
        frame: FrameId,
        persons: &[PersonId],
    ) -> TrajvizResult<()> {
        let frame_name = compositor
            .frames()
            .frame_name(frame)
            .ok_or_else(|| TrajvizError::data(format!("frame {} out of range", frame.0)))?
            .to_string();

        let (aggregate, mut individuals) = compositor.take_frame(source, frame);
        let aggregate = match aggregate {
            Some(cell) => cell,
            None => {
                self.stats.gap_filled_aggregate += 1;
                AggregateCell::seeded(compositor.seed_photo(frame)?)
            }
        };

        for &person in persons {
            if !individuals.iter().any(|(p, _)| *p == person) {
                self.stats.gap_filled_individual += 1;
                let cell = IndividualCell::seeded(compositor.seed_photo(frame)?);
                individuals.push((person, cell));
            }
        }
        individuals.sort_by_key(|(p, _)| *p);

        let photo = self
            .layout
            .aggregate_path(CanvasKind::Photo, source, &frame_name);
        self.write(&photo, &aggregate.photo)?;
        let blank = self
            .layout
            .aggregate_path(CanvasKind::Blank, source, &frame_name);
        self.write(&blank, &aggregate.blank)?;
        drop(aggregate);

        for (person, cell) in individuals {
            let photo = self
                .layout
                .individual_path(CanvasKind::Photo, source, person, &frame_name);
            self.write(&photo, &cell.photo)?;
            let blank = self
                .layout
                .individual_path(CanvasKind::Blank, source, person, &frame_name);
            self.write(&blank, &cell.blank)?;
        }
        Ok(())
    }
}

pub fn write_jpeg(path: &Path, img: &RgbImage, quality: u8) -> TrajvizResult<()> {
    let f = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
    let mut w = BufWriter::new(f);
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut w, quality))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_follow_category_tree() {
        let layout = OutputLayout::new("out", SceneId::new("01", "0025"));
        assert_eq!(
            layout.aggregate_path(CanvasKind::Photo, Source::Prediction, "000.jpg"),
            PathBuf::from("out/frames/all_pred/01/0025/000.jpg")
        );
        assert_eq!(
            layout.individual_path(CanvasKind::Blank, Source::GroundTruth, PersonId(3), "007.png"),
            PathBuf::from("out/trajectories/all_gt/01/0025/3/007.jpg")
        );
    }

    #[test]
    fn output_names_keep_the_frame_stem() {
        assert_eq!(output_file_name("000.jpg"), "000.jpg");
        assert_eq!(output_file_name("frame_12.png"), "frame_12.jpg");
        assert_eq!(output_file_name("noext"), "noext.jpg");
    }
}

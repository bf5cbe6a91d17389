use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::{RgbImage, imageops::FilterType};

use crate::{
    core::FrameId,
    error::{TrajvizError, TrajvizResult},
};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tif"];

/// Ordered decoded frames of one scene. Frame ids index [`FrameSource::frame_names`].
pub trait FrameSource {
    fn frame_names(&self) -> &[String];

    fn decode(&self, frame: FrameId) -> TrajvizResult<RgbImage>;

    fn frame_count(&self) -> u64 {
        self.frame_names().len() as u64
    }

    fn frame_name(&self, frame: FrameId) -> Option<&str> {
        let idx = usize::try_from(frame.0).ok()?;
        self.frame_names().get(idx).map(String::as_str)
    }
}

/// Image files of a directory in lexicographic file-name order.
#[derive(Clone, Debug)]
pub struct DirFrameSource {
    dir: PathBuf,
    names: Vec<String>,
}

impl DirFrameSource {
    pub fn open(dir: impl Into<PathBuf>) -> TrajvizResult<Self> {
        let dir = dir.into();
        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .with_context(|| format!("read frames directory '{}'", dir.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| is_image_name(n))
            .collect();
        names.sort();
        Ok(Self { dir, names })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

impl FrameSource for DirFrameSource {
    fn frame_names(&self) -> &[String] {
        &self.names
    }

    fn decode(&self, frame: FrameId) -> TrajvizResult<RgbImage> {
        let name = self
            .frame_name(frame)
            .ok_or_else(|| TrajvizError::data(format!("frame {} out of range", frame.0)))?;
        let path = self.dir.join(name);
        let img = image::open(&path).with_context(|| format!("decode frame '{}'", path.display()))?;
        Ok(img.to_rgb8())
    }
}

/// Frames held in memory, for callers that decode elsewhere.
#[derive(Clone, Debug, Default)]
pub struct MemoryFrameSource {
    names: Vec<String>,
    frames: Vec<RgbImage>,
}

impl MemoryFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, frame: RgbImage) {
        self.names.push(name.into());
        self.frames.push(frame);
    }
}

impl FrameSource for MemoryFrameSource {
    fn frame_names(&self) -> &[String] {
        &self.names
    }

    fn decode(&self, frame: FrameId) -> TrajvizResult<RgbImage> {
        usize::try_from(frame.0)
            .ok()
            .and_then(|i| self.frames.get(i))
            .cloned()
            .ok_or_else(|| TrajvizError::data(format!("frame {} out of range", frame.0)))
    }
}

/// Integer upscale applied to every photographic buffer.
pub fn upscale(img: RgbImage, scale: u32) -> RgbImage {
    if scale <= 1 {
        return img;
    }
    let (w, h) = img.dimensions();
    image::imageops::resize(&img, w * scale, h * scale, FilterType::Triangle)
}

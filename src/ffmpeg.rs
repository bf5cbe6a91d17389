//! Video collaborators backed by the system `ffmpeg` binary: splitting a
//! video into numbered JPEG frames, and encoding a directory of rendered
//! frames back into an MP4.

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use anyhow::Context as _;
use image::RgbImage;

use crate::{
    core::FrameId,
    error::{TrajvizError, TrajvizResult},
    frames::{DirFrameSource, FrameSource},
};

pub const DEFAULT_FPS: u32 = 30;

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> TrajvizResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TrajvizError::config("encode width/height must be non-zero"));
        }
        if self.fps == 0 {
            return Err(TrajvizError::config("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(TrajvizError::config(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn require_ffmpeg() -> TrajvizResult<()> {
    if is_ffmpeg_on_path() {
        Ok(())
    } else {
        Err(TrajvizError::config(
            "ffmpeg is required for video input/output, but was not found on PATH",
        ))
    }
}

pub fn ensure_parent_dir(path: &Path) -> TrajvizResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Streams raw RGB frames into an `ffmpeg` child producing H.264 MP4.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig) -> TrajvizResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(TrajvizError::config(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }
        require_ffmpeg()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&cfg.out_path);

        let mut child = cmd
            .spawn()
            .map_err(|e| TrajvizError::data(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TrajvizError::data("failed to open ffmpeg stdin"))?;

        Ok(Self {
            cfg,
            child,
            stdin: Some(stdin),
        })
    }

    pub fn encode_frame(&mut self, frame: &RgbImage) -> TrajvizResult<()> {
        if frame.dimensions() != (self.cfg.width, self.cfg.height) {
            return Err(TrajvizError::data(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.cfg.width,
                self.cfg.height
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TrajvizError::data("ffmpeg encoder is already finalized"));
        };
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| TrajvizError::data(format!("failed to write frame to ffmpeg stdin: {e}")))?;
        Ok(())
    }

    pub fn finish(mut self) -> TrajvizResult<()> {
        drop(self.stdin.take());
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| TrajvizError::data(format!("failed to wait for ffmpeg to finish: {e}")))?;
        check_status(&output)
    }
}

fn check_status(output: &std::process::Output) -> TrajvizResult<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(TrajvizError::data(format!(
        "ffmpeg exited with status {}: {}",
        output.status,
        stderr.trim()
    )))
}

/// Largest even dimensions not exceeding `(w, h)`.
pub fn even_dimensions(w: u32, h: u32) -> (u32, u32) {
    (w & !1, h & !1)
}

/// Encodes the images of `dir`, in file-name order, into `out`. Frames are
/// cropped to even dimensions; frames that fail to decode are skipped.
#[tracing::instrument(skip_all, fields(dir = %dir.display(), out = %out.display()))]
pub fn encode_frames_dir(dir: &Path, out: &Path, fps: u32) -> TrajvizResult<u64> {
    let frames = DirFrameSource::open(dir)?;
    if frames.frame_count() == 0 {
        return Err(TrajvizError::data(format!("no images in '{}'", dir.display())));
    }
    let first = frames.decode(FrameId(0))?;
    let (width, height) = even_dimensions(first.width(), first.height());
    let mut encoder = FfmpegEncoder::new(EncodeConfig {
        width,
        height,
        fps,
        out_path: out.to_path_buf(),
        overwrite: true,
    })?;

    let mut written = 0;
    for i in 0..frames.frame_count() {
        let img = match frames.decode(FrameId(i)) {
            Ok(img) => img,
            Err(err) => {
                tracing::warn!(frame = i, %err, "skipping unreadable frame");
                continue;
            }
        };
        let img = if img.dimensions() == (width, height) {
            img
        } else {
            image::imageops::crop_imm(&img, 0, 0, width, height).to_image()
        };
        encoder.encode_frame(&img)?;
        written += 1;
    }
    encoder.finish()?;
    tracing::info!(frames = written, "video written");
    Ok(written)
}

/// Splits `video` into `001.jpg`, `002.jpg`, ... under `out_dir`.
/// Returns the number of frames written.
#[tracing::instrument(skip_all, fields(video = %video.display()))]
pub fn extract_frames(video: &Path, out_dir: &Path) -> TrajvizResult<u64> {
    require_ffmpeg()?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create frames directory '{}'", out_dir.display()))?;

    let output = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(video)
        .args(["-start_number", "1", "-q:v", "2"])
        .arg(out_dir.join("%03d.jpg"))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| TrajvizError::data(format!("failed to spawn ffmpeg: {e}")))?;
    check_status(&output)?;

    let count = DirFrameSource::open(out_dir)?.frame_count();
    tracing::info!(frames = count, dir = %out_dir.display(), "frames extracted");
    Ok(count)
}

/// Extracts every `*.avi` under `videos_dir` into `out_root/<video stem>/`.
pub fn extract_dataset(videos_dir: &Path, out_root: &Path) -> TrajvizResult<u64> {
    let mut videos: Vec<PathBuf> = std::fs::read_dir(videos_dir)
        .with_context(|| format!("read video directory '{}'", videos_dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("avi"))
        })
        .collect();
    videos.sort();
    if videos.is_empty() {
        tracing::warn!(dir = %videos_dir.display(), "no .avi files found");
    }

    let mut total = 0;
    for video in videos {
        let Some(stem) = video.file_stem() else {
            continue;
        };
        let count = extract_frames(&video, &out_root.join(stem))?;
        if count == 0 {
            tracing::warn!(video = %video.display(), "no frames extracted");
        }
        total += count;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(width: u32, height: u32, fps: u32) -> EncodeConfig {
        EncodeConfig {
            width,
            height,
            fps,
            out_path: PathBuf::from("target/out.mp4"),
            overwrite: true,
        }
    }

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(cfg(0, 10, 30).validate().is_err());
        assert!(cfg(11, 10, 30).validate().is_err());
        assert!(cfg(10, 10, 0).validate().is_err());
        assert!(cfg(10, 10, 30).validate().is_ok());
    }

    #[test]
    fn odd_dimensions_round_down() {
        assert_eq!(even_dimensions(857, 480), (856, 480));
        assert_eq!(even_dimensions(1, 3), (0, 2));
    }

    #[test]
    fn empty_frames_dir_is_an_error() {
        let dir = PathBuf::from("target").join("ffmpeg_empty_frames");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let err = encode_frames_dir(&dir, &dir.join("out.mp4"), DEFAULT_FPS).unwrap_err();
        assert!(err.to_string().contains("no images"));
    }
}

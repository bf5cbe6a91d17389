//! Frame-level anomaly labels.
//!
//! Two encodings are accepted:
//! - a CSV table whose first column is the `<camera>_<scene>` key and whose
//!   last column is the 0/1 flag; consecutive rows of one key are that scene's
//!   frames in order, and a middle column, when present, gives the frame
//!   index explicitly;
//! - a directory of per-scene `.npy` arrays named `<camera>_<scene>.npy`.
//!
//! Lookups never fail: unknown scenes and frames past the end of a scene's
//! labels read as "not anomalous".

use std::{
    collections::HashMap,
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use ndarray::ArrayD;
use ndarray_npy::{ReadNpyExt as _, ReadableElement};

use crate::{
    core::{FrameId, SceneId},
    error::{TrajvizError, TrajvizResult},
};

/// Largest explicit frame index a mask table may name. Scenes run to a few
/// thousand frames; anything far beyond is a corrupt row.
pub const MAX_MASK_FRAMES: usize = 10_000_000;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnomalyMask {
    scenes: HashMap<String, Vec<bool>>,
}

impl AnomalyMask {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn insert(&mut self, key: impl Into<String>, flags: Vec<bool>) {
        self.scenes.insert(key.into(), flags);
    }

    pub fn is_anomalous(&self, scene: &SceneId, frame: FrameId) -> bool {
        let Ok(idx) = usize::try_from(frame.0) else {
            return false;
        };
        self.scenes
            .get(&scene.key())
            .and_then(|flags| flags.get(idx))
            .copied()
            .unwrap_or(false)
    }

    /// Loads whatever `path` points at, degrading to an empty mask on error.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(mask) => {
                tracing::info!(
                    path = %path.display(),
                    scenes = mask.scene_count(),
                    "loaded anomaly masks"
                );
                mask
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "anomaly masks unavailable; rendering without labels"
                );
                Self::empty()
            }
        }
    }

    /// A file is read as a table; a directory yields every `.npy` and `.csv`
    /// inside it.
    pub fn load(path: &Path) -> TrajvizResult<Self> {
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            let f = fs::File::open(path)
                .with_context(|| format!("open mask table '{}'", path.display()))?;
            Self::from_table_reader(f)
        }
    }

    pub fn load_dir(dir: &Path) -> TrajvizResult<Self> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("read mask directory '{}'", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        let mut mask = Self::empty();
        for path in entries {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let loaded = match ext {
                "npy" => load_npy_flags(&path).map(|flags| {
                    let key = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    mask.insert(key, flags);
                }),
                "csv" => fs::File::open(&path)
                    .map_err(TrajvizError::from)
                    .and_then(Self::from_table_reader)
                    .map(|table| mask.scenes.extend(table.scenes)),
                _ => continue,
            };
            if let Err(e) = loaded {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable mask file");
            }
        }
        Ok(mask)
    }

    pub fn from_table_reader<R: Read>(reader: R) -> TrajvizResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut mask = Self::empty();
        for (row, record) in rdr.records().enumerate() {
            let record = record.context("read mask table row")?;
            if record.len() < 2 {
                return Err(TrajvizError::format(format!(
                    "mask table row {row}: expected at least 2 columns, got {}",
                    record.len()
                )));
            }

            let key = &record[0];
            let flag = match parse_flag(&record[record.len() - 1]) {
                Some(f) => f,
                None if row == 0 => continue, // header
                None => {
                    return Err(TrajvizError::format(format!(
                        "mask table row {row}: flag '{}' is not numeric",
                        &record[record.len() - 1]
                    )));
                }
            };

            let flags = mask.scenes.entry(key.to_string()).or_default();
            if record.len() >= 3 {
                let frame: usize = record[1].parse().map_err(|_| {
                    TrajvizError::format(format!(
                        "mask table row {row}: frame '{}' is not an index",
                        &record[1]
                    ))
                })?;
                let len = frame
                    .checked_add(1)
                    .filter(|&len| len <= MAX_MASK_FRAMES)
                    .ok_or_else(|| {
                        TrajvizError::format(format!(
                            "mask table row {row}: frame {frame} exceeds the limit of {MAX_MASK_FRAMES} frames"
                        ))
                    })?;
                if flags.len() < len {
                    flags.resize(len, false);
                }
                flags[frame] = flag;
            } else {
                flags.push(flag);
            }
        }
        Ok(mask)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => s.parse::<f64>().ok().map(|v| v != 0.0),
    }
}

fn try_read<T: ReadableElement>(bytes: &[u8], nonzero: impl Fn(&T) -> bool) -> Option<Vec<bool>> {
    ArrayD::<T>::read_npy(bytes)
        .ok()
        .map(|a| a.iter().map(nonzero).collect())
}

/// Reads a frame-indexed label array of any integer, float or bool dtype.
pub fn load_npy_flags(path: &Path) -> TrajvizResult<Vec<bool>> {
    let bytes = fs::read(path).with_context(|| format!("read '{}'", path.display()))?;
    try_read::<i64>(&bytes, |v| *v != 0)
        .or_else(|| try_read::<i32>(&bytes, |v| *v != 0))
        .or_else(|| try_read::<i16>(&bytes, |v| *v != 0))
        .or_else(|| try_read::<i8>(&bytes, |v| *v != 0))
        .or_else(|| try_read::<u8>(&bytes, |v| *v != 0))
        .or_else(|| try_read::<u64>(&bytes, |v| *v != 0))
        .or_else(|| try_read::<bool>(&bytes, |v| *v))
        .or_else(|| try_read::<f64>(&bytes, |v| *v != 0.0))
        .or_else(|| try_read::<f32>(&bytes, |v| *v != 0.0))
        .ok_or_else(|| {
            TrajvizError::format(format!(
                "'{}' is not a supported .npy label array",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneId {
        SceneId::new("01", "0025")
    }

    #[test]
    fn table_rows_become_frame_flags() {
        let mask = AnomalyMask::from_table_reader("01_0025,1\n".as_bytes()).unwrap();
        assert!(mask.is_anomalous(&scene(), FrameId(0)));
        assert!(!mask.is_anomalous(&scene(), FrameId(1)));
        assert!(!mask.is_anomalous(&SceneId::new("02", "0025"), FrameId(0)));
    }

    #[test]
    fn table_header_and_explicit_frames() {
        let csv = "scene,frame,label\n01_0025,3,1\n01_0025,1,0\n";
        let mask = AnomalyMask::from_table_reader(csv.as_bytes()).unwrap();
        assert!(mask.is_anomalous(&scene(), FrameId(3)));
        assert!(!mask.is_anomalous(&scene(), FrameId(2)));
        assert!(!mask.is_anomalous(&scene(), FrameId(4)));
    }

    #[test]
    fn table_rejects_bad_flags_after_header() {
        let csv = "01_0025,1\n01_0025,maybe\n";
        assert!(AnomalyMask::from_table_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn table_rejects_huge_frame_indices() {
        for frame in [u64::MAX.to_string(), "10000000000".to_string(), MAX_MASK_FRAMES.to_string()] {
            let csv = format!("01_0025,{frame},1\n");
            let err = AnomalyMask::from_table_reader(csv.as_bytes()).unwrap_err();
            assert!(matches!(err, TrajvizError::Format(_)), "{frame}: {err}");
        }

        let last = format!("01_0025,{},1\n", MAX_MASK_FRAMES - 1);
        let mask = AnomalyMask::from_table_reader(last.as_bytes()).unwrap();
        assert!(mask.is_anomalous(&scene(), FrameId(MAX_MASK_FRAMES as u64 - 1)));
    }

    #[test]
    fn huge_frame_index_degrades_to_empty() {
        let dir = PathBuf::from("target").join("mask_huge_frame");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("masks.csv");
        fs::write(&path, "01_0025,0,1\n01_0025,18446744073709551615,1\n").unwrap();
        assert!(AnomalyMask::load_or_empty(&path).is_empty());
    }

    #[test]
    fn out_of_range_frames_are_not_anomalous() {
        let mut mask = AnomalyMask::empty();
        mask.insert("01_0025", vec![false, true]);
        assert!(mask.is_anomalous(&scene(), FrameId(1)));
        assert!(!mask.is_anomalous(&scene(), FrameId(2)));
        assert!(!mask.is_anomalous(&scene(), FrameId(u64::MAX)));
    }

    #[test]
    fn missing_source_degrades_to_empty() {
        let mask = AnomalyMask::load_or_empty(Path::new("target/definitely/not/here"));
        assert!(mask.is_empty());
    }
}

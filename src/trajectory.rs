use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    core::{COCO_JOINTS, EXTENDED_JOINTS, FrameId, PersonId, Skeleton, TrajectoryRecord},
    error::{TrajvizError, TrajvizResult},
};

/// One person's rows, ascending by frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub person: PersonId,
    pub records: Vec<TrajectoryRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackFilter {
    /// Keep only this person.
    pub person: Option<PersonId>,
    /// Cap on track files read from a directory, in file-name order.
    pub max_tracks: usize,
}

impl Default for TrackFilter {
    fn default() -> Self {
        Self {
            person: None,
            max_tracks: 200,
        }
    }
}

/// On-disk layout of a trajectory directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryFormat {
    /// Headerless rows `frame,x0,y0,...`.
    #[default]
    Plain,
    /// A header row, then `frame,x0,y0,...,tag` where `tag` names a per-row crop image.
    Tagged,
}

/// A directory of per-person trajectory files.
pub trait TrajectorySource {
    fn dir(&self) -> &Path;

    /// Parses one person's file contents.
    fn parse_track(&self, person: PersonId, reader: &mut dyn Read) -> TrajvizResult<Track>;

    /// Loads every track admitted by `filter`, ascending by person id.
    fn load_tracks(&self, filter: &TrackFilter) -> TrajvizResult<Vec<Track>> {
        let mut tracks = Vec::new();
        for (person, path) in list_track_files(self.dir(), filter)? {
            let mut f = fs::File::open(&path)
                .with_context(|| format!("open trajectory '{}'", path.display()))?;
            let track = self.parse_track(person, &mut f).map_err(|e| {
                TrajvizError::Other(anyhow::anyhow!("{}: {e}", path.display()))
            })?;
            tracing::debug!(person = person.0, rows = track.records.len(), "loaded track");
            tracks.push(track);
        }
        tracks.sort_by_key(|t| t.person);
        Ok(tracks)
    }
}

pub fn open_source(format: TrajectoryFormat, dir: impl Into<PathBuf>) -> Box<dyn TrajectorySource> {
    match format {
        TrajectoryFormat::Plain => Box::new(PlainCsvSource::new(dir)),
        TrajectoryFormat::Tagged => Box::new(TaggedCsvSource::new(dir)),
    }
}

#[derive(Clone, Debug)]
pub struct PlainCsvSource {
    dir: PathBuf,
}

impl PlainCsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TrajectorySource for PlainCsvSource {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn parse_track(&self, person: PersonId, reader: &mut dyn Read) -> TrajvizResult<Track> {
        parse_rows(person, reader, false)
    }
}

#[derive(Clone, Debug)]
pub struct TaggedCsvSource {
    dir: PathBuf,
}

impl TaggedCsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TrajectorySource for TaggedCsvSource {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn parse_track(&self, person: PersonId, reader: &mut dyn Read) -> TrajvizResult<Track> {
        parse_rows(person, reader, true)
    }
}

fn parse_rows(person: PersonId, reader: &mut dyn Read, tagged: bool) -> TrajvizResult<Track> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(tagged)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.context("read trajectory row")?;
        let numeric = if tagged {
            record.len().saturating_sub(1)
        } else {
            record.len()
        };
        let joints = numeric.saturating_sub(1) / 2;
        if numeric % 2 == 0 || (joints != COCO_JOINTS && joints != EXTENDED_JOINTS) {
            return Err(TrajvizError::format(format!(
                "row {row}: expected {} or {} numeric columns, got {numeric}",
                1 + 2 * COCO_JOINTS,
                1 + 2 * EXTENDED_JOINTS
            )));
        }

        let values = record
            .iter()
            .take(numeric)
            .map(|v| {
                v.parse::<f64>().map_err(|_| {
                    TrajvizError::format(format!("row {row}: '{v}' is not a number"))
                })
            })
            .collect::<TrajvizResult<Vec<f64>>>()?;

        // Frame ids may be written as floats ("12.0").
        let frame = values[0].trunc();
        if !frame.is_finite() || frame < 0.0 {
            tracing::debug!(person = person.0, row, frame, "skipping row with negative frame");
            continue;
        }
        records.push(TrajectoryRecord {
            frame: FrameId(frame as u64),
            person,
            skeleton: Skeleton::from_flat(&values[1..])?,
        });
    }

    records.sort_by_key(|r| r.frame);
    Ok(Track { person, records })
}

/// Track files in file-name order, first `max_tracks` only, with numeric,
/// non-negative stems that pass the person filter.
pub fn list_track_files(dir: &Path, filter: &TrackFilter) -> TrajvizResult<Vec<(PersonId, PathBuf)>> {
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read trajectory directory '{}'", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    names.sort();
    names.truncate(filter.max_tracks);

    let mut out = Vec::new();
    for path in names {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Ok(id) = stem.parse::<i64>() else {
            tracing::debug!(file = %path.display(), "ignoring non-numeric trajectory file");
            continue;
        };
        let Ok(id) = u32::try_from(id) else {
            continue;
        };
        let person = PersonId(id);
        if filter.person.is_some_and(|p| p != person) {
            continue;
        }
        out.push((person, path));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(frame: &str, fill: f64) -> String {
        let mut cols = vec![frame.to_string()];
        for j in 0..COCO_JOINTS {
            cols.push(format!("{}", fill + j as f64));
            cols.push(format!("{}", fill + 2.0 * j as f64));
        }
        cols.join(",")
    }

    #[test]
    fn plain_rows_parse_sorted_by_frame() {
        let data = format!("{}\n{}\n", row("5", 10.0), row("2.0", 20.0));
        let track = PlainCsvSource::new(".")
            .parse_track(PersonId(3), &mut data.as_bytes())
            .unwrap();
        assert_eq!(track.person, PersonId(3));
        let frames: Vec<u64> = track.records.iter().map(|r| r.frame.0).collect();
        assert_eq!(frames, vec![2, 5]);
        assert_eq!(track.records[0].skeleton.joints().len(), COCO_JOINTS);
        assert_eq!(track.records[0].skeleton.joint(1).unwrap().x(), 21.0);
    }

    #[test]
    fn tagged_rows_drop_header_and_tag() {
        let header = (0..36).map(|i| format!("c{i}")).collect::<Vec<_>>().join(",");
        let data = format!("{header}\n{},crop_0007\n", row("7", 1.0));
        let track = TaggedCsvSource::new(".")
            .parse_track(PersonId(1), &mut data.as_bytes())
            .unwrap();
        assert_eq!(track.records.len(), 1);
        assert_eq!(track.records[0].frame, FrameId(7));
    }

    #[test]
    fn wrong_column_count_is_a_format_error() {
        let data = "0,1,2,3\n";
        let err = PlainCsvSource::new(".")
            .parse_track(PersonId(0), &mut data.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("format error"));
    }

    #[test]
    fn negative_frames_are_skipped() {
        let data = format!("{}\n{}\n", row("-1", 10.0), row("0", 10.0));
        let track = PlainCsvSource::new(".")
            .parse_track(PersonId(0), &mut data.as_bytes())
            .unwrap();
        assert_eq!(track.records.len(), 1);
    }

    #[test]
    fn eighteen_joint_rows_are_accepted() {
        let mut cols = vec!["0".to_string()];
        cols.extend((0..36).map(|i| format!("{}", i + 1)));
        let data = cols.join(",");
        let track = PlainCsvSource::new(".")
            .parse_track(PersonId(0), &mut data.as_bytes())
            .unwrap();
        assert_eq!(track.records[0].skeleton.joints().len(), EXTENDED_JOINTS);
    }
}

//! Stateful frame compositing.
//!
//! For each source the compositor keeps one [`AggregateCell`] per frame and
//! one [`IndividualCell`] per (frame, person). Cells are created on first use
//! and live until the output writer takes them. Later draws overwrite earlier
//! ones; there is no blending.

use std::collections::{BTreeMap, btree_map::Entry};

use ab_glyph::{Font as _, FontRef, PxScale, ScaleFont as _};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use crate::{
    core::{FrameId, PersonId, SceneId, Source, TrajectoryRecord},
    draw::{LineStyle, Palette, draw_bounding_box, draw_skeleton},
    error::{TrajvizError, TrajvizResult},
    frames::{FrameSource, upscale},
    mask::AnomalyMask,
    normalize::normalize_local,
    topology::{ANOMALY_COLOR, TRACK_ID_COLOR, track_color},
};

pub const ANOMALY_LABEL: &str = "Anomaly";
/// Track-id baseline above the anchor joint, in source pixels.
pub const ID_OFFSET: i32 = 10;
/// Anomaly-label baseline above the anchor joint, in source pixels.
pub const ANOMALY_OFFSET: i32 = 40;
/// Label font size at scale 1, in pixels.
pub const LABEL_PX: f32 = 16.0;

const LABEL_FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// The embedded label face; output does not depend on installed fonts.
pub fn label_font() -> TrajvizResult<FontRef<'static>> {
    FontRef::try_from_slice(LABEL_FONT_DATA)
        .map_err(|e| TrajvizError::data(format!("embedded label font: {e}")))
}

/// Ascent of `font` at `scale`: distance from the top of the text to its baseline.
pub fn label_ascent(font: &FontRef<'_>, scale: PxScale) -> i32 {
    font.as_scaled(scale).ascent().ceil() as i32
}

/// Draws `text` with its baseline at `baseline` and its left edge at `left`.
pub fn draw_label(
    canvas: &mut RgbImage,
    font: &FontRef<'_>,
    text: &str,
    left: i32,
    baseline: i32,
    scale: PxScale,
    color: Rgb<u8>,
) {
    let top = baseline - label_ascent(font, scale);
    draw_text_mut(canvas, color, left, top, scale, font, text);
}

/// Frame-level canvases shared by every person of one source.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCell {
    pub photo: RgbImage,
    pub blank: RgbImage,
}

/// One person's canvases for one frame.
///
/// `blank` holds the person's skeleton fitted to a local canvas, so its size
/// differs from `photo`.
#[derive(Clone, Debug, PartialEq)]
pub struct IndividualCell {
    pub photo: RgbImage,
    pub blank: RgbImage,
}

impl AggregateCell {
    pub fn seeded(photo: RgbImage) -> Self {
        let blank = white_like(&photo);
        Self { photo, blank }
    }
}

impl IndividualCell {
    pub fn seeded(photo: RgbImage) -> Self {
        let blank = white_like(&photo);
        Self { photo, blank }
    }
}

fn white_like(img: &RgbImage) -> RgbImage {
    RgbImage::from_pixel(img.width(), img.height(), Rgb([255, 255, 255]))
}

/// What to draw for one source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceDraw {
    pub skeleton: bool,
    pub bbox: bool,
    #[serde(default)]
    pub style: LineStyle,
}

impl Default for SourceDraw {
    fn default() -> Self {
        Self {
            skeleton: true,
            bbox: false,
            style: LineStyle::Solid,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompositorOpts {
    pub scene: SceneId,
    /// Integer upscale of photographic buffers; coordinates are multiplied to match.
    pub scale: u32,
    pub prediction: SourceDraw,
    pub ground_truth: SourceDraw,
}

impl CompositorOpts {
    pub fn draw_for(&self, source: Source) -> SourceDraw {
        match source {
            Source::Prediction => self.prediction,
            Source::GroundTruth => self.ground_truth,
        }
    }
}

/// Result of [`Compositor::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Drawn { anomalous: bool },
    /// Frame id at or past the end of the frame source.
    OutOfRange,
    /// Every joint is missing.
    Empty,
}

fn cached_seed(
    frames: &dyn FrameSource,
    scale: u32,
    cache: &mut Option<(FrameId, RgbImage)>,
    frame: FrameId,
) -> TrajvizResult<RgbImage> {
    if let Some((f, img)) = cache
        && *f == frame
    {
        return Ok(img.clone());
    }
    let img = upscale(frames.decode(frame)?, scale);
    *cache = Some((frame, img.clone()));
    Ok(img)
}

#[derive(Default)]
struct Layer {
    aggregate: BTreeMap<FrameId, AggregateCell>,
    individual: BTreeMap<(FrameId, PersonId), IndividualCell>,
}

pub struct Compositor<'a> {
    frames: &'a dyn FrameSource,
    mask: &'a AnomalyMask,
    opts: CompositorOpts,
    prediction: Layer,
    ground_truth: Layer,
    // Events arrive grouped by frame; keep the last decode around.
    last_seed: Option<(FrameId, RgbImage)>,
    font: FontRef<'static>,
}

impl<'a> Compositor<'a> {
    pub fn new(
        frames: &'a dyn FrameSource,
        mask: &'a AnomalyMask,
        opts: CompositorOpts,
    ) -> TrajvizResult<Self> {
        Ok(Self {
            frames,
            mask,
            opts,
            prediction: Layer::default(),
            ground_truth: Layer::default(),
            last_seed: None,
            font: label_font()?,
        })
    }

    pub fn opts(&self) -> &CompositorOpts {
        &self.opts
    }

    pub fn frames(&self) -> &'a dyn FrameSource {
        self.frames
    }

    fn layer_mut(&mut self, source: Source) -> &mut Layer {
        match source {
            Source::Prediction => &mut self.prediction,
            Source::GroundTruth => &mut self.ground_truth,
        }
    }

    fn layer(&self, source: Source) -> &Layer {
        match source {
            Source::Prediction => &self.prediction,
            Source::GroundTruth => &self.ground_truth,
        }
    }

    /// Decoded, upscaled photograph for `frame`.
    pub fn seed_photo(&mut self, frame: FrameId) -> TrajvizResult<RgbImage> {
        cached_seed(self.frames, self.opts.scale, &mut self.last_seed, frame)
    }

    pub fn open_aggregate_frames(&self, source: Source) -> usize {
        self.layer(source).aggregate.len()
    }

    pub fn open_individual_cells(&self, source: Source) -> usize {
        self.layer(source).individual.len()
    }

    pub fn aggregate(&self, source: Source, frame: FrameId) -> Option<&AggregateCell> {
        self.layer(source).aggregate.get(&frame)
    }

    pub fn individual(
        &self,
        source: Source,
        frame: FrameId,
        person: PersonId,
    ) -> Option<&IndividualCell> {
        self.layer(source).individual.get(&(frame, person))
    }

    /// Removes and returns every cell of `frame` for `source`.
    pub fn take_frame(
        &mut self,
        source: Source,
        frame: FrameId,
    ) -> (Option<AggregateCell>, Vec<(PersonId, IndividualCell)>) {
        let layer = self.layer_mut(source);
        let aggregate = layer.aggregate.remove(&frame);
        let persons: Vec<PersonId> = layer
            .individual
            .range((frame, PersonId(0))..=(frame, PersonId(u32::MAX)))
            .map(|((_, p), _)| *p)
            .collect();
        let individuals = persons
            .into_iter()
            .filter_map(|p| layer.individual.remove(&(frame, p)).map(|c| (p, c)))
            .collect();
        (aggregate, individuals)
    }

    /// Draws one trajectory row into the buffers of `source`.
    pub fn apply(&mut self, record: &TrajectoryRecord, source: Source) -> TrajvizResult<Applied> {
        let frame = record.frame;
        if frame.0 >= self.frames.frame_count() {
            return Ok(Applied::OutOfRange);
        }
        let skeleton = &record.skeleton;
        let Some(anchor) = skeleton.anchor() else {
            return Ok(Applied::Empty);
        };

        let draw = self.opts.draw_for(source);
        let scale = self.opts.scale.max(1);
        let s = f64::from(scale);
        let local = if draw.skeleton {
            Some(normalize_local(skeleton)?)
        } else {
            None
        };

        let anomalous = self.mask.is_anomalous(&self.opts.scene, frame);
        let Self {
            frames,
            opts,
            prediction,
            ground_truth,
            last_seed,
            font,
            ..
        } = self;
        let layer = match source {
            Source::Prediction => prediction,
            Source::GroundTruth => ground_truth,
        };
        let agg = match layer.aggregate.entry(frame) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(AggregateCell::seeded(cached_seed(
                *frames, opts.scale, last_seed, frame,
            )?)),
        };
        let ind = match layer.individual.entry((frame, record.person)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(IndividualCell::seeded(cached_seed(
                *frames, opts.scale, last_seed, frame,
            )?)),
        };

        if let Some(local) = local {
            let palette = Palette::Topology;
            draw_skeleton(&mut agg.photo, skeleton, palette, draw.style, s, false);
            draw_skeleton(&mut ind.photo, skeleton, palette, draw.style, s, false);
            draw_skeleton(&mut agg.blank, skeleton, palette, draw.style, s, false);

            let mut blank = local.canvas;
            draw_skeleton(&mut blank, &local.skeleton, palette, draw.style, 1.0, true);
            ind.blank = blank;
        }

        if draw.bbox {
            let color = track_color(record.person.0);
            draw_bounding_box(&mut agg.photo, skeleton, s, color);
            draw_bounding_box(&mut ind.photo, skeleton, s, color);
        }

        let ax = (anchor.x() * s) as i32;
        let ay = (anchor.y() * s) as i32;
        let px = PxScale::from(LABEL_PX * scale as f32);
        let id = record.person.to_string();
        let id_baseline = ay - ID_OFFSET * scale as i32;
        draw_label(&mut agg.photo, font, &id, ax, id_baseline, px, TRACK_ID_COLOR);
        draw_label(&mut ind.photo, font, &id, ax, id_baseline, px, TRACK_ID_COLOR);

        if anomalous {
            tracing::debug!(person = record.person.0, frame = frame.0, "anomalous frame");
            // Keep the whole label inside the frame: its top edge is clamped at 0.
            let ascent = label_ascent(font, px);
            let top = (ay - ANOMALY_OFFSET * scale as i32 - ascent).max(0);
            let baseline = top + ascent;
            draw_label(&mut agg.photo, font, ANOMALY_LABEL, ax, baseline, px, ANOMALY_COLOR);
            draw_label(&mut agg.blank, font, ANOMALY_LABEL, ax, baseline, px, ANOMALY_COLOR);
        }

        Ok(Applied::Drawn { anomalous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::Skeleton, frames::MemoryFrameSource};

    fn frames(n: usize) -> MemoryFrameSource {
        let mut src = MemoryFrameSource::new();
        for i in 0..n {
            src.push(format!("{i:03}.jpg"), RgbImage::from_pixel(200, 150, Rgb([40, 40, 40])));
        }
        src
    }

    fn opts() -> CompositorOpts {
        CompositorOpts {
            scene: SceneId::new("01", "0025"),
            scale: 1,
            prediction: SourceDraw::default(),
            ground_truth: SourceDraw::default(),
        }
    }

    fn record(frame: u64, person: u32, dx: f64) -> TrajectoryRecord {
        let mut flat = vec![0.0; 34];
        let pts = [(0, 50.0, 40.0), (1, 45.0, 35.0), (5, 40.0, 60.0), (6, 60.0, 60.0)];
        for (j, x, y) in pts {
            flat[2 * j] = x + dx;
            flat[2 * j + 1] = y;
        }
        TrajectoryRecord {
            frame: FrameId(frame),
            person: PersonId(person),
            skeleton: Skeleton::from_flat(&flat).unwrap(),
        }
    }

    #[test]
    fn cells_are_created_once_and_shared() {
        let src = frames(3);
        let mask = AnomalyMask::empty();
        let mut c = Compositor::new(&src, &mask, opts()).unwrap();

        c.apply(&record(1, 1, 0.0), Source::Prediction).unwrap();
        let after_first = c.aggregate(Source::Prediction, FrameId(1)).unwrap().clone();
        c.apply(&record(1, 2, 80.0), Source::Prediction).unwrap();
        let after_second = c.aggregate(Source::Prediction, FrameId(1)).unwrap();

        assert_eq!(c.open_aggregate_frames(Source::Prediction), 1);
        assert_eq!(c.open_individual_cells(Source::Prediction), 2);
        assert_ne!(&after_first, after_second);
        // Person 1's individual view never sees person 2.
        let ind1 = c.individual(Source::Prediction, FrameId(1), PersonId(1)).unwrap();
        assert_eq!(ind1.photo.get_pixel(140, 60), &Rgb([40, 40, 40]));
        assert_ne!(after_second.photo.get_pixel(140, 60), &Rgb([40, 40, 40]));
    }

    #[test]
    fn sources_do_not_share_buffers() {
        let src = frames(2);
        let mask = AnomalyMask::empty();
        let mut c = Compositor::new(&src, &mask, opts()).unwrap();
        c.apply(&record(0, 1, 0.0), Source::Prediction).unwrap();
        assert!(c.aggregate(Source::GroundTruth, FrameId(0)).is_none());
    }

    #[test]
    fn out_of_range_and_empty_events_are_skipped() {
        let src = frames(2);
        let mask = AnomalyMask::empty();
        let mut c = Compositor::new(&src, &mask, opts()).unwrap();

        assert_eq!(
            c.apply(&record(2, 1, 0.0), Source::Prediction).unwrap(),
            Applied::OutOfRange
        );
        let empty = TrajectoryRecord {
            frame: FrameId(0),
            person: PersonId(1),
            skeleton: Skeleton::from_flat(&[0.0; 34]).unwrap(),
        };
        assert_eq!(c.apply(&empty, Source::Prediction).unwrap(), Applied::Empty);
        assert_eq!(c.open_aggregate_frames(Source::Prediction), 0);
        assert_eq!(c.open_individual_cells(Source::Prediction), 0);
    }

    #[test]
    fn anomaly_label_follows_mask() {
        let src = frames(2);
        let mut mask = AnomalyMask::empty();
        mask.insert("01_0025", vec![true]);
        let mut c = Compositor::new(&src, &mask, opts()).unwrap();

        assert_eq!(
            c.apply(&record(0, 1, 0.0), Source::Prediction).unwrap(),
            Applied::Drawn { anomalous: true }
        );
        assert_eq!(
            c.apply(&record(1, 1, 0.0), Source::Prediction).unwrap(),
            Applied::Drawn { anomalous: false }
        );

        // The skeleton starts at y=34; the clamped label sits above it.
        // Glyph edges are antialiased, so count strongly red pixels.
        let label_ink = |img: &RgbImage| {
            img.enumerate_pixels()
                .any(|(_, y, p)| y < 30 && p.0[0] > 150 && p.0[1] < 100 && p.0[2] < 100)
        };
        assert!(label_ink(&c.aggregate(Source::Prediction, FrameId(0)).unwrap().blank));
        assert!(label_ink(&c.aggregate(Source::Prediction, FrameId(0)).unwrap().photo));
        assert!(!label_ink(&c.aggregate(Source::Prediction, FrameId(1)).unwrap().blank));
    }

    #[test]
    fn labels_sit_on_their_baseline() {
        let font = label_font().unwrap();
        let px = PxScale::from(LABEL_PX);
        let mut canvas = RgbImage::new(120, 60);
        draw_label(&mut canvas, &font, "12", 10, 40, px, Rgb([255, 255, 255]));

        let ink: Vec<(u32, u32)> = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 128)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!ink.is_empty());
        let top = 40 - label_ascent(&font, px);
        // Digits have no descenders.
        assert!(ink.iter().all(|&(x, y)| x >= 10 && y < 40 && y as i32 >= top));

        let (w1, _) = imageproc::drawing::text_size(px, &font, ANOMALY_LABEL);
        let (w2, _) = imageproc::drawing::text_size(PxScale::from(LABEL_PX * 2.0), &font, ANOMALY_LABEL);
        assert!(w2 > w1 + w1 / 2);
    }

    #[test]
    fn individual_blank_is_the_local_view() {
        let src = frames(1);
        let mask = AnomalyMask::empty();
        let mut c = Compositor::new(&src, &mask, opts()).unwrap();
        c.apply(&record(0, 4, 0.0), Source::GroundTruth).unwrap();
        let ind = c.individual(Source::GroundTruth, FrameId(0), PersonId(4)).unwrap();
        assert_eq!(ind.blank.width(), 880);
        assert_eq!(ind.photo.dimensions(), (200, 150));
    }

    #[test]
    fn take_frame_drains_only_that_frame() {
        let src = frames(3);
        let mask = AnomalyMask::empty();
        let mut c = Compositor::new(&src, &mask, opts()).unwrap();
        c.apply(&record(0, 1, 0.0), Source::Prediction).unwrap();
        c.apply(&record(0, 2, 10.0), Source::Prediction).unwrap();
        c.apply(&record(1, 1, 0.0), Source::Prediction).unwrap();

        let (agg, inds) = c.take_frame(Source::Prediction, FrameId(0));
        assert!(agg.is_some());
        assert_eq!(inds.iter().map(|(p, _)| p.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(c.open_aggregate_frames(Source::Prediction), 1);
        assert_eq!(c.open_individual_cells(Source::Prediction), 1);
    }
}

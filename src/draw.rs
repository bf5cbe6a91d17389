use image::RgbImage;
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_polygon_mut,
    },
    point::Point as PixelPoint,
};

use crate::{
    core::Skeleton,
    topology::{self, Color},
};

/// Sample spacing for dotted/dashed skeleton bones.
pub const BONE_GAP: f64 = 5.0;
/// Sample spacing for dashed bounding boxes.
pub const BOX_GAP: f64 = 10.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    #[default]
    Solid,
    /// Round dabs at each sample point.
    Dotted,
    /// Strokes between every other pair of sample points.
    Dashed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Palette {
    /// Per-bone and per-joint colors from [`topology`].
    #[default]
    Topology,
    Uniform(Color),
}

impl Palette {
    fn bone(self, b: topology::Bone) -> Color {
        match self {
            Palette::Topology => topology::bone_color(b).unwrap_or(topology::ANOMALY_COLOR),
            Palette::Uniform(c) => c,
        }
    }

    fn joint(self, j: usize) -> Color {
        match self {
            Palette::Topology => topology::joint_color(j).unwrap_or(topology::ANOMALY_COLOR),
            Palette::Uniform(c) => c,
        }
    }
}

/// Stroke geometry: thin for in-context views, heavy for isolated views.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stroke {
    pub thickness: u32,
    pub joint_radius: i32,
    pub filled_joints: bool,
}

impl Stroke {
    pub const THIN: Stroke = Stroke {
        thickness: 1,
        joint_radius: 1,
        filled_joints: false,
    };

    pub const EMPHASIS: Stroke = Stroke {
        thickness: 40,
        joint_radius: 36,
        filled_joints: true,
    };

    pub fn for_emphasis(emphasis: bool) -> Self {
        if emphasis { Self::EMPHASIS } else { Self::THIN }
    }
}

fn to_pixel(x: f64, y: f64, scale: f64) -> (i32, i32) {
    ((x * scale).round() as i32, (y * scale).round() as i32)
}

/// Draws bones then joints of `skeleton`, multiplying coordinates by `scale`.
///
/// Bones with a missing endpoint and missing joints are skipped.
pub fn draw_skeleton(
    canvas: &mut RgbImage,
    skeleton: &Skeleton,
    palette: Palette,
    style: LineStyle,
    scale: f64,
    emphasis: bool,
) {
    let stroke = Stroke::for_emphasis(emphasis);

    for b in topology::bones() {
        let (Some(a), Some(z)) = (skeleton.joint(b.from), skeleton.joint(b.to)) else {
            continue;
        };
        if a.is_missing() || z.is_missing() {
            continue;
        }
        let p1 = to_pixel(a.x(), a.y(), scale);
        let p2 = to_pixel(z.x(), z.y(), scale);
        draw_styled_line(
            canvas,
            p1,
            p2,
            palette.bone(b),
            stroke.thickness,
            style,
            BONE_GAP,
        );
    }

    for (j, k) in skeleton.joints().iter().enumerate() {
        if k.is_missing() {
            continue;
        }
        let center = to_pixel(k.x(), k.y(), scale);
        let color = palette.joint(j);
        if stroke.filled_joints {
            draw_filled_circle_mut(canvas, center, stroke.joint_radius, color);
        } else {
            draw_hollow_circle_mut(canvas, center, stroke.joint_radius, color);
        }
    }
}

/// Dashed rectangle around the detected joints of `skeleton`.
pub fn draw_bounding_box(canvas: &mut RgbImage, skeleton: &Skeleton, scale: f64, color: Color) {
    let Some(r) = skeleton.bounds() else {
        return;
    };
    let (left, top) = to_pixel(r.x0, r.y0, scale);
    let (right, bottom) = to_pixel(r.x1, r.y1, scale);
    draw_polyline_closed(
        canvas,
        &[(left, top), (right, top), (right, bottom), (left, bottom)],
        color,
        1,
        LineStyle::Dashed,
        BOX_GAP,
    );
}

/// Closed polygon outline; each edge uses [`draw_styled_line`].
pub fn draw_polyline_closed(
    canvas: &mut RgbImage,
    pts: &[(i32, i32)],
    color: Color,
    thickness: u32,
    style: LineStyle,
    gap: f64,
) {
    for (i, &start) in pts.iter().enumerate() {
        let end = pts[(i + 1) % pts.len()];
        draw_styled_line(canvas, start, end, color, thickness, style, gap);
    }
}

pub fn draw_styled_line(
    canvas: &mut RgbImage,
    p1: (i32, i32),
    p2: (i32, i32),
    color: Color,
    thickness: u32,
    style: LineStyle,
    gap: f64,
) {
    let (width, height) = canvas.dimensions();
    // Ink reaches this far past a sample point.
    let reach = f64::from(thickness.max(1)) + 1.0;
    match style {
        LineStyle::Solid => draw_thick_line(canvas, p1, p2, thickness, color),
        LineStyle::Dotted => {
            for (_, p) in sample_segment_clipped(p1, p2, gap, width, height, reach) {
                draw_filled_circle_mut(canvas, p, thickness.max(1) as i32, color);
            }
        }
        LineStyle::Dashed => {
            let pts = sample_segment_clipped(p1, p2, gap, width, height, reach);
            for w in pts.windows(2) {
                let ((i, a), (_, b)) = (w[0], w[1]);
                if i % 2 == 0 {
                    draw_thick_line(canvas, a, b, thickness, color);
                }
            }
        }
    }
}

/// Points every `gap` units of arc length from `p1` towards `p2`, `p2` excluded.
pub fn sample_segment(p1: (i32, i32), p2: (i32, i32), gap: f64) -> Vec<(i32, i32)> {
    let dist = segment_length(p1, p2);
    if dist <= 0.0 || gap <= 0.0 {
        return Vec::new();
    }
    let n = (dist / gap).ceil() as usize;
    (0..n)
        .filter_map(|i| sample_at(p1, p2, dist, i as f64 * gap))
        .collect()
}

/// The samples of [`sample_segment`] that can leave ink on a `width` x
/// `height` canvas when stamped `reach` pixels wide, each paired with its
/// index along the whole segment.
///
/// Indices count from `p1` whatever part is visible, so dash phase does not
/// depend on how far the segment runs off the canvas. One sample past each
/// edge is kept so strokes crossing the border are still drawn.
pub fn sample_segment_clipped(
    p1: (i32, i32),
    p2: (i32, i32),
    gap: f64,
    width: u32,
    height: u32,
    reach: f64,
) -> Vec<(usize, (i32, i32))> {
    let dist = segment_length(p1, p2);
    if dist <= 0.0 || gap <= 0.0 {
        return Vec::new();
    }
    let Some((t0, t1)) = clip_to_rect(p1, p2, reach_bounds(width, height, reach)) else {
        return Vec::new();
    };

    let n = (dist / gap).ceil() as usize;
    let first = ((t0 * dist / gap).floor() as usize).saturating_sub(1);
    let end = ((t1 * dist / gap).ceil() as usize).saturating_add(2).min(n);
    (first..end)
        .filter_map(|i| sample_at(p1, p2, dist, i as f64 * gap).map(|p| (i, p)))
        .collect()
}

/// The part of `p1`-`p2` within `reach` of the canvas; endpoints already
/// inside are returned unchanged.
fn clip_segment(
    p1: (i32, i32),
    p2: (i32, i32),
    width: u32,
    height: u32,
    reach: f64,
) -> Option<((i32, i32), (i32, i32))> {
    let (t0, t1) = clip_to_rect(p1, p2, reach_bounds(width, height, reach))?;
    let at = |t: f64| {
        (
            (f64::from(p1.0) + t * (f64::from(p2.0) - f64::from(p1.0))).round() as i32,
            (f64::from(p1.1) + t * (f64::from(p2.1) - f64::from(p1.1))).round() as i32,
        )
    };
    let a = if t0 > 0.0 { at(t0) } else { p1 };
    let b = if t1 < 1.0 { at(t1) } else { p2 };
    Some((a, b))
}

fn reach_bounds(width: u32, height: u32, reach: f64) -> (f64, f64, f64, f64) {
    (
        -reach,
        -reach,
        f64::from(width) - 1.0 + reach,
        f64::from(height) - 1.0 + reach,
    )
}

fn segment_length(p1: (i32, i32), p2: (i32, i32)) -> f64 {
    (f64::from(p2.0) - f64::from(p1.0)).hypot(f64::from(p2.1) - f64::from(p1.1))
}

fn sample_at(p1: (i32, i32), p2: (i32, i32), dist: f64, d: f64) -> Option<(i32, i32)> {
    if d >= dist {
        return None;
    }
    let r = d / dist;
    let (x1, y1) = (f64::from(p1.0), f64::from(p1.1));
    let (x2, y2) = (f64::from(p2.0), f64::from(p2.1));
    Some((
        (x1 * (1.0 - r) + x2 * r + 0.5).floor() as i32,
        (y1 * (1.0 - r) + y2 * r + 0.5).floor() as i32,
    ))
}

/// Parameter range `[t0, t1]` of the segment inside `(x0, y0, x1, y1)`
/// (Liang-Barsky), or `None` when it misses the rectangle.
fn clip_to_rect(p1: (i32, i32), p2: (i32, i32), (x0, y0, x1, y1): (f64, f64, f64, f64)) -> Option<(f64, f64)> {
    let (ax, ay) = (f64::from(p1.0), f64::from(p1.1));
    let (dx, dy) = (f64::from(p2.0) - ax, f64::from(p2.1) - ay);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [(-dx, ax - x0), (dx, x1 - ax), (-dy, ay - y0), (dy, y1 - ay)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((t0, t1))
}

/// Straight segment of the given width with round caps; clipped to the canvas.
pub fn draw_thick_line(
    canvas: &mut RgbImage,
    p1: (i32, i32),
    p2: (i32, i32),
    thickness: u32,
    color: Color,
) {
    let (width, height) = canvas.dimensions();
    let reach = f64::from(thickness.max(1)) + 1.0;
    let Some((p1, p2)) = clip_segment(p1, p2, width, height, reach) else {
        return;
    };
    if thickness <= 1 {
        draw_line_segment_mut(
            canvas,
            (p1.0 as f32, p1.1 as f32),
            (p2.0 as f32, p2.1 as f32),
            color,
        );
        return;
    }

    let half = f64::from(thickness) / 2.0;
    let radius = half.round() as i32;
    let (dx, dy) = (f64::from(p2.0 - p1.0), f64::from(p2.1 - p1.1));
    let len = dx.hypot(dy);
    if len >= 1.0 {
        let nx = -dy / len * half;
        let ny = dx / len * half;
        let corner = |p: (i32, i32), sign: f64| {
            PixelPoint::new(
                (f64::from(p.0) + sign * nx).round() as i32,
                (f64::from(p.1) + sign * ny).round() as i32,
            )
        };
        let quad = [
            corner(p1, 1.0),
            corner(p2, 1.0),
            corner(p2, -1.0),
            corner(p1, -1.0),
        ];
        if quad[0] != quad[3] {
            draw_polygon_mut(canvas, &quad, color);
        }
    }
    draw_filled_circle_mut(canvas, p1, radius, color);
    draw_filled_circle_mut(canvas, p2, radius, color);
}

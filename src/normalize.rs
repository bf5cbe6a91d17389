use image::{Rgb, RgbImage};

use crate::{
    core::{Keypoint, Skeleton},
    error::{TrajvizError, TrajvizResult},
};

/// Source poses come from low-resolution footage; magnify before fitting.
pub const MAGNIFICATION: f64 = 8.0;
/// Width the skeleton's extent is fitted to on the local canvas.
pub const TARGET_WIDTH: f64 = 800.0;
/// Blank border around the fitted extent.
pub const MARGIN: f64 = 40.0;

/// A skeleton remapped onto its own isolated canvas.
pub struct LocalView {
    pub skeleton: Skeleton,
    pub canvas: RgbImage,
    /// Factor applied to source coordinates (magnification included).
    pub scale: f64,
}

/// Fits `skeleton` into a fixed-width local frame with a fixed margin.
///
/// Fails with [`TrajvizError::EmptySkeleton`] when no joint is detected.
pub fn normalize_local(skeleton: &Skeleton) -> TrajvizResult<LocalView> {
    let magnified = skeleton.scaled(MAGNIFICATION);
    let bounds = magnified.bounds().ok_or(TrajvizError::EmptySkeleton)?;

    let extent = if bounds.width() > 0.0 {
        bounds.width()
    } else {
        bounds.height()
    };
    // The height follows the aspect ratio uncapped, so thin poses get tall canvases.
    let fit = if extent > 0.0 {
        TARGET_WIDTH / extent
    } else {
        1.0
    };

    let joints = magnified
        .joints()
        .iter()
        .map(|&k| {
            if k.is_missing() {
                Keypoint::MISSING
            } else {
                Keypoint::new(
                    (k.x() - bounds.x0) * fit + MARGIN,
                    (k.y() - bounds.y0) * fit + MARGIN,
                )
            }
        })
        .collect();

    let width = canvas_extent(bounds.width() * fit);
    let height = canvas_extent(bounds.height() * fit);

    Ok(LocalView {
        skeleton: Skeleton::new(joints)?,
        canvas: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        scale: MAGNIFICATION * fit,
    })
}

// Absorbs float noise so equal fitted extents give equal canvases.
fn canvas_extent(fitted: f64) -> u32 {
    (fitted + 2.0 * MARGIN - 1e-6).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(points: &[(usize, f64, f64)]) -> Skeleton {
        let mut flat = vec![0.0; 34];
        for &(j, x, y) in points {
            flat[2 * j] = x;
            flat[2 * j + 1] = y;
        }
        Skeleton::from_flat(&flat).unwrap()
    }

    fn fitted_width(s: &Skeleton) -> f64 {
        s.bounds().unwrap().width()
    }

    #[test]
    fn fits_width_and_margin() {
        let s = pose(&[(0, 100.0, 50.0), (5, 110.0, 70.0), (11, 105.0, 90.0)]);
        let view = normalize_local(&s).unwrap();
        let b = view.skeleton.bounds().unwrap();
        assert!((b.x0 - MARGIN).abs() < 1e-9);
        assert!((b.y0 - MARGIN).abs() < 1e-9);
        assert!((b.width() - TARGET_WIDTH).abs() < 1e-6);
        assert_eq!(view.canvas.width(), 880);
        // 40 px tall / 10 px wide => 3200 + margins
        assert_eq!(view.canvas.height(), 3280);
    }

    #[test]
    fn thin_poses_keep_the_full_width() {
        // 2 px wide, 60 px tall: the width still fits exactly and the
        // height grows with the aspect ratio.
        let s = pose(&[(5, 50.0, 20.0), (6, 52.0, 20.0), (15, 51.0, 80.0)]);
        let view = normalize_local(&s).unwrap();
        let b = view.skeleton.bounds().unwrap();
        assert!((b.width() - TARGET_WIDTH).abs() < 1e-6);
        assert!((b.height() - 24_000.0).abs() < 1e-6);
        assert!((view.scale - MAGNIFICATION * 50.0).abs() < 1e-9);
        assert_eq!(view.canvas.dimensions(), (880, 24_080));
    }

    #[test]
    fn invariant_under_scale_and_translation() {
        let a = pose(&[(0, 10.0, 10.0), (1, 20.0, 14.0), (16, 16.0, 40.0)]);
        let b = pose(&[(0, 130.0, 230.0), (1, 160.0, 242.0), (16, 148.0, 320.0)]);
        let va = normalize_local(&a).unwrap();
        let vb = normalize_local(&b).unwrap();
        assert!((fitted_width(&va.skeleton) - TARGET_WIDTH).abs() < 1e-6);
        assert!((fitted_width(&vb.skeleton) - TARGET_WIDTH).abs() < 1e-6);
        for (ja, jb) in va.skeleton.joints().iter().zip(vb.skeleton.joints()) {
            assert!((ja.x() - jb.x()).abs() < 1e-6);
            assert!((ja.y() - jb.y()).abs() < 1e-6);
        }
        assert_eq!(va.canvas.dimensions(), vb.canvas.dimensions());
    }

    #[test]
    fn missing_joints_stay_missing() {
        let s = pose(&[(3, 10.0, 10.0), (4, 20.0, 20.0)]);
        let view = normalize_local(&s).unwrap();
        assert!(view.skeleton.joint(0).unwrap().is_missing());
        assert!(!view.skeleton.joint(3).unwrap().is_missing());
    }

    #[test]
    fn empty_skeleton_is_rejected() {
        let s = pose(&[]);
        assert!(matches!(
            normalize_local(&s),
            Err(TrajvizError::EmptySkeleton)
        ));
    }

    #[test]
    fn degenerate_extents_do_not_divide_by_zero() {
        let vertical = pose(&[(0, 10.0, 10.0), (1, 10.0, 30.0)]);
        let view = normalize_local(&vertical).unwrap();
        assert_eq!(view.canvas.height(), 880);

        let single = pose(&[(0, 10.0, 10.0)]);
        let view = normalize_local(&single).unwrap();
        assert_eq!(view.canvas.dimensions(), (80, 80));
    }
}

//! Static skeleton topology and palette.
//!
//! Bones are listed in draw order: torso first, then face, arms, legs, and the
//! two nose-to-shoulder links last so they sit on top of the torso outline.

use image::Rgb;

pub type Color = Rgb<u8>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bone {
    pub from: usize,
    pub to: usize,
}

const fn bone(from: usize, to: usize) -> Bone {
    Bone { from, to }
}

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Rgb([r, g, b])
}

const TORSO: Color = rgb(255, 0, 0);
const FACE: Color = rgb(255, 0, 255);

pub const BONES: [(Bone, Color); 18] = [
    (bone(5, 6), TORSO),
    (bone(5, 11), TORSO),
    (bone(6, 12), TORSO),
    (bone(11, 12), TORSO),
    (bone(0, 1), FACE),
    (bone(0, 2), FACE),
    (bone(1, 3), FACE),
    (bone(2, 4), FACE),
    (bone(5, 7), rgb(255, 127, 0)),
    (bone(7, 9), rgb(255, 255, 0)),
    (bone(6, 8), rgb(0, 255, 127)),
    (bone(8, 10), rgb(0, 255, 0)),
    (bone(11, 13), rgb(0, 225, 127)),
    (bone(13, 15), rgb(0, 225, 255)),
    (bone(12, 14), rgb(0, 127, 255)),
    (bone(14, 16), rgb(0, 0, 255)),
    (bone(0, 5), rgb(192, 127, 192)),
    (bone(0, 6), rgb(192, 127, 127)),
];

pub const JOINT_COLORS: [Color; 18] = [
    FACE,
    FACE,
    FACE,
    FACE,
    FACE,
    rgb(255, 64, 0),
    rgb(0, 255, 191),
    rgb(255, 191, 0),
    rgb(0, 255, 64),
    rgb(255, 255, 0),
    rgb(0, 255, 0),
    rgb(127, 255, 127),
    rgb(64, 127, 255),
    rgb(0, 225, 192),
    rgb(0, 64, 255),
    rgb(0, 255, 255),
    rgb(0, 0, 255),
    rgb(0, 0, 255),
];

pub const TRACK_ID_COLOR: Color = rgb(0, 255, 0);
pub const ANOMALY_COLOR: Color = rgb(255, 0, 0);

pub fn bones() -> impl Iterator<Item = Bone> {
    BONES.iter().map(|(b, _)| *b)
}

pub fn bone_color(b: Bone) -> Option<Color> {
    BONES.iter().find(|(x, _)| *x == b).map(|(_, c)| *c)
}

pub fn joint_color(joint: usize) -> Option<Color> {
    JOINT_COLORS.get(joint).copied()
}

/// Stable per-track color, cycling through the joint palette.
pub fn track_color(person: u32) -> Color {
    JOINT_COLORS[person as usize % JOINT_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_covers_all_coco_joints() {
        let mut seen = [false; 17];
        for b in bones() {
            seen[b.from] = true;
            seen[b.to] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn bone_lookup_matches_table() {
        assert_eq!(bone_color(bone(7, 9)), Some(rgb(255, 255, 0)));
        assert_eq!(bone_color(bone(9, 7)), None);
        assert_eq!(joint_color(17), Some(rgb(0, 0, 255)));
        assert_eq!(joint_color(18), None);
    }

    #[test]
    fn track_color_wraps() {
        assert_eq!(track_color(0), track_color(18));
        assert_eq!(track_color(5), JOINT_COLORS[5]);
    }
}

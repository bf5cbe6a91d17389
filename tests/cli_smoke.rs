use std::path::PathBuf;

use image::{Rgb, RgbImage};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_trajviz")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "trajviz.exe"
            } else {
                "trajviz"
            });
            p
        })
}

fn track_row(frame: u64) -> String {
    let mut cols = vec![frame.to_string()];
    for j in 0..17 {
        cols.push(format!("{}", 20 + j));
        cols.push(format!("{}", 10 + 2 * j));
    }
    cols.join(",")
}

#[test]
fn cli_render_writes_scene_tree() {
    let dir = PathBuf::from("target").join("cli_smoke");
    let _ = std::fs::remove_dir_all(&dir);
    let frames = dir.join("01_0007");
    let pred = dir.join("pred").join("0007");
    std::fs::create_dir_all(&frames).unwrap();
    std::fs::create_dir_all(&pred).unwrap();
    for i in 0..2 {
        RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]))
            .save(frames.join(format!("{i:03}.jpg")))
            .unwrap();
    }
    std::fs::write(pred.join("1.csv"), track_row(1)).unwrap();
    let out = dir.join("out");

    let status = std::process::Command::new(exe())
        .arg("render")
        .arg("--frames")
        .arg(&frames)
        .arg("--trajectories")
        .arg(&pred)
        .arg("--write-dir")
        .arg(&out)
        .arg("--pred-bbox")
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out.join("frames/all_pred/01/0007/1/001.jpg").exists());
    assert!(out.join("trajectories/all_gt/01/0007/000.jpg").exists());
}

#[test]
fn cli_render_rejects_missing_sources() {
    let dir = PathBuf::from("target").join("cli_smoke_invalid");
    let _ = std::fs::remove_dir_all(&dir);
    let frames = dir.join("01_0001");
    std::fs::create_dir_all(&frames).unwrap();

    let output = std::process::Command::new(exe())
        .arg("render")
        .arg("--frames")
        .arg(&frames)
        .arg("--write-dir")
        .arg(dir.join("out"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration error"), "{stderr}");
}

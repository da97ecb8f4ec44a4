use std::fs;
use std::path::Path;

use assert_cmd::Command;
use nalgebra::Point2;
use point_tracker::core::{Dataset, Frame, LifeSpan};
use point_tracker::io::GrowthReport;
use predicates::prelude::*;
use tempfile::TempDir;

const SIZE: u32 = 96;

fn scene(x: f32, y: f32) -> f32 {
    let blobs = [(30.0, 35.0, 4.0), (55.0, 50.0, 6.0), (44.0, 62.0, 3.0), (68.0, 28.0, 5.0)];
    let mut v = 40.0 + 20.0 * (0.37 * x).sin() * (0.23 * y).cos();
    for (cx, cy, s) in blobs {
        let d2 = (x - cx) * (x - cx) + (y - cy) * (y - cy);
        v += 100.0 * (-d2 / (2.0 * s * s)).exp();
    }
    v
}

/// Frame `k` shows the scene translated by `(2k, -k)` pixels.
fn write_frame(path: &Path, k: u32) {
    let img = image::GrayImage::from_fn(SIZE, SIZE, |x, y| {
        let v = scene(x as f32 - 2.0 * k as f32, y as f32 + k as f32);
        image::Luma([v.round().clamp(0.0, 255.0) as u8])
    });
    img.save(path).expect("save frame");
}

fn growing_square(dir: &Path) -> Dataset {
    let frames = vec![Frame::new("t0.png", 0.0), Frame::new("t1.png", 1.0)];
    let mut data = Dataset::new(frames).expect("dataset");
    let corners = [(0.0, 0.0), (8.0, 0.0), (8.0, 8.0), (0.0, 8.0)];
    let ids = corners
        .iter()
        .map(|&(x, y)| {
            let id = data.add_point(0, Point2::new(x, y)).expect("point");
            data.set_position(1, id, Point2::new(2.0 * x, 2.0 * y))
                .expect("pos");
            id
        })
        .collect();
    data.add_cell(ids, LifeSpan::starting_at(0)).expect("cell");
    data.write_json(dir.join("data.json")).expect("write dataset");
    data
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("project.json");
    fs::write(&path, body).expect("write config");
    path
}

fn cli() -> Command {
    Command::cargo_bin("point-tracker").expect("binary")
}

#[test]
fn check_accepts_a_valid_dataset() {
    let dir = TempDir::new().expect("tempdir");
    growing_square(dir.path());
    cli()
        .arg("check")
        .arg(dir.path().join("data.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 2 frames, 1 cells"));
}

#[test]
fn check_reports_clockwise_cells() {
    let dir = TempDir::new().expect("tempdir");
    let mut data = Dataset::new(vec![Frame::new("t0", 0.0)]).expect("dataset");
    let ids = [(0.0, 0.0), (0.0, 5.0), (5.0, 5.0), (5.0, 0.0)]
        .iter()
        .map(|&(x, y)| data.add_point(0, Point2::new(x, y)).expect("point"))
        .collect();
    data.add_cell(ids, LifeSpan::starting_at(0)).expect("cell");
    let path = dir.path().join("cw.json");
    data.write_json(&path).expect("write");

    cli()
        .arg("check")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("clockwise"))
        .stderr(predicate::str::contains("1 cell invariant violations"));
}

#[test]
fn growth_writes_a_report() {
    let dir = TempDir::new().expect("tempdir");
    growing_square(dir.path());
    let config = write_config(
        dir.path(),
        r#"{"dataset_path":"data.json","output_path":"report.json",
            "growth":{"method":{"method":"forward"},"exp_correction":true}}"#,
    );

    cli()
        .arg("growth")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 cell measurements over 1 frame pairs"));

    let report = GrowthReport::load_json(dir.path().join("report.json")).expect("report");
    assert!(report.complete);
    assert_eq!(report.result.images_used, vec!["t0.png", "t1.png"]);
    let cell = report.result.frames[0].cells.values().next().expect("cell");
    assert!((cell.kmaj - 2f64.ln()).abs() < 1e-9);
    assert!((cell.kmin - 2f64.ln()).abs() < 1e-9);
}

#[test]
fn track_follows_a_translated_scene() {
    let dir = TempDir::new().expect("tempdir");
    let images = dir.path().join("images");
    fs::create_dir(&images).expect("mkdir");
    for k in 0..3 {
        write_frame(&images.join(format!("t{k}.png")), k);
    }
    let frames = (0..3)
        .map(|k| Frame::new(format!("t{k}.png"), k as f64))
        .collect();
    let mut data = Dataset::new(frames).expect("dataset");
    let p = data.add_point(0, Point2::new(48.0, 48.0)).expect("point");
    data.write_json(dir.path().join("data.json")).expect("write");
    let config = write_config(
        dir.path(),
        r#"{"dataset_path":"data.json","image_dir":"images",
            "tracking":{"template_half_size":[8,8],"search_half_size":[20,20]}}"#,
    );

    cli()
        .arg("track")
        .arg(&config)
        .arg("--output")
        .arg(dir.path().join("tracked.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added\": 2"));

    let tracked = Dataset::load_json(dir.path().join("tracked.json")).expect("tracked");
    for k in 1..3 {
        let pos = tracked.position(k, p).expect("tracked position");
        let expected = Point2::new(48.0 + 2.0 * k as f64, 48.0 - k as f64);
        assert!((pos - expected).norm() < 1e-9, "frame {k}: {pos}");
    }
}

#[test]
fn missing_images_fail_with_the_frame_name() {
    let dir = TempDir::new().expect("tempdir");
    growing_square(dir.path());
    let config = write_config(dir.path(), r#"{"dataset_path":"data.json","image_dir":"nowhere"}"#);

    cli()
        .arg("track")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("t0.png"));
}

#[test]
fn align_without_section_fails() {
    let dir = TempDir::new().expect("tempdir");
    growing_square(dir.path());
    let config = write_config(dir.path(), r#"{"dataset_path":"data.json"}"#);

    cli()
        .arg("align")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no 'alignment' section"));
}

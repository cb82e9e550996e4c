mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use bleach_core::consensus::median;
use bleach_core::pipeline::{FailureKind, Outcome, Pass, Progress, LOG_FILE_NAME};
use bleach_core::{Detection, Session, SessionConfig, SessionError};
use image::Rgb;

use common::*;

const W: u32 = 800;
const H: u32 = 760;
const CENTER: (i32, i32) = (400, 380);

#[test]
fn mixed_batch_produces_consensus_outputs_and_log() {
    init_tracing();
    let scratch = Scratch::new("mixed");

    let radii = [300, 305, 298, 310];
    let mut inputs = Vec::new();
    for (i, r) in radii.iter().enumerate() {
        let path = scratch.path(&format!("slide_{i}.png"));
        write_field_of_view(&path, W, H, CENTER, *r);
        inputs.push(path);
    }
    let broken = scratch.path("slide_4.png");
    write_garbage(&broken);
    inputs.push(broken.clone());

    let config = SessionConfig::new(0.06, 100).unwrap();
    let session = Session::open(inputs, config).unwrap();
    assert_eq!(session.output_dir(), scratch.output_dir());

    let survey = session.survey(&no_progress);
    assert_eq!(survey.total(), 5);
    assert_eq!(survey.detected(), 4);
    assert_eq!(survey.outcomes()[4].1, Outcome::Unreadable);

    let found: Vec<_> = survey.detections().filter_map(Detection::circle).collect();
    for (circle, r) in found.iter().zip(radii) {
        assert!((circle.r - r).abs() <= 3, "detected {circle}, drawn r={r}");
        assert!((circle.x - CENTER.0).abs() <= 3, "detected {circle}");
        assert!((circle.y - CENTER.1).abs() <= 3, "detected {circle}");
    }

    let consensus = survey.consensus(config.reduce_radius()).unwrap();
    let rs: Vec<i32> = found.iter().map(|c| c.r).collect();
    assert_eq!(consensus.r, median(&rs).unwrap());
    assert!((consensus.r - 302).abs() <= 3, "consensus r = {}", consensus.r);
    assert_eq!(consensus.reduced_r, consensus.r - 100);
    assert_eq!(consensus.detected, 4);

    let report = session.run(&no_progress).unwrap();
    assert_eq!(report.consensus, consensus);
    assert_eq!(report.total, 5);
    assert_eq!(report.written.len(), 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, broken);
    assert_eq!(report.failures[0].kind, FailureKind::Load);

    let log_path = report.log_path.expect("log written");
    assert_eq!(log_path, scratch.output_dir().join(LOG_FILE_NAME));
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log, format!("{}\n", broken.display()));

    assert_eq!(
        files_in(&scratch.output_dir()),
        vec!["session.log", "slide_0.png", "slide_1.png", "slide_2.png", "slide_3.png"]
    );

    let out = image::open(scratch.output_dir().join("slide_0.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(out.dimensions(), (W, H));
    assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
    assert_eq!(*out.get_pixel(CENTER.0 as u32, CENTER.1 as u32), FIELD);
    // inside the drawn field of view but outside the reduced circle
    let outside_x = (consensus.x + consensus.reduced_r + 20) as u32;
    assert_eq!(*out.get_pixel(outside_x, consensus.y as u32), Rgb([255, 255, 255]));
}

#[test]
fn undetected_but_loadable_images_are_still_bleached() {
    init_tracing();
    let scratch = Scratch::new("undetected");

    let good = scratch.path("a.png");
    let blank = scratch.path("b.png");
    write_field_of_view(&good, 300, 300, (150, 150), 120);
    write_blank(&blank, 300, 300);

    let config = SessionConfig::new(0.06, 10).unwrap();
    let session = Session::open(vec![good, blank.clone()], config).unwrap();
    let report = session.run(&no_progress).unwrap();

    assert_eq!(report.consensus.detected, 1);
    assert_eq!(report.written.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::NoCircle);

    let log = std::fs::read_to_string(scratch.output_dir().join(LOG_FILE_NAME)).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec![blank.display().to_string()]);

    let out = image::open(scratch.output_dir().join("b.png")).unwrap().to_rgb8();
    assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
    assert_eq!(*out.get_pixel(150, 150), Rgb([120, 120, 120]));
}

#[test]
fn no_detections_aborts_without_outputs() {
    init_tracing();
    let scratch = Scratch::new("none");

    let mut inputs = Vec::new();
    for i in 0..3 {
        let path = scratch.path(&format!("blank_{i}.png"));
        write_blank(&path, 240, 240);
        inputs.push(path);
    }
    let garbage = scratch.path("broken.png");
    write_garbage(&garbage);
    inputs.push(garbage);

    let session = Session::open(inputs, SessionConfig::default()).unwrap();
    let err = session.run(&no_progress).unwrap_err();
    assert_eq!(err.downcast_ref::<SessionError>(), Some(&SessionError::NoCircles));
    assert_eq!(err.to_string(), "No circles detected in any image");

    assert!(scratch.output_dir().is_dir());
    assert!(files_in(&scratch.output_dir()).is_empty());
}

#[test]
fn all_successful_batch_writes_no_log() {
    init_tracing();
    let scratch = Scratch::new("clean");

    let inputs: Vec<_> = (0..3)
        .map(|i| {
            let path = scratch.path(&format!("f{i}.png"));
            write_field_of_view(&path, 300, 280, (150, 140), 110 + i);
            path
        })
        .collect();

    let session = Session::open(inputs, SessionConfig::new(0.05, 0).unwrap()).unwrap();
    let report = session.run(&no_progress).unwrap();
    assert!(report.failures.is_empty());
    assert!(report.log_path.is_none());
    assert!(!session.log_path().exists());
    assert_eq!(report.consensus.reduced_r, report.consensus.r);
    assert_eq!(files_in(&scratch.output_dir()), vec!["f0.png", "f1.png", "f2.png"]);
}

#[test]
fn larger_fade_ratio_widens_blend_ring() {
    init_tracing();
    let count_blended = |name: &str, fade: f64| {
        let scratch = Scratch::new(name);
        let path = scratch.path("slide.png");
        write_field_of_view(&path, 300, 300, (150, 150), 120);
        let session = Session::open(vec![path], SessionConfig::new(fade, 0).unwrap()).unwrap();
        session.run(&no_progress).unwrap();
        let out = image::open(scratch.output_dir().join("slide.png"))
            .unwrap()
            .to_rgb8();
        out.pixels()
            .filter(|p| **p != FIELD && **p != VIGNETTE && **p != Rgb([255, 255, 255]))
            .count()
    };

    let narrow = count_blended("fade-narrow", 0.03);
    let wide = count_blended("fade-wide", 0.07);
    assert!(narrow > 0);
    assert!(wide > narrow, "narrow = {narrow}, wide = {wide}");
}

#[test]
fn progress_reports_every_image_once_per_pass() {
    let scratch = Scratch::new("progress");
    let good = scratch.path("a.png");
    let broken = scratch.path("b.png");
    write_field_of_view(&good, 300, 300, (150, 150), 120);
    write_garbage(&broken);

    let detect = AtomicUsize::new(0);
    let bleach = AtomicUsize::new(0);
    let started = AtomicUsize::new(0);
    let finished = AtomicUsize::new(0);
    let on_progress = |event: Progress| match event {
        Progress::Started { .. } => {
            started.fetch_add(1, Ordering::SeqCst);
        }
        Progress::Advanced { pass: Pass::Detect } => {
            detect.fetch_add(1, Ordering::SeqCst);
        }
        Progress::Advanced { pass: Pass::Bleach } => {
            bleach.fetch_add(1, Ordering::SeqCst);
        }
        Progress::Finished { .. } => {
            finished.fetch_add(1, Ordering::SeqCst);
        }
    };

    let session = Session::open(vec![good, broken], SessionConfig::default()).unwrap();
    session.run(&on_progress).unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(detect.load(Ordering::SeqCst), 2);
    assert_eq!(bleach.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_file_name_writes_last_input_only() {
    init_tracing();
    let scratch = Scratch::new("shared-name");
    for sub in ["a", "b"] {
        std::fs::create_dir_all(scratch.path(sub)).unwrap();
    }

    let first = scratch.path("a/slide.png");
    let last = scratch.path("b/slide.png");
    let other = scratch.path("c.png");
    write_blank(&first, 300, 300);
    write_field_of_view(&last, 300, 300, (150, 150), 120);
    write_field_of_view(&other, 300, 300, (150, 150), 120);

    let config = SessionConfig::new(0.06, 10).unwrap();
    let session = Session::open(vec![first.clone(), last, other], config).unwrap();
    let output_dir = scratch.path("a").join("bleached");
    assert_eq!(session.output_dir(), output_dir);

    let report = session.run(&no_progress).unwrap();
    assert_eq!(report.skipped, vec![first]);
    assert_eq!(
        report.written,
        vec![output_dir.join("slide.png"), output_dir.join("c.png")]
    );
    assert_eq!(files_in(&output_dir), vec!["c.png", "session.log", "slide.png"]);

    let out = image::open(output_dir.join("slide.png")).unwrap().to_rgb8();
    assert_eq!(*out.get_pixel(150, 150), FIELD);
    assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
}

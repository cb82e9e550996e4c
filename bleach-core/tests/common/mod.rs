#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bleach_core::pipeline::Progress;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

pub const FIELD: Rgb<u8> = Rgb([205, 175, 140]);
pub const VIGNETTE: Rgb<u8> = Rgb([14, 12, 16]);

/// Per-test scratch directory under the system temp dir, removed on drop.
pub struct Scratch {
    pub dir: PathBuf,
}

impl Scratch {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "bleach-core-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        Self { dir }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.join("bleached")
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub fn field_of_view(w: u32, h: u32, center: (i32, i32), radius: i32) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, VIGNETTE);
    draw_filled_circle_mut(&mut img, center, radius, FIELD);
    img
}

pub fn write_field_of_view(path: &Path, w: u32, h: u32, center: (i32, i32), radius: i32) {
    field_of_view(w, h, center, radius)
        .save(path)
        .expect("write synthetic image");
}

pub fn write_blank(path: &Path, w: u32, h: u32) {
    RgbImage::from_pixel(w, h, Rgb([120, 120, 120]))
        .save(path)
        .expect("write blank image");
}

pub fn write_garbage(path: &Path) {
    std::fs::write(path, b"\x89PNG but not really").expect("write garbage");
}

pub fn no_progress(_: Progress) {}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

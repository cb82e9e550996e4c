//! pipeline — two-pass session driver
//!
//! Pass 1 decodes every input and runs the detector, pass 2 masks every
//! input that decoded to the one consensus circle. Both passes are parallel
//! maps whose per-image results are merged in input order afterwards. Output
//! files are assigned before pass 2 starts, one input per file name, so no
//! two workers ever write the same file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consensus::{self, Consensus};
use crate::detection::{Circle, Detection, Detector};
use crate::error::SessionError;
use crate::imaging;
use crate::rendering::bleach_inplace;

/// Default fade ring width as a fraction of the radius.
pub const DEFAULT_FADE_RATIO: f64 = 0.06;
/// Default radius reduction in pixels.
pub const DEFAULT_REDUCE_RADIUS: u32 = 100;
/// Output directory created next to the first input.
pub const OUTPUT_DIR_NAME: &str = "bleached";
/// Failure log written into the output directory.
pub const LOG_FILE_NAME: &str = "session.log";

// ── Configuration ────────────────────────────────────────────────────────────

/// Check that `fade_ratio` lies strictly between 0 and 0.5.
pub fn validate_fade_ratio(fade_ratio: f64) -> Result<f64, SessionError> {
    if fade_ratio > 0.0 && fade_ratio < 0.5 {
        Ok(fade_ratio)
    } else {
        Err(SessionError::InvalidFadeRatio(fade_ratio))
    }
}

/// Validated per-run settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    fade_ratio: f64,
    reduce_radius: u32,
}

impl SessionConfig {
    pub fn new(fade_ratio: f64, reduce_radius: u32) -> Result<Self, SessionError> {
        Ok(Self {
            fade_ratio: validate_fade_ratio(fade_ratio)?,
            reduce_radius,
        })
    }

    pub fn fade_ratio(&self) -> f64 {
        self.fade_ratio
    }

    pub fn reduce_radius(&self) -> u32 {
        self.reduce_radius
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fade_ratio: DEFAULT_FADE_RATIO,
            reduce_radius: DEFAULT_REDUCE_RADIUS,
        }
    }
}

// ── Progress and results ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Detect,
    Bleach,
}

/// Progress notifications emitted from the passes. `Advanced` is sent from
/// worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Started { pass: Pass, total: usize },
    Advanced { pass: Pass },
    Finished { pass: Pass },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The file could not be read or decoded.
    Load,
    /// The image decoded but no field of view was found.
    NoCircle,
    /// The bleached image could not be written.
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: PathBuf,
    pub kind: FailureKind,
}

/// Pass 1 outcome for one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Loaded(Detection),
    Unreadable,
}

/// Everything pass 1 learned, in input order.
#[derive(Debug, Clone, Default)]
pub struct Survey {
    outcomes: Vec<(PathBuf, Outcome)>,
}

impl Survey {
    pub fn outcomes(&self) -> &[(PathBuf, Outcome)] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn detections(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.outcomes.iter().filter_map(|(_, o)| match o {
            Outcome::Loaded(d) => Some(d),
            Outcome::Unreadable => None,
        })
    }

    /// Inputs with a circle.
    pub fn detected(&self) -> usize {
        self.detections()
            .filter(|d| matches!(d, Detection::Found(_)))
            .count()
    }

    /// Inputs that decoded, found circle or not. These are the pass 2 inputs.
    pub fn loaded_paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.outcomes.iter().filter_map(|(p, o)| match o {
            Outcome::Loaded(_) => Some(p.as_path()),
            Outcome::Unreadable => None,
        })
    }

    /// Load and detection failures, in input order.
    pub fn failures(&self) -> Vec<Failure> {
        self.outcomes
            .iter()
            .filter_map(|(path, outcome)| {
                let kind = match outcome {
                    Outcome::Unreadable => FailureKind::Load,
                    Outcome::Loaded(Detection::NotFound) => FailureKind::NoCircle,
                    Outcome::Loaded(Detection::Found(_)) => return None,
                };
                Some(Failure {
                    path: path.clone(),
                    kind,
                })
            })
            .collect()
    }

    /// Batch consensus over every detected circle.
    pub fn consensus(&self, reduce_radius: u32) -> Result<Consensus, SessionError> {
        consensus::aggregate(self.detections(), reduce_radius)
    }
}

/// Pass 2 result.
#[derive(Debug, Clone, Default)]
pub struct BleachReport {
    pub written: Vec<PathBuf>,
    /// Inputs not written because a later input has the same file name.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

/// Where pass 2 sends one input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Write(PathBuf),
    /// A later input claims the same output file.
    Superseded,
    /// The input path has no file name to reuse.
    Unnamed,
}

enum Bleached {
    Written(PathBuf),
    Skipped(PathBuf),
    Failed(Failure),
}

/// Result of a complete session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub total: usize,
    pub consensus: Consensus,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Pass 1 failures followed by pass 2 failures.
    pub failures: Vec<Failure>,
    /// Set when a failure log was written.
    pub log_path: Option<PathBuf>,
}

// ── Session ──────────────────────────────────────────────────────────────────

/// One invocation over a batch of images.
pub struct Session {
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    config: SessionConfig,
    detector: Detector,
}

impl Session {
    /// `<absolute parent of first>/bleached`.
    pub fn output_dir_for(first: &Path) -> Result<PathBuf> {
        let absolute = std::path::absolute(first)
            .with_context(|| format!("could not resolve {}", first.display()))?;
        let parent = absolute.parent().unwrap_or(Path::new("/"));
        Ok(parent.join(OUTPUT_DIR_NAME))
    }

    /// Resolve and create the output directory. `config` is already
    /// validated, so no I/O happens for a bad configuration.
    pub fn open(inputs: Vec<PathBuf>, config: SessionConfig) -> Result<Self> {
        let first = inputs.first().ok_or(SessionError::NoInputs)?;
        let output_dir = Self::output_dir_for(first)?;
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("could not create {}", output_dir.display()))?;

        info!(
            inputs = inputs.len(),
            output_dir = %output_dir.display(),
            fade_ratio = config.fade_ratio(),
            reduce_radius = config.reduce_radius(),
            "session opened"
        );

        Ok(Self {
            inputs,
            output_dir,
            config,
            detector: Detector::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE_NAME)
    }

    /// Pass 1: decode and detect every input.
    pub fn survey(&self, progress: &(dyn Fn(Progress) + Sync)) -> Survey {
        let pass = Pass::Detect;
        let start = Instant::now();
        progress(Progress::Started {
            pass,
            total: self.inputs.len(),
        });

        let outcomes: Vec<(PathBuf, Outcome)> = self
            .inputs
            .par_iter()
            .map(|path| {
                let outcome = match imaging::load(path) {
                    Ok(image) => {
                        let detection = self.detector.detect(&image);
                        if detection == Detection::NotFound {
                            warn!(path = %path.display(), "no field of view detected");
                        }
                        Outcome::Loaded(detection)
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "skipping unreadable image: {e:#}");
                        Outcome::Unreadable
                    }
                };
                progress(Progress::Advanced { pass });
                (path.clone(), outcome)
            })
            .collect();

        progress(Progress::Finished { pass });
        let survey = Survey { outcomes };
        info!(
            total = survey.total(),
            detected = survey.detected(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "detection pass complete"
        );
        survey
    }

    /// Pass 2: mask every decodable input to the consensus circle and write
    /// it into the output directory.
    pub fn bleach(
        &self,
        survey: &Survey,
        consensus: &Consensus,
        progress: &(dyn Fn(Progress) + Sync),
    ) -> BleachReport {
        let pass = Pass::Bleach;
        let start = Instant::now();
        let paths: Vec<&Path> = survey.loaded_paths().collect();
        progress(Progress::Started {
            pass,
            total: paths.len(),
        });

        let circle = consensus.circle();
        let fade_ratio = self.config.fade_ratio;
        let targets = self.plan_outputs(&paths);
        let results: Vec<Bleached> = paths
            .par_iter()
            .zip(targets.par_iter())
            .map(|(&path, target)| {
                let result = match target {
                    Target::Write(out) => match self.bleach_one(path, out, circle, fade_ratio) {
                        Ok(()) => Bleached::Written(out.clone()),
                        Err(failure) => Bleached::Failed(failure),
                    },
                    Target::Superseded => {
                        warn!(
                            path = %path.display(),
                            "skipped; a later input with the same file name is written instead"
                        );
                        Bleached::Skipped(path.to_path_buf())
                    }
                    Target::Unnamed => {
                        warn!(path = %path.display(), "input path has no file name");
                        Bleached::Failed(Failure {
                            path: path.to_path_buf(),
                            kind: FailureKind::Write,
                        })
                    }
                };
                progress(Progress::Advanced { pass });
                result
            })
            .collect();

        progress(Progress::Finished { pass });
        let mut report = BleachReport::default();
        for result in results {
            match result {
                Bleached::Written(out) => report.written.push(out),
                Bleached::Skipped(path) => report.skipped.push(path),
                Bleached::Failed(failure) => report.failures.push(failure),
            }
        }
        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "bleach pass complete"
        );
        report
    }

    /// Assign output files in input order. Inputs sharing a file name keep
    /// only the last one, as if they had been written one after another.
    fn plan_outputs(&self, paths: &[&Path]) -> Vec<Target> {
        let outputs: Vec<Option<PathBuf>> = paths
            .iter()
            .map(|path| imaging::output_path(&self.output_dir, path).ok())
            .collect();
        let mut last: HashMap<&Path, usize> = HashMap::new();
        for (i, out) in outputs.iter().enumerate() {
            if let Some(out) = out {
                last.insert(out.as_path(), i);
            }
        }
        outputs
            .iter()
            .enumerate()
            .map(|(i, out)| match out {
                Some(out) if last.get(out.as_path()) == Some(&i) => Target::Write(out.clone()),
                Some(_) => Target::Superseded,
                None => Target::Unnamed,
            })
            .collect()
    }

    fn bleach_one(
        &self,
        path: &Path,
        out: &Path,
        circle: Circle,
        fade_ratio: f64,
    ) -> std::result::Result<(), Failure> {
        let failure = |kind| Failure {
            path: path.to_path_buf(),
            kind,
        };

        let mut image = imaging::load(path).map_err(|e| {
            warn!(path = %path.display(), "image became unreadable: {e:#}");
            failure(FailureKind::Load)
        })?;
        bleach_inplace(&mut image, circle, fade_ratio);

        imaging::save(&image, out).map_err(|e| {
            warn!(path = %path.display(), "could not write bleached image: {e:#}");
            failure(FailureKind::Write)
        })?;
        debug!(input = %path.display(), output = %out.display(), "bleached");
        Ok(())
    }

    /// Write the failure log, one path per line, when there are failures.
    pub fn finish(&self, failures: &[Failure]) -> Result<Option<PathBuf>> {
        if failures.is_empty() {
            return Ok(None);
        }
        let log_path = self.log_path();
        let contents: String = failures
            .iter()
            .map(|f| format!("{}\n", f.path.display()))
            .collect();
        fs::write(&log_path, contents)
            .with_context(|| format!("could not write {}", log_path.display()))?;
        info!(failures = failures.len(), log = %log_path.display(), "failure log written");
        Ok(Some(log_path))
    }

    /// Run both passes and write the log. Fails with
    /// [`SessionError::NoCircles`] before writing anything when no input had
    /// a detectable field of view.
    pub fn run(&self, progress: &(dyn Fn(Progress) + Sync)) -> Result<SessionReport> {
        let survey = self.survey(progress);
        let consensus = survey.consensus(self.config.reduce_radius)?;
        let pass2 = self.bleach(&survey, &consensus, progress);

        let mut failures = survey.failures();
        failures.extend(pass2.failures);
        let log_path = self.finish(&failures)?;

        Ok(SessionReport {
            total: survey.total(),
            consensus,
            written: pass2.written,
            skipped: pass2.skipped,
            failures,
            log_path,
        })
    }
}

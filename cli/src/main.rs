use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use bleach_core::{
    pipeline::{
        validate_fade_ratio, FailureKind, Pass, Progress, Session, SessionConfig,
        DEFAULT_FADE_RATIO, DEFAULT_REDUCE_RADIUS,
    },
    runtime::configure_thread_pool,
    SessionError,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fov-bleach",
    version,
    about = "Bleach microscope images outside the circular field of view.",
    long_about = None
)]
struct Cli {
    /// Input image files (globs expanded by the shell)
    #[arg(required = true, num_args = 1..)]
    images: Vec<PathBuf>,

    /// Fade width ratio relative to circle radius
    /// (typical: 0.03 sharp, 0.05-0.07 natural)
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_FADE_RATIO,
        value_parser = parse_fade,
        allow_negative_numbers = true
    )]
    fade: f64,

    /// Radius reduction in pixels applied after median radius detection
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_REDUCE_RADIUS,
        value_parser = parse_reduce_radius,
        allow_negative_numbers = true
    )]
    reduce_radius: u32,

    /// Worker threads for both passes (default: one per core)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,
}

fn parse_fade(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    validate_fade_ratio(value).map_err(|_| "Fade width ratio must be between 0 and 0.5".to_string())
}

fn parse_reduce_radius(s: &str) -> Result<u32, String> {
    let value: i64 = s.parse().map_err(|e| format!("{e}"))?;
    if value < 0 {
        return Err("Radius reduction must be >= 0".to_string());
    }
    u32::try_from(value).map_err(|_| format!("Radius reduction must be at most {}", u32::MAX))
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// How a batch ended, short of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Completed,
    NoCircles,
}

fn main() -> Result<ExitCode> {
    // Respect RUST_LOG; default to info. Diagnostics go to stderr so stdout
    // only carries the run report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let workers = configure_thread_pool(cli.jobs)?;
    tracing::debug!(workers, "worker pool ready");

    let status = run(cli, &mut std::io::stdout().lock())?;
    Ok(match status {
        Status::Completed => ExitCode::SUCCESS,
        Status::NoCircles => ExitCode::FAILURE,
    })
}

/// Run one session and write the operator report to `out`.
fn run(cli: Cli, out: &mut impl Write) -> Result<Status> {
    let config = SessionConfig::new(cli.fade, cli.reduce_radius)?;
    let session = Session::open(cli.images, config)?;

    writeln!(out, "Fade width ratio: {}", config.fade_ratio())?;
    writeln!(out, "Radius reduction: {} px", config.reduce_radius())?;
    writeln!(out, "Output directory: {}", session.output_dir().display())?;

    let bars = PassBars::new(cli.quiet);
    let on_progress = |event: Progress| bars.handle(event);

    let report = match session.run(&on_progress) {
        Ok(report) => report,
        Err(e) if e.downcast_ref::<SessionError>() == Some(&SessionError::NoCircles) => {
            writeln!(out, "ERROR: No circles detected in any image.")?;
            return Ok(Status::NoCircles);
        }
        Err(e) => return Err(e),
    };

    let consensus = &report.consensus;
    writeln!(
        out,
        "Median circle: x={}, y={}, r={} → reduced r={}",
        consensus.x, consensus.y, consensus.r, consensus.reduced_r
    )?;
    writeln!(out, "Detected in {} / {} images", consensus.detected, report.total)?;
    if !report.skipped.is_empty() {
        writeln!(
            out,
            "Skipped {} images whose file name is reused by a later input.",
            report.skipped.len()
        )?;
    }

    match &report.log_path {
        Some(log_path) => {
            let unwritten = report
                .failures
                .iter()
                .filter(|f| f.kind == FailureKind::Write)
                .count();
            let undetected = report.failures.len() - unwritten;
            if undetected > 0 {
                writeln!(out, "Circle detection failed for {undetected} images.")?;
            }
            if unwritten > 0 {
                writeln!(out, "Could not write {unwritten} bleached images.")?;
            }
            writeln!(out, "See log: {}", log_path.display())?;
        }
        None => writeln!(out, "Circle detected successfully in all images.")?,
    }

    Ok(Status::Completed)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// One progress bar per pass, driven from the worker threads.
struct PassBars {
    quiet: bool,
    current: Mutex<Option<ProgressBar>>,
}

impl PassBars {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            current: Mutex::new(None),
        }
    }

    fn handle(&self, event: Progress) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        match event {
            Progress::Started { pass, total } => {
                if !self.quiet {
                    *current = Some(pass_bar(pass, total));
                }
            }
            Progress::Advanced { .. } => {
                if let Some(pb) = current.as_ref() {
                    pb.inc(1);
                }
            }
            Progress::Finished { .. } => {
                if let Some(pb) = current.take() {
                    pb.finish_and_clear();
                }
            }
        }
    }
}

fn pass_bar(pass: Pass, total: usize) -> ProgressBar {
    let msg = match pass {
        Pass::Detect => "Detecting circles…",
        Pass::Bleach => "Bleaching…",
    };
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len} [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg);
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

use anyhow::{bail, Context, Result};

/// Size the global rayon pool used by both passes.
///
/// `None` keeps rayon's default of one worker per available core. Must be
/// called before the first parallel pass; returns the effective worker count.
pub fn configure_thread_pool(jobs: Option<usize>) -> Result<usize> {
    match jobs {
        Some(0) => bail!("worker count must be at least 1"),
        Some(n) => {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("bleach-worker-{i}"))
                .build_global()
                .context("failed to configure worker pool")?;
            tracing::info!(workers = n, "configured worker pool");
        }
        None => {
            tracing::debug!(
                workers = rayon::current_num_threads(),
                "using default worker pool"
            );
        }
    }
    Ok(rayon::current_num_threads())
}

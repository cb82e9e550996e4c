//! Consensus field-of-view bleaching for microscope image batches.
//!
//! Detect the circular field of view in every image, take the per-axis
//! median circle across the batch, shrink it, and whiten everything outside
//! it with a soft fade.

pub mod consensus;
pub mod detection;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod rendering;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_utils;

pub use consensus::Consensus;
pub use detection::{Circle, Detection, Detector};
pub use error::SessionError;
pub use pipeline::{Session, SessionConfig, SessionReport};

// Re-export the error plumbing so callers only need `bleach_core::Result`
pub use anyhow::Error;
pub use anyhow::Result;

use thiserror::Error;

/// Errors that stop a whole session, as opposed to per-image failures which
/// are recorded and skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Fade width ratio must be between 0 and 0.5 (got {0})")]
    InvalidFadeRatio(f64),
    #[error("No input images given")]
    NoInputs,
    #[error("No circles detected in any image")]
    NoCircles,
}

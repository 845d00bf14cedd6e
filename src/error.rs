//! Crate-wide error type.
//!
//! All fallible operations return [`PrepError`]. Artifact-missing variants
//! carry the path that was expected so callers can tell a forgotten
//! `prepare_data` apart from a genuinely broken installation.

use std::path::PathBuf;

/// Errors produced while preparing or loading run data.
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// A split name outside of dev/val/test was supplied.
    #[error("unsupported split '{0}' supplied")]
    UnknownSplit(String),

    /// No built-in domain with this id exists.
    #[error("unknown domain id {0}")]
    UnknownDomain(u32),

    /// The fitted scaler artifact is absent. Running `prepare_data` creates it.
    #[error("no fitted scaler found at {path}; call prepare_data first")]
    ScalerMissing { path: PathBuf },

    /// A cached run artifact is absent. Running `prepare_data` creates it.
    #[error("no cached run found at {path}; call prepare_data first")]
    CacheMissing { path: PathBuf },

    /// Two loader configurations cannot feed the same consumer.
    #[error("incompatible loader configurations: {0}")]
    Incompatible(String),

    /// Requested window exceeds the stored snapshot length, so cropping
    /// is undefined.
    #[error("window size {requested} exceeds stored snapshot length {stored}")]
    WindowTooLarge { requested: usize, stored: usize },

    /// A raw file could not be parsed, even after delimiter recovery.
    #[error("malformed run data in {path}: {reason}")]
    MalformedRun { path: PathBuf, reason: String },

    /// Feature and target arrays disagree about the run length, or an
    /// array had an unexpected shape.
    #[error("array shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A configured file or folder pattern is not a valid regex.
    #[error("invalid discovery pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read npy file: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("failed to write npy file: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PrepError>;

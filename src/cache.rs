//! Cached run artifacts.
//!
//! Raw datasets are slow to parse, so each converted run is persisted once
//! as a pair of sibling `.npy` files -- one for features, one for targets.
//! The base path names the run; a trailing `.npy` extension is stripped
//! before the `_features` / `_targets` suffixes are appended, any other
//! path is used as-is.

use ndarray::{Array1, Array2, Array3};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domains::RunLayout;
use crate::error::{PrepError, Result};
use crate::run::RunFeatures;

/// Sibling artifact paths for a run base path.
fn sibling_paths(path: &Path) -> (PathBuf, PathBuf) {
    let raw = path.to_string_lossy();
    let stem = raw.strip_suffix(".npy").unwrap_or(&raw);
    (
        PathBuf::from(format!("{stem}_features.npy")),
        PathBuf::from(format!("{stem}_targets.npy")),
    )
}

/// Persist one run's features and targets next to each other.
pub fn save(path: &Path, features: &RunFeatures, targets: &Array1<f32>) -> Result<()> {
    if features.num_steps() != targets.len() {
        return Err(PrepError::ShapeMismatch(format!(
            "run has {} feature steps but {} targets",
            features.num_steps(),
            targets.len()
        )));
    }
    let (features_path, targets_path) = sibling_paths(path);
    if let Some(parent) = features_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match features {
        RunFeatures::Sequence(a) => ndarray_npy::write_npy(&features_path, a)?,
        RunFeatures::Snapshots(a) => ndarray_npy::write_npy(&features_path, a)?,
    }
    ndarray_npy::write_npy(&targets_path, targets)?;
    debug!(path = %features_path.display(), steps = targets.len(), "cached run");
    Ok(())
}

/// Load one previously cached run.
///
/// The expected array dimensionality follows from the domain layout. A
/// missing artifact is reported as [`PrepError::CacheMissing`].
pub fn load(path: &Path, layout: RunLayout) -> Result<(RunFeatures, Array1<f32>)> {
    let (features_path, targets_path) = sibling_paths(path);
    for artifact in [&features_path, &targets_path] {
        if !artifact.exists() {
            return Err(PrepError::CacheMissing { path: artifact.clone() });
        }
    }

    let features = match layout {
        RunLayout::Sequence => {
            let a: Array2<f32> = ndarray_npy::read_npy(&features_path)?;
            RunFeatures::Sequence(a)
        }
        RunLayout::Snapshots { snapshot_len } => {
            let a: Array3<f32> = ndarray_npy::read_npy(&features_path)?;
            if a.shape()[1] != snapshot_len {
                return Err(PrepError::ShapeMismatch(format!(
                    "cached snapshots in {} are {} samples long, expected {}",
                    features_path.display(),
                    a.shape()[1],
                    snapshot_len
                )));
            }
            RunFeatures::Snapshots(a)
        }
    };
    let targets: Array1<f32> = ndarray_npy::read_npy(&targets_path)?;

    if features.num_steps() != targets.len() {
        return Err(PrepError::ShapeMismatch(format!(
            "cached run {} has {} feature steps but {} targets",
            path.display(),
            features.num_steps(),
            targets.len()
        )));
    }

    Ok((features, targets))
}

/// Whether both sibling artifacts for `path` are present.
pub fn exists(path: &Path) -> bool {
    let (features_path, targets_path) = sibling_paths(path);
    features_path.exists() && targets_path.exists()
}

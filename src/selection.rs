//! Development-run selection.
//!
//! Semi-supervised and transfer experiments train on a subset of the
//! development runs. A selection is either a fraction of the run count or an
//! explicit index list; fractions resolve to the leading index range so that
//! repeated experiments pick identical runs. Selection applies to the dev
//! split only -- val and test are always served in full.

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};

/// Which development runs to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunSelection {
    /// Keep the first `floor(fraction * num_runs)` runs.
    Fraction(f64),
    /// Keep exactly these positional indices, in the given order.
    /// Duplicates are allowed, which makes resampling possible.
    Indices(Vec<usize>),
}

impl RunSelection {
    /// Resolve this selection to positional indices into a dev split of
    /// `num_runs` runs.
    ///
    /// A fraction small enough to select zero runs is legal and resolves
    /// to an empty list.
    pub fn resolve(&self, num_runs: usize) -> Vec<usize> {
        match self {
            RunSelection::Fraction(p) => {
                let count = (p * num_runs as f64).floor() as usize;
                (0..count.min(num_runs)).collect()
            }
            RunSelection::Indices(indices) => indices.clone(),
        }
    }

    /// Positional indices NOT covered by this selection, sorted ascending.
    pub fn complement(&self, num_runs: usize) -> Vec<usize> {
        let selected = self.resolve(num_runs);
        (0..num_runs).filter(|i| !selected.contains(i)).collect()
    }
}

/// Subset aligned feature/target run lists according to `selection`.
///
/// `None` keeps everything. Index selections are applied in their given
/// order, so the result may be reordered or contain repeats. An index
/// outside the run count is an error.
pub fn select_runs<F: Clone, T: Clone>(
    features: &[F],
    targets: &[T],
    selection: Option<&RunSelection>,
) -> Result<(Vec<F>, Vec<T>)> {
    let Some(selection) = selection else {
        return Ok((features.to_vec(), targets.to_vec()));
    };

    let indices = selection.resolve(features.len());
    let mut out_features = Vec::with_capacity(indices.len());
    let mut out_targets = Vec::with_capacity(indices.len());
    for idx in indices {
        let feature = features.get(idx).ok_or_else(|| {
            PrepError::ShapeMismatch(format!(
                "run index {} out of range for {} dev runs",
                idx,
                features.len()
            ))
        })?;
        out_features.push(feature.clone());
        out_targets.push(targets[idx].clone());
    }

    Ok((out_features, out_targets))
}

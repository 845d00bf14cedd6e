//! In-memory representation of one run's features.
//!
//! A run is an ordered sequence of time steps. Depending on the domain the
//! features of one step are either a flat record (sequence layout) or a
//! fixed-length high-frequency snapshot (snapshot layout). Targets always
//! have one RUL value per time step, aligned by index.

use ndarray::{s, Array2, Array3, Axis};

use crate::domains::RunLayout;
use crate::error::{PrepError, Result};

/// Feature array of one run, shaped according to the domain layout.
#[derive(Debug, Clone, PartialEq)]
pub enum RunFeatures {
    /// `[T, channels]`
    Sequence(Array2<f32>),
    /// `[T, snapshot_len, channels]`
    Snapshots(Array3<f32>),
}

impl RunFeatures {
    /// Number of time steps.
    pub fn num_steps(&self) -> usize {
        match self {
            RunFeatures::Sequence(a) => a.nrows(),
            RunFeatures::Snapshots(a) => a.shape()[0],
        }
    }

    /// Number of feature channels.
    pub fn num_channels(&self) -> usize {
        match self {
            RunFeatures::Sequence(a) => a.ncols(),
            RunFeatures::Snapshots(a) => a.shape()[2],
        }
    }

    pub fn layout(&self) -> RunLayout {
        match self {
            RunFeatures::Sequence(_) => RunLayout::Sequence,
            RunFeatures::Snapshots(a) => RunLayout::Snapshots { snapshot_len: a.shape()[1] },
        }
    }

    /// Keep only the first `keep` time steps.
    pub fn truncated(&self, keep: usize) -> RunFeatures {
        let keep = keep.min(self.num_steps());
        match self {
            RunFeatures::Sequence(a) => RunFeatures::Sequence(a.slice(s![..keep, ..]).to_owned()),
            RunFeatures::Snapshots(a) => {
                RunFeatures::Snapshots(a.slice(s![..keep, .., ..]).to_owned())
            }
        }
    }

    /// Keep only the given feature channels, in the given order.
    pub fn with_channels(&self, channels: &[usize]) -> Result<RunFeatures> {
        let available = self.num_channels();
        if let Some(&bad) = channels.iter().find(|&&c| c >= available) {
            return Err(PrepError::ShapeMismatch(format!(
                "channel index {bad} out of range for {available} channels"
            )));
        }
        Ok(match self {
            RunFeatures::Sequence(a) => RunFeatures::Sequence(a.select(Axis(1), channels)),
            RunFeatures::Snapshots(a) => RunFeatures::Snapshots(a.select(Axis(2), channels)),
        })
    }
}

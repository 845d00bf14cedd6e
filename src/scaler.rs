//! Feature scaling fitted on development data.
//!
//! Per-channel min/max statistics are fitted once over the complete,
//! untruncated development split and persisted next to the cached runs.
//! Applying the scaler maps the full dev set onto [-1, 1] per channel;
//! censored subsets stay inside that envelope without necessarily touching
//! its edges. Fitting on the full dev set regardless of any run selection
//! or censoring keeps one scaler shared across experiment variants.

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{PrepError, Result};
use crate::run::RunFeatures;

/// Floor for the per-channel value range, so constant channels do not
/// divide by zero.
const MIN_RANGE: f64 = 1e-12;

/// Per-channel min/max statistics with a [-1, 1] output range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
    samples_seen: u64,
}

impl MinMaxScaler {
    /// Fit statistics over all runs of the development split.
    ///
    /// Channel selection must already be applied; windowing and censoring
    /// must not.
    pub fn fit(runs: &[RunFeatures]) -> Result<MinMaxScaler> {
        let Some(first) = runs.first() else {
            return Err(PrepError::ShapeMismatch(
                "cannot fit a scaler on zero runs".into(),
            ));
        };
        let channels = first.num_channels();
        let mut scaler = MinMaxScaler {
            min: vec![f64::INFINITY; channels],
            max: vec![f64::NEG_INFINITY; channels],
            samples_seen: 0,
        };
        for run in runs {
            scaler.update(run)?;
        }
        debug!(
            channels,
            samples = scaler.samples_seen,
            "fitted min-max scaler"
        );
        Ok(scaler)
    }

    /// Fold one run into the running statistics.
    fn update(&mut self, run: &RunFeatures) -> Result<()> {
        if run.num_channels() != self.min.len() {
            return Err(PrepError::ShapeMismatch(format!(
                "scaler has {} channels but run has {}",
                self.min.len(),
                run.num_channels()
            )));
        }
        match run {
            RunFeatures::Sequence(a) => {
                for ((_, c), &v) in a.indexed_iter() {
                    self.observe(c, v);
                }
                self.samples_seen += a.nrows() as u64;
            }
            RunFeatures::Snapshots(a) => {
                for ((_, _, c), &v) in a.indexed_iter() {
                    self.observe(c, v);
                }
                self.samples_seen += (a.shape()[0] * a.shape()[1]) as u64;
            }
        }
        Ok(())
    }

    fn observe(&mut self, channel: usize, value: f32) {
        let value = f64::from(value);
        if value < self.min[channel] {
            self.min[channel] = value;
        }
        if value > self.max[channel] {
            self.max[channel] = value;
        }
    }

    /// Number of feature channels the scaler was fitted on.
    pub fn num_channels(&self) -> usize {
        self.min.len()
    }

    /// Total scalar samples per channel seen during fitting.
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Scale one run's features in place.
    ///
    /// Applied before windowing, so that any zero padding introduced later
    /// stays exactly zero in the output.
    pub fn transform(&self, features: &mut RunFeatures) -> Result<()> {
        if features.num_channels() != self.min.len() {
            return Err(PrepError::ShapeMismatch(format!(
                "scaler has {} channels but run has {}",
                self.min.len(),
                features.num_channels()
            )));
        }
        match features {
            RunFeatures::Sequence(a) => {
                for (c, mut lane) in a.axis_iter_mut(Axis(1)).enumerate() {
                    self.scale_lane(c, &mut lane);
                }
            }
            RunFeatures::Snapshots(a) => {
                for (c, mut lane) in a.axis_iter_mut(Axis(2)).enumerate() {
                    self.scale_lane(c, &mut lane);
                }
            }
        }
        Ok(())
    }

    fn scale_lane<D: ndarray::Dimension>(
        &self,
        channel: usize,
        lane: &mut ndarray::ArrayViewMut<'_, f32, D>,
    ) {
        let min = self.min[channel];
        let range = (self.max[channel] - min).max(MIN_RANGE);
        lane.mapv_inplace(|v| (2.0 * (f64::from(v) - min) / range - 1.0) as f32);
    }

    /// Persist fitted statistics, atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), "saved scaler");
        Ok(())
    }

    /// Load previously persisted statistics.
    ///
    /// A missing artifact means preparation never ran for this domain and
    /// channel selection; that is reported as [`PrepError::ScalerMissing`].
    pub fn load(path: &Path) -> Result<MinMaxScaler> {
        if !path.exists() {
            return Err(PrepError::ScalerMissing { path: path.to_path_buf() });
        }
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Whether a persisted scaler exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dev_runs() -> Vec<RunFeatures> {
        vec![
            RunFeatures::Sequence(array![[0.0, -4.0], [5.0, 0.0], [10.0, 2.0]]),
            RunFeatures::Sequence(array![[2.0, -2.0], [8.0, 4.0]]),
        ]
    }

    fn values(run: &RunFeatures) -> Vec<f32> {
        match run {
            RunFeatures::Sequence(a) => a.iter().copied().collect(),
            RunFeatures::Snapshots(a) => a.iter().copied().collect(),
        }
    }

    #[test]
    fn test_fit_tracks_per_channel_extremes() {
        let scaler = MinMaxScaler::fit(&dev_runs()).unwrap();
        assert_eq!(scaler.num_channels(), 2);
        assert_eq!(scaler.samples_seen(), 5);
        assert_eq!(scaler.min, vec![0.0, -4.0]);
        assert_eq!(scaler.max, vec![10.0, 4.0]);
    }

    #[test]
    fn test_full_dev_set_maps_onto_unit_envelope() {
        let runs = dev_runs();
        let scaler = MinMaxScaler::fit(&runs).unwrap();

        let mut global_min = f32::INFINITY;
        let mut global_max = f32::NEG_INFINITY;
        for run in &runs {
            let mut run = run.clone();
            scaler.transform(&mut run).unwrap();
            for v in values(&run) {
                global_min = global_min.min(v);
                global_max = global_max.max(v);
                assert!((-1.0..=1.0).contains(&v));
            }
        }
        assert_eq!(global_min, -1.0);
        assert_eq!(global_max, 1.0);
    }

    #[test]
    fn test_constant_channel_does_not_blow_up() {
        let runs = vec![RunFeatures::Sequence(array![[3.0], [3.0], [3.0]])];
        let scaler = MinMaxScaler::fit(&runs).unwrap();
        let mut run = runs[0].clone();
        scaler.transform(&mut run).unwrap();
        assert!(values(&run).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler_1.json");

        let scaler = MinMaxScaler::fit(&dev_runs()).unwrap();
        scaler.save(&path).unwrap();
        assert!(MinMaxScaler::exists(&path));

        let restored = MinMaxScaler::load(&path).unwrap();
        assert_eq!(restored, scaler);
    }

    #[test]
    fn test_load_before_save_names_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler_9.json");
        let err = MinMaxScaler::load(&path).unwrap_err();
        match err {
            PrepError::ScalerMissing { path: missing } => assert_eq!(missing, path),
            other => panic!("expected ScalerMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let scaler = MinMaxScaler::fit(&dev_runs()).unwrap();
        let mut run = RunFeatures::Sequence(array![[1.0, 2.0, 3.0]]);
        assert!(scaler.transform(&mut run).is_err());
    }
}

//! Censoring and windowing transforms.
//!
//! Censoring truncates each run's tail to simulate a machine that has not
//! failed yet; because the discarded tail is exactly the failure-adjacent
//! part, censored runs never contain the terminal target. Windowing turns
//! each run into uniform `[samples, window, channels]` arrays so batches
//! have a fixed shape.

use ndarray::{s, Array1, Array3};
use tracing::debug;

use crate::error::{PrepError, Result};
use crate::run::RunFeatures;

/// Truncate each run to its first `floor(percent_broken * len)` time steps.
///
/// `None` and `1.0` are no-ops. Targets are truncated in lockstep so the
/// per-run length invariant holds afterwards.
pub fn truncate_broken(
    features: &mut [RunFeatures],
    targets: &mut [Array1<f32>],
    percent_broken: Option<f64>,
) {
    let Some(percent_broken) = percent_broken else {
        return;
    };
    if percent_broken >= 1.0 {
        return;
    }

    let mut removed = 0usize;
    for (run, run_targets) in features.iter_mut().zip(targets.iter_mut()) {
        let full = run.num_steps();
        let keep = (percent_broken * full as f64).floor() as usize;
        *run = run.truncated(keep);
        *run_targets = run_targets.slice(s![..keep]).to_owned();
        removed += full - keep;
    }
    debug!(percent_broken, removed, "censored run tails");
}

/// Window one run to `[samples, window, channels]`, dispatching on layout.
///
/// Sequence runs are windowed by sliding; snapshot runs are cropped to the
/// trailing `window` samples of each stored snapshot.
pub fn window_run(
    features: &RunFeatures,
    targets: &Array1<f32>,
    window: usize,
) -> Result<(Array3<f32>, Array1<f32>)> {
    if features.num_steps() != targets.len() {
        return Err(PrepError::ShapeMismatch(format!(
            "run has {} feature steps but {} targets",
            features.num_steps(),
            targets.len()
        )));
    }
    match features {
        RunFeatures::Sequence(a) => Ok(window_sequence(a.view(), targets, window)),
        RunFeatures::Snapshots(a) => {
            let stored = a.shape()[1];
            if window > stored {
                return Err(PrepError::WindowTooLarge { requested: window, stored });
            }
            let cropped = a.slice(s![.., stored - window.., ..]).to_owned();
            Ok((cropped, targets.clone()))
        }
    }
}

/// Sliding windows over a `[T, channels]` sequence.
///
/// For `T >= window` every index from `window - 1` on ends one sample, so
/// the run yields `T - window + 1` samples with targets aligned to window
/// ends. A shorter (but non-empty) run yields a single sample, left-padded
/// with zeros so the recorded data sits right-aligned at the recent end.
fn window_sequence(
    features: ndarray::ArrayView2<'_, f32>,
    targets: &Array1<f32>,
    window: usize,
) -> (Array3<f32>, Array1<f32>) {
    let steps = features.nrows();
    let channels = features.ncols();

    if steps == 0 {
        return (Array3::zeros((0, window, channels)), Array1::zeros(0));
    }

    if steps < window {
        let mut sample = Array3::zeros((1, window, channels));
        sample
            .slice_mut(s![0, window - steps.., ..])
            .assign(&features);
        let target = Array1::from_elem(1, targets[steps - 1]);
        return (sample, target);
    }

    let num_samples = steps - window + 1;
    let mut samples = Array3::zeros((num_samples, window, channels));
    for i in 0..num_samples {
        samples
            .slice_mut(s![i, .., ..])
            .assign(&features.slice(s![i..i + window, ..]));
    }
    let window_targets = targets.slice(s![window - 1..]).to_owned();

    (samples, window_targets)
}

//! RUL target derivation.
//!
//! Raw datasets encode each time step's position in the run through its file
//! numbering. The remaining useful life at step `i` is the distance to the
//! last recorded step: `max(timesteps) - timesteps[i] + 1`, so a target of 1
//! means "at failure" and targets grow toward early life.

use ndarray::Array1;

/// Derive RUL targets from the ordered per-step timestep numbers of one run.
///
/// Assumes the maximum timestep marks the failure point. Returns an empty
/// array for an empty run.
pub fn targets_from_timesteps(timesteps: &[u32]) -> Array1<f32> {
    let max = timesteps.iter().copied().max().unwrap_or(0);
    Array1::from_iter(
        timesteps
            .iter()
            .map(|&t| (max - t) as f32 + 1.0),
    )
}

/// Clip targets above `max_rul` to `max_rul`, in place.
///
/// Applied after derivation, so the terminal value of 1 is never affected.
pub fn cap_targets(targets: &mut Array1<f32>, max_rul: u32) {
    let cap = max_rul as f32;
    targets.mapv_inplace(|t| t.min(cap));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_count_down_to_one() {
        let targets = targets_from_timesteps(&[1, 2, 3, 4, 5]);
        assert_eq!(targets.to_vec(), vec![5.0, 4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_targets_handle_offset_numbering() {
        // File numbering does not have to start at 1
        let targets = targets_from_timesteps(&[10, 11, 13]);
        assert_eq!(targets.to_vec(), vec![4.0, 3.0, 1.0]);
    }

    #[test]
    fn test_empty_run() {
        let targets = targets_from_timesteps(&[]);
        assert!(targets.is_empty());
    }

    #[test]
    fn test_cap_clips_only_above() {
        let mut targets = targets_from_timesteps(&(1..=200).collect::<Vec<_>>());
        cap_targets(&mut targets, 125);
        assert_eq!(targets[0], 125.0);
        assert_eq!(targets[74], 125.0);
        assert_eq!(targets[75], 125.0);
        assert_eq!(targets[76], 124.0);
        assert_eq!(targets[199], 1.0);
    }
}

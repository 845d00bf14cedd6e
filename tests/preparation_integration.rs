//! End-to-end preparation and loading tests.
//!
//! Exercises the full pipeline against a synthetic sequence-layout domain:
//! convert raw runs into the cache, fit the dev scaler, then load splits
//! under the different censoring/selection configurations. Mirrors how a
//! training setup would drive the crate, but with a deterministic in-memory
//! raw source and a temporary data root.

use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rul_prep::{
    LoaderConfig, PrepError, RawRun, RawRunSource, RulLoader, RunFeatures, RunLayout,
    RunSelection, RunSplitDist, Split,
};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

/// Run lengths by raw run index. Domain 4's default distribution assigns
/// indices 1-8 to dev, 9-10 to val and 11-14 to test.
const LENGTHS: [usize; 14] = [50, 80, 45, 60, 70, 55, 65, 90, 40, 75, 35, 85, 95, 100];

/// Deterministic degradation recordings: a quadratic wear trend per channel
/// plus seeded noise.
struct SyntheticSource;

impl SyntheticSource {
    fn make_run(idx: usize) -> RawRun {
        let len = LENGTHS[idx - 1];
        let mut rng = StdRng::seed_from_u64(idx as u64);
        let features = Array2::from_shape_fn((len, 3), |(t, c)| {
            let wear = (t as f32 / len as f32).powi(2) * (c as f32 + 1.0);
            wear + rng.gen_range(-0.05..0.05)
        });
        let timesteps = (1..=len as u32).collect();
        RawRun { features: RunFeatures::Sequence(features), timesteps }
    }
}

impl RawRunSource for SyntheticSource {
    fn layout(&self) -> RunLayout {
        RunLayout::Sequence
    }

    fn load_split(&self, split: Split) -> rul_prep::Result<BTreeMap<usize, RawRun>> {
        let indices: Vec<usize> = match split {
            Split::Dev => (1..=8).collect(),
            Split::Val => vec![9, 10],
            Split::Test => (11..=14).collect(),
        };
        Ok(indices.into_iter().map(|i| (i, Self::make_run(i))).collect())
    }
}

fn prepared_loader(config: LoaderConfig, root: &TempDir) -> RulLoader<SyntheticSource> {
    let loader = RulLoader::new(config, SyntheticSource, root.path()).unwrap();
    loader.prepare_data().unwrap();
    loader
}

#[test]
fn prepare_creates_cache_and_scaler_artifacts() {
    let root = TempDir::new().unwrap();
    let loader = RulLoader::new(LoaderConfig::new(4), SyntheticSource, root.path()).unwrap();
    assert!(!loader.split_prepared(Split::Dev));
    loader.prepare_data().unwrap();
    assert!(loader.split_prepared(Split::Dev));

    assert!(root.path().join("dev/run_4_1_features.npy").exists());
    assert!(root.path().join("dev/run_4_8_targets.npy").exists());
    assert!(root.path().join("val/run_4_9_features.npy").exists());
    assert!(root.path().join("test/run_4_14_targets.npy").exists());
    assert!(root.path().join("dev/scaler_4.json").exists());
}

#[test]
fn prepare_is_idempotent() {
    let root = TempDir::new().unwrap();
    let loader = prepared_loader(LoaderConfig::new(4), &root);

    let cache_file = root.path().join("dev/run_4_1_features.npy");
    let before = fs::metadata(&cache_file).unwrap().modified().unwrap();
    loader.prepare_data().unwrap();
    let after = fs::metadata(&cache_file).unwrap().modified().unwrap();
    assert_eq!(before, after, "second preparation must not rewrite the cache");
}

#[test]
fn every_sample_has_the_resolved_window_length() {
    let root = TempDir::new().unwrap();
    let loader = prepared_loader(LoaderConfig::new(4), &root);
    assert_eq!(loader.default_window_size(), 30);

    for split in Split::ALL {
        let (features, targets) = loader.load_split(split).unwrap();
        assert!(!features.is_empty());
        for (run, run_targets) in features.iter().zip(&targets) {
            assert_eq!(run.shape()[1], 30, "domain 4 defaults to a 30-step window");
            assert_eq!(run.shape()[2], 3);
            assert_eq!(run.shape()[0], run_targets.len());
        }
    }
}

#[test]
fn window_override_applies_to_every_split() {
    let root = TempDir::new().unwrap();
    let config = LoaderConfig { window_size: Some(20), ..LoaderConfig::new(4) };
    let loader = prepared_loader(config, &root);

    for split in Split::ALL {
        let (features, _) = loader.load_split(split).unwrap();
        for run in &features {
            assert_eq!(run.shape()[1], 20);
        }
    }
}

#[test]
fn fraction_selection_keeps_leading_runs_untouched() {
    let root = TempDir::new().unwrap();
    let full = prepared_loader(LoaderConfig::new(4), &root);
    let selected = prepared_loader(
        LoaderConfig {
            percent_fail_runs: Some(RunSelection::Fraction(0.5)),
            ..LoaderConfig::new(4)
        },
        &root,
    );

    let (full_dev, full_dev_targets) = full.load_split(Split::Dev).unwrap();
    let (sel_dev, sel_dev_targets) = selected.load_split(Split::Dev).unwrap();

    assert_eq!(full_dev.len(), 8);
    assert_eq!(sel_dev.len(), 4);
    for i in 0..4 {
        assert_eq!(sel_dev[i], full_dev[i], "selected run {i} must be identical");
        assert_eq!(sel_dev_targets[i], full_dev_targets[i]);
    }

    // Val and test are never narrowed by run selection
    assert_eq!(selected.load_split(Split::Val).unwrap().0.len(), 2);
    assert_eq!(selected.load_split(Split::Test).unwrap().0.len(), 4);
}

#[test]
fn index_selection_reorders_runs() {
    let root = TempDir::new().unwrap();
    let full = prepared_loader(LoaderConfig::new(4), &root);
    let selected = prepared_loader(
        LoaderConfig {
            percent_fail_runs: Some(RunSelection::Indices(vec![5, 6, 7])),
            ..LoaderConfig::new(4)
        },
        &root,
    );

    let (full_dev, _) = full.load_split(Split::Dev).unwrap();
    let (sel_dev, _) = selected.load_split(Split::Dev).unwrap();

    assert_eq!(sel_dev.len(), 3);
    for (position, &full_idx) in [5usize, 6, 7].iter().enumerate() {
        assert_eq!(sel_dev[position], full_dev[full_idx]);
    }
}

#[test]
fn censoring_removes_failure_tails_from_dev() {
    let root = TempDir::new().unwrap();
    let full = prepared_loader(
        LoaderConfig { window_size: Some(5), ..LoaderConfig::new(4) },
        &root,
    );
    let censored = prepared_loader(
        LoaderConfig {
            window_size: Some(5),
            percent_broken: Some(0.5),
            ..LoaderConfig::new(4)
        },
        &root,
    );

    let (full_dev, full_targets) = full.load_split(Split::Dev).unwrap();
    let (cens_dev, cens_targets) = censored.load_split(Split::Dev).unwrap();

    let full_samples: usize = full_dev.iter().map(|r| r.shape()[0]).sum();
    let cens_samples: usize = cens_dev.iter().map(|r| r.shape()[0]).sum();
    assert!(cens_samples < full_samples);
    let ratio = cens_samples as f64 / full_samples as f64;
    assert!((ratio - 0.5).abs() < 0.06, "censored sample ratio {ratio} too far from 0.5");

    // The full dev set reaches failure, the censored one never does
    assert!(full_targets.iter().any(|t| t.iter().any(|&v| v == 1.0)));
    assert!(cens_targets.iter().all(|t| t.iter().all(|&v| v > 1.0)));

    // Censored runs are exact prefixes of their full counterparts
    for (cens_run, full_run) in cens_dev.iter().zip(&full_dev) {
        let n = cens_run.shape()[0];
        assert_eq!(cens_run.view(), full_run.slice(s![..n, .., ..]));
    }

    // Test data is served in full regardless of censoring
    let (full_test, _) = full.load_split(Split::Test).unwrap();
    let (cens_test, _) = censored.load_split(Split::Test).unwrap();
    assert_eq!(full_test, cens_test);
}

#[test]
fn val_split_censored_only_on_request() {
    let root = TempDir::new().unwrap();
    let plain = prepared_loader(
        LoaderConfig {
            window_size: Some(5),
            percent_broken: Some(0.5),
            ..LoaderConfig::new(4)
        },
        &root,
    );
    let truncating = prepared_loader(
        LoaderConfig {
            window_size: Some(5),
            percent_broken: Some(0.5),
            truncate_val: true,
            ..LoaderConfig::new(4)
        },
        &root,
    );

    let (plain_val, _) = plain.load_split(Split::Val).unwrap();
    let (trunc_val, _) = truncating.load_split(Split::Val).unwrap();

    // Val runs 9 and 10 have 40 and 75 steps
    let plain_counts: Vec<usize> = plain_val.iter().map(|r| r.shape()[0]).collect();
    let trunc_counts: Vec<usize> = trunc_val.iter().map(|r| r.shape()[0]).collect();
    assert_eq!(plain_counts, vec![36, 71]);
    assert_eq!(trunc_counts, vec![16, 33]);
}

#[test]
fn full_dev_set_is_normalized_onto_unit_envelope() {
    let root = TempDir::new().unwrap();
    let full = prepared_loader(
        LoaderConfig { window_size: Some(5), ..LoaderConfig::new(4) },
        &root,
    );

    let (full_dev, _) = full.load_split(Split::Dev).unwrap();
    let global_min = full_dev
        .iter()
        .flat_map(|r| r.iter().copied())
        .fold(f32::INFINITY, f32::min);
    let global_max = full_dev
        .iter()
        .flat_map(|r| r.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    assert!((global_min + 1.0).abs() < 1e-6);
    assert!((global_max - 1.0).abs() < 1e-6);

    // Narrowed variants stay inside the envelope without having to reach it
    for config in [
        LoaderConfig {
            window_size: Some(5),
            percent_fail_runs: Some(RunSelection::Fraction(0.5)),
            ..LoaderConfig::new(4)
        },
        LoaderConfig {
            window_size: Some(5),
            percent_broken: Some(0.2),
            ..LoaderConfig::new(4)
        },
    ] {
        let loader = prepared_loader(config, &root);
        let (dev, _) = loader.load_split(Split::Dev).unwrap();
        for run in &dev {
            for &v in run.iter() {
                assert!((-1.0..=1.0).contains(&v));
            }
        }
    }
}

#[test]
fn complement_loaders_cover_dev_exactly_once() {
    let root = TempDir::new().unwrap();
    let mut config = LoaderConfig {
        percent_fail_runs: Some(RunSelection::Fraction(0.5)),
        ..LoaderConfig::new(4)
    };
    let complement_config = config.get_complement(None, None).unwrap();

    let full = prepared_loader(LoaderConfig::new(4), &root);
    let selected = prepared_loader(config, &root);
    let complement = prepared_loader(complement_config, &root);

    let (full_dev, _) = full.load_split(Split::Dev).unwrap();
    let (sel_dev, _) = selected.load_split(Split::Dev).unwrap();
    let (comp_dev, _) = complement.load_split(Split::Dev).unwrap();

    assert_eq!(sel_dev.len() + comp_dev.len(), full_dev.len());
    for (i, run) in sel_dev.iter().enumerate() {
        assert_eq!(run, &full_dev[i]);
    }
    for (i, run) in comp_dev.iter().enumerate() {
        assert_eq!(run, &full_dev[sel_dev.len() + i]);
    }
}

#[test]
fn custom_channel_selection_requires_fresh_preparation() {
    let root = TempDir::new().unwrap();
    prepared_loader(LoaderConfig::new(4), &root);

    let config = LoaderConfig { feature_select: Some(vec![0, 2]), ..LoaderConfig::new(4) };
    let loader = RulLoader::new(config, SyntheticSource, root.path()).unwrap();

    // The default scaler does not cover this channel selection
    let err = loader.load_split(Split::Dev).unwrap_err();
    match err {
        PrepError::ScalerMissing { path } => {
            assert!(path.to_string_lossy().contains("scaler_4_0-2"));
        }
        other => panic!("expected ScalerMissing, got {other:?}"),
    }

    // Preparing again fits a scaler for the selection and unblocks loading
    loader.prepare_data().unwrap();
    let (dev, _) = loader.load_split(Split::Dev).unwrap();
    assert_eq!(dev[0].shape()[2], 2);
}

#[test]
fn unknown_split_name_is_rejected() {
    let root = TempDir::new().unwrap();
    let loader = prepared_loader(LoaderConfig::new(4), &root);
    let err = loader.load_split_named("train").unwrap_err();
    assert!(matches!(err, PrepError::UnknownSplit(name) if name == "train"));
}

/// The documented walkthrough: dev runs of 50 and 80 steps, window 30,
/// percent_broken 0.5. Run one truncates to 25 steps and must be served as
/// a single left-padded sample; run two truncates to 40 steps and windows
/// normally.
#[test]
fn censored_short_run_scenario() {
    let root = TempDir::new().unwrap();
    let config = LoaderConfig {
        window_size: Some(30),
        percent_broken: Some(0.5),
        run_split_dist: Some(RunSplitDist::new(vec![1, 2], vec![9], vec![11])),
        ..LoaderConfig::new(4)
    };
    let loader = prepared_loader(config, &root);

    let (dev, dev_targets) = loader.load_split(Split::Dev).unwrap();
    assert_eq!(dev.len(), 2);

    // Run one: 25 remaining steps < window, one sample padded on the left
    assert_eq!(dev[0].shape(), &[1, 30, 3]);
    assert!(dev[0].slice(s![0, ..5, ..]).iter().all(|&v| v == 0.0));
    assert!(dev[0].slice(s![0, 5.., ..]).iter().any(|&v| v != 0.0));
    assert_eq!(dev_targets[0].len(), 1);
    assert_eq!(dev_targets[0][0], 26.0);

    // Run two: 40 remaining steps, a window ending at every valid index
    assert_eq!(dev[1].shape(), &[11, 30, 3]);
    assert_eq!(dev_targets[1].len(), 11);
    assert_eq!(dev_targets[1][0], 51.0);
    assert_eq!(dev_targets[1][10], 41.0);
}

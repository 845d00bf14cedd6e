//! Loader configuration and the preparation/loading pipeline.
//!
//! A [`LoaderConfig`] describes one way of reading a domain: window size,
//! RUL cap, censoring and run selection. Two loaders can feed the same
//! downstream consumer only when window size and RUL cap agree;
//! [`LoaderConfig::check_compatibility`] asserts this and
//! [`LoaderConfig::get_compatible`] derives configurations that satisfy it
//! by construction, which is how source/target domain pairs for transfer
//! experiments are built.
//!
//! [`RulLoader`] executes the pipeline: raw runs are converted into cached
//! arrays once, a scaler is fitted on the full development split once, and
//! every `load_split` after that is cache reads plus in-memory transforms.

use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cache;
use crate::domains::DomainSpec;
use crate::error::{PrepError, Result};
use crate::run::RunFeatures;
use crate::scaler::MinMaxScaler;
use crate::selection::{select_runs, RunSelection};
use crate::source::RawRunSource;
use crate::split::{RunSplitDist, Split};
use crate::targets::{cap_targets, targets_from_timesteps};
use crate::transform::{truncate_broken, window_run};

/// Configuration surface of one loader instance.
///
/// Unset options fall back to the domain defaults. Constructed with
/// struct-update syntax:
///
/// ```
/// use rul_prep::loader::LoaderConfig;
///
/// let config = LoaderConfig {
///     window_size: Some(30),
///     percent_broken: Some(0.8),
///     ..LoaderConfig::new(4)
/// };
/// # assert_eq!(config.domain, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Domain id this loader reads.
    pub domain: u32,
    /// Window size; `None` resolves to the domain default.
    #[serde(default)]
    pub window_size: Option<usize>,
    /// RUL cap; `None` resolves to the domain default.
    #[serde(default)]
    pub max_rul: Option<u32>,
    /// Censoring fraction in (0, 1]; `None` and `1.0` keep full runs.
    #[serde(default)]
    pub percent_broken: Option<f64>,
    /// Development-run selection; `None` keeps all runs.
    #[serde(default)]
    pub percent_fail_runs: Option<RunSelection>,
    /// Whether censoring also applies to the val split.
    #[serde(default)]
    pub truncate_val: bool,
    /// Feature channels to keep; `None` keeps all.
    #[serde(default)]
    pub feature_select: Option<Vec<usize>>,
    /// Overrides the domain's default run-to-split assignment.
    #[serde(default)]
    pub run_split_dist: Option<RunSplitDist>,
}

impl LoaderConfig {
    /// A default configuration for `domain`.
    pub fn new(domain: u32) -> Self {
        Self {
            domain,
            window_size: None,
            max_rul: None,
            percent_broken: None,
            percent_fail_runs: None,
            truncate_val: false,
            feature_select: None,
            run_split_dist: None,
        }
    }

    /// Read a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// The window size this configuration resolves to: the explicit value,
    /// or the domain default.
    pub fn resolved_window_size(&self) -> Result<usize> {
        match self.window_size {
            Some(window) => Ok(window),
            None => Ok(DomainSpec::get(self.domain)?.default_window_size),
        }
    }

    /// The RUL cap this configuration resolves to.
    pub fn resolved_max_rul(&self) -> Result<u32> {
        match self.max_rul {
            Some(max_rul) => Ok(max_rul),
            None => Ok(DomainSpec::get(self.domain)?.default_max_rul),
        }
    }

    /// The run-to-split assignment in effect: the override, or the domain
    /// default.
    pub fn resolved_split_dist(&self) -> Result<RunSplitDist> {
        match &self.run_split_dist {
            Some(dist) => Ok(dist.clone()),
            None => Ok(DomainSpec::get(self.domain)?.run_split_dist),
        }
    }

    /// Assert that `self` and `other` can feed the same consumer.
    ///
    /// Fails when window size or RUL cap differ, naming every differing
    /// field. Domains are deliberately not compared -- pairing two domains
    /// is the point of transfer experiments, and an accidental cross-domain
    /// mix is still caught whenever the domains' default window sizes
    /// disagree. Censoring and run selection are never compared either;
    /// differently truncated views of the same data remain compatible.
    pub fn check_compatibility(&self, other: &LoaderConfig) -> Result<()> {
        let mut mismatches = Vec::new();
        let (own_window, other_window) =
            (self.resolved_window_size()?, other.resolved_window_size()?);
        if own_window != other_window {
            mismatches.push(format!("window_size ({own_window} vs {other_window})"));
        }
        let (own_cap, other_cap) = (self.resolved_max_rul()?, other.resolved_max_rul()?);
        if own_cap != other_cap {
            mismatches.push(format!("max_rul ({own_cap} vs {other_cap})"));
        }
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(PrepError::Incompatible(mismatches.join(", ")))
        }
    }

    /// Derive a configuration that is compatible with `self`.
    ///
    /// Only the supplied censoring/selection fields are overridden; the
    /// rest is inherited. Requesting a different domain unifies the window
    /// size to the smaller of the two domains' resolved sizes, and the
    /// shared value is written back to `self` as well -- a deliberate
    /// unification step, so both loaders window identically afterwards.
    pub fn get_compatible(
        &mut self,
        domain: Option<u32>,
        percent_broken: Option<f64>,
        percent_fail_runs: Option<RunSelection>,
        truncate_val: Option<bool>,
    ) -> Result<LoaderConfig> {
        let mut other = self.clone();

        let shared_window = match domain {
            Some(new_domain) if new_domain != self.domain => {
                let new_default = DomainSpec::get(new_domain)?.default_window_size;
                other.domain = new_domain;
                // Index lists are domain-specific, so an override cannot move along
                other.run_split_dist = None;
                self.resolved_window_size()?.min(new_default)
            }
            _ => self.resolved_window_size()?,
        };
        self.window_size = Some(shared_window);
        other.window_size = Some(shared_window);
        other.max_rul = Some(self.resolved_max_rul()?);

        if let Some(percent_broken) = percent_broken {
            other.percent_broken = Some(percent_broken);
        }
        if let Some(percent_fail_runs) = percent_fail_runs {
            other.percent_fail_runs = Some(percent_fail_runs);
        }
        if let Some(truncate_val) = truncate_val {
            other.truncate_val = truncate_val;
        }

        self.check_compatibility(&other)?;
        Ok(other)
    }

    /// Derive the compatible configuration that selects exactly the
    /// development runs `self` does NOT select.
    ///
    /// A fraction-based selection is resolved to its index range first; a
    /// configuration that selects everything has an empty complement.
    pub fn get_complement(
        &mut self,
        percent_broken: Option<f64>,
        truncate_val: Option<bool>,
    ) -> Result<LoaderConfig> {
        let num_dev_runs = self.resolved_split_dist()?.num_dev_runs();
        let complement = match &self.percent_fail_runs {
            Some(selection) => selection.complement(num_dev_runs),
            None => Vec::new(),
        };
        let mut other = self.get_compatible(None, percent_broken, None, truncate_val)?;
        other.percent_fail_runs = Some(RunSelection::Indices(complement));
        Ok(other)
    }
}

/// Prepares and serves the splits of one domain.
pub struct RulLoader<S: RawRunSource> {
    config: LoaderConfig,
    spec: DomainSpec,
    source: S,
    data_root: PathBuf,
}

impl<S: RawRunSource> RulLoader<S> {
    /// Create a loader for a built-in domain.
    pub fn new(config: LoaderConfig, source: S, data_root: &Path) -> Result<Self> {
        let spec = DomainSpec::get(config.domain)?;
        Self::with_spec(config, spec, source, data_root)
    }

    /// Create a loader for an explicitly described domain.
    pub fn with_spec(
        config: LoaderConfig,
        spec: DomainSpec,
        source: S,
        data_root: &Path,
    ) -> Result<Self> {
        if source.layout() != spec.layout {
            return Err(PrepError::ShapeMismatch(format!(
                "source layout {:?} does not match domain layout {:?}",
                source.layout(),
                spec.layout
            )));
        }
        Ok(Self {
            config,
            spec,
            source,
            data_root: data_root.to_path_buf(),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Window size used when the configuration does not request one.
    pub fn default_window_size(&self) -> usize {
        self.spec.default_window_size
    }

    fn window_size(&self) -> usize {
        self.config
            .window_size
            .unwrap_or(self.spec.default_window_size)
    }

    fn max_rul(&self) -> u32 {
        self.config.max_rul.unwrap_or(self.spec.default_max_rul)
    }

    fn split_dist(&self) -> &RunSplitDist {
        self.config
            .run_split_dist
            .as_ref()
            .unwrap_or(&self.spec.run_split_dist)
    }

    fn split_dir(&self, split: Split) -> PathBuf {
        self.data_root.join(split.as_str())
    }

    fn run_file_path(&self, split: Split, run_idx: usize) -> PathBuf {
        self.split_dir(split)
            .join(format!("run_{}_{}", self.spec.id, run_idx))
    }

    fn scaler_path(&self) -> PathBuf {
        let name = match &self.config.feature_select {
            None => format!("scaler_{}.json", self.spec.id),
            Some(channels) => {
                let tag: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
                format!("scaler_{}_{}.json", self.spec.id, tag.join("-"))
            }
        };
        self.split_dir(Split::Dev).join(name)
    }

    /// Convert raw runs into the cache and fit the dev scaler, once.
    ///
    /// Conversion for a split is skipped when its first default run is
    /// already cached. This is a cheap idempotency heuristic, not an
    /// integrity check: an interrupted conversion can leave a split that
    /// passes it with some runs missing, which has to be cleared manually.
    /// Concurrent callers race on the same check and must be serialized
    /// externally.
    pub fn prepare_data(&self) -> Result<()> {
        for split in Split::ALL {
            if !self.split_prepared(split) {
                warn!(
                    domain = self.spec.id,
                    split = %split,
                    "first time use, converting raw runs for split"
                );
                self.convert_split(split)?;
            }
        }
        if !MinMaxScaler::exists(&self.scaler_path()) {
            self.fit_scaler()?;
        }
        Ok(())
    }

    /// Whether the canonical first run of `split` is cached.
    pub fn split_prepared(&self, split: Split) -> bool {
        // The check always uses the domain's default distribution so that
        // loaders with overridden splits agree on what "prepared" means.
        match self.spec.run_split_dist.indices(split).first() {
            Some(&first_idx) => cache::exists(&self.run_file_path(split, first_idx)),
            None => true,
        }
    }

    fn convert_split(&self, split: Split) -> Result<()> {
        let raw_runs = self.source.load_split(split)?;
        for (run_idx, raw) in &raw_runs {
            if raw.features.num_steps() != raw.timesteps.len() {
                return Err(PrepError::ShapeMismatch(format!(
                    "run {} has {} feature steps but {} timesteps",
                    run_idx,
                    raw.features.num_steps(),
                    raw.timesteps.len()
                )));
            }
            if raw.features.layout() != self.spec.layout {
                return Err(PrepError::ShapeMismatch(format!(
                    "run {} has layout {:?}, domain expects {:?}",
                    run_idx,
                    raw.features.layout(),
                    self.spec.layout
                )));
            }
            let targets = targets_from_timesteps(&raw.timesteps);
            cache::save(&self.run_file_path(split, *run_idx), &raw.features, &targets)?;
        }
        info!(
            domain = self.spec.id,
            split = %split,
            runs = raw_runs.len(),
            "cached converted runs"
        );
        Ok(())
    }

    /// Fit the scaler on the complete development split.
    ///
    /// Run selection and censoring are load-time concerns; the scaler is
    /// always fitted on the full set so that every truncated experiment
    /// variant shares the same statistics.
    fn fit_scaler(&self) -> Result<()> {
        let (features, _) = self.load_cached_runs(Split::Dev)?;
        let scaler = MinMaxScaler::fit(&features)?;
        scaler.save(&self.scaler_path())?;
        info!(domain = self.spec.id, path = %self.scaler_path().display(), "fitted dev scaler");
        Ok(())
    }

    /// Cached runs of `split` with channel selection applied, in
    /// distribution order.
    fn load_cached_runs(&self, split: Split) -> Result<(Vec<RunFeatures>, Vec<Array1<f32>>)> {
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for &run_idx in self.split_dist().indices(split) {
            let (run_features, run_targets) =
                cache::load(&self.run_file_path(split, run_idx), self.spec.layout)?;
            let run_features = match &self.config.feature_select {
                Some(channels) => run_features.with_channels(channels)?,
                None => run_features,
            };
            features.push(run_features);
            targets.push(run_targets);
        }
        Ok((features, targets))
    }

    /// Load one split end to end: cache reads, run selection, censoring,
    /// RUL capping, scaling, windowing.
    ///
    /// Scaling runs before windowing so that left-padding introduced for
    /// short runs stays exactly zero. Returns one
    /// `[samples, window, channels]` array and one aligned target array
    /// per run.
    pub fn load_split(&self, split: Split) -> Result<(Vec<Array3<f32>>, Vec<Array1<f32>>)> {
        let (mut features, mut targets) = self.load_cached_runs(split)?;

        if split == Split::Dev {
            (features, targets) =
                select_runs(&features, &targets, self.config.percent_fail_runs.as_ref())?;
        }

        let censor = match split {
            Split::Dev => true,
            Split::Val => self.config.truncate_val,
            Split::Test => false,
        };
        if censor {
            truncate_broken(&mut features, &mut targets, self.config.percent_broken);
        }

        let max_rul = self.max_rul();
        for run_targets in &mut targets {
            cap_targets(run_targets, max_rul);
        }

        let scaler = MinMaxScaler::load(&self.scaler_path())?;
        let window = self.window_size();
        let mut windowed_features = Vec::with_capacity(features.len());
        let mut windowed_targets = Vec::with_capacity(targets.len());
        for (run_features, run_targets) in features.iter_mut().zip(&targets) {
            scaler.transform(run_features)?;
            let (windows, aligned_targets) = window_run(run_features, run_targets, window)?;
            windowed_features.push(windows);
            windowed_targets.push(aligned_targets);
        }

        Ok((windowed_features, windowed_targets))
    }

    /// Like [`load_split`](Self::load_split), for callers holding a split
    /// name instead of a [`Split`].
    pub fn load_split_named(&self, name: &str) -> Result<(Vec<Array3<f32>>, Vec<Array1<f32>>)> {
        self.load_split(name.parse()?)
    }
}

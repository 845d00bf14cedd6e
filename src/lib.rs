//! rul-prep: run-to-failure sensor data preparation for RUL prediction.
//!
//! Converts raw per-run degradation recordings into uniform, normalized,
//! fixed-window training samples:
//!
//! - **Cache store**: one-time idempotent conversion of raw runs into fast
//!   `.npy` artifacts, with RUL targets derived from file-encoded timesteps
//! - **Censoring**: `percent_broken` truncation simulates machines observed
//!   before failure; `percent_fail_runs` selects development-run subsets
//! - **Windowing**: every sample leaves with exactly `window_size` steps,
//!   via sliding windows, snapshot cropping, or left-zero-padding
//! - **Scaling**: per-channel min-max statistics fitted once on the full
//!   development split and persisted for reuse
//!
//! The compatibility model ([`LoaderConfig::check_compatibility`],
//! [`LoaderConfig::get_compatible`], [`LoaderConfig::get_complement`])
//! pairs loaders for transfer and semi-supervised experiments.

pub mod cache;
pub mod domains;
pub mod error;
pub mod loader;
pub mod run;
pub mod scaler;
pub mod selection;
pub mod source;
pub mod split;
pub mod targets;
pub mod transform;

// Re-export the configuration surface
pub use loader::{LoaderConfig, RulLoader};

// Re-export commonly used types
pub use domains::{DomainSpec, RunLayout};
pub use error::{PrepError, Result};
pub use run::RunFeatures;
pub use selection::RunSelection;
pub use split::{RunSplitDist, Split};

// Re-export the scaler and raw-source seam
pub use scaler::MinMaxScaler;
pub use source::{CsvRunSource, CsvSourceConfig, RawRun, RawRunSource};

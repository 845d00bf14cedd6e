//! Raw dataset collaborators.
//!
//! The preparation layer does not know how any concrete dataset is stored.
//! It consumes a [`RawRunSource`]: given a split, produce an ordered mapping
//! from run index to that run's raw features and per-step timestep numbers.
//! Anything that can enumerate its runs this way plugs into the cache and
//! loader unchanged.
//!
//! [`CsvRunSource`] is the bundled collaborator for snapshot-style vibration
//! datasets: one folder per run, one delimited text file per time step, the
//! step number encoded in the file name.

use ndarray::{Array2, Array3};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domains::RunLayout;
use crate::error::{PrepError, Result};
use crate::run::RunFeatures;
use crate::split::Split;

/// One run as produced by a raw dataset parser.
#[derive(Debug, Clone)]
pub struct RawRun {
    /// Feature array, shaped according to the source layout.
    pub features: RunFeatures,
    /// Ordered per-step timestep numbers, used to derive RUL targets.
    pub timesteps: Vec<u32>,
}

/// Capability to enumerate and parse the raw runs of one domain.
pub trait RawRunSource {
    /// Layout of the feature arrays this source produces.
    fn layout(&self) -> RunLayout;

    /// Parse all runs of `split`, keyed by their stable run index.
    fn load_split(&self, split: Split) -> Result<BTreeMap<usize, RawRun>>;
}

/// Discovery and parsing rules for [`CsvRunSource`].
#[derive(Debug, Clone)]
pub struct CsvSourceConfig {
    /// Folder name per split under the data root.
    pub dev_folder: String,
    pub val_folder: String,
    pub test_folder: String,
    /// Pattern matching run folders. `{domain}` is replaced by the domain
    /// id; the first capture group is the run index.
    pub run_folder_pattern: String,
    /// Only files with this prefix inside a run folder are snapshots.
    pub file_prefix: String,
    /// Pattern capturing the integer timestep from a snapshot file name.
    pub timestep_pattern: String,
    /// Zero-based columns to keep from each row.
    pub columns: Vec<usize>,
    /// Rows every snapshot file must contain.
    pub snapshot_len: usize,
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self {
            dev_folder: "dev".into(),
            val_folder: "val".into(),
            test_folder: "test".into(),
            run_folder_pattern: r"^run{domain}_(\d+)$".into(),
            file_prefix: "acc".into(),
            timestep_pattern: r"(\d+)".into(),
            columns: vec![0, 1],
            snapshot_len: 2560,
        }
    }
}

/// Snapshot-directory parser for delimited text datasets.
pub struct CsvRunSource {
    data_root: PathBuf,
    config: CsvSourceConfig,
    run_folder_re: Regex,
    timestep_re: Regex,
}

impl CsvRunSource {
    pub fn new(data_root: &Path, domain_id: u32, config: CsvSourceConfig) -> Result<Self> {
        let run_pattern = config
            .run_folder_pattern
            .replace("{domain}", &domain_id.to_string());
        let run_folder_re = Regex::new(&run_pattern)?;
        let timestep_re = Regex::new(&config.timestep_pattern)?;
        Ok(Self {
            data_root: data_root.to_path_buf(),
            config,
            run_folder_re,
            timestep_re,
        })
    }

    fn split_folder(&self, split: Split) -> PathBuf {
        let name = match split {
            Split::Dev => &self.config.dev_folder,
            Split::Val => &self.config.val_folder,
            Split::Test => &self.config.test_folder,
        };
        self.data_root.join(name)
    }

    /// Run folders of `split`, keyed by the index captured from their name.
    fn run_folders(&self, split: Split) -> Result<BTreeMap<usize, PathBuf>> {
        let split_path = self.split_folder(split);
        let mut folders = BTreeMap::new();
        let mut names: Vec<_> = fs::read_dir(&split_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        for name in names {
            if let Some(caps) = self.run_folder_re.captures(&name) {
                if let Some(idx) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                    folders.insert(idx, split_path.join(&name));
                }
            }
        }
        Ok(folders)
    }

    /// Sorted snapshot file paths of one run folder.
    fn snapshot_files(&self, run_path: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<_> = fs::read_dir(run_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&self.config.file_prefix))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn timestep_from_file(&self, path: &Path) -> Result<u32> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.timestep_re
            .captures(&name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| PrepError::MalformedRun {
                path: path.to_path_buf(),
                reason: "no timestep number in file name".into(),
            })
    }

    /// Parse one snapshot file into `[snapshot_len, columns]`.
    ///
    /// Some raw files use `;` instead of `,`; a failed parse is retried
    /// once after substituting the delimiter, then reported as malformed.
    fn parse_snapshot_file(&self, path: &Path) -> Result<Array2<f32>> {
        let content = fs::read_to_string(path)?;
        match self.parse_snapshot(&content) {
            Ok(snapshot) => Ok(snapshot),
            Err(first_reason) => {
                debug!(path = %path.display(), "retrying snapshot parse with substituted delimiters");
                let substituted = content.replace(';', ",");
                self.parse_snapshot(&substituted)
                    .map_err(|_| PrepError::MalformedRun {
                        path: path.to_path_buf(),
                        reason: first_reason,
                    })
            }
        }
    }

    fn parse_snapshot(&self, content: &str) -> std::result::Result<Array2<f32>, String> {
        let columns = &self.config.columns;
        let mut snapshot = Array2::zeros((self.config.snapshot_len, columns.len()));
        let mut rows = 0usize;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if rows >= self.config.snapshot_len {
                return Err(format!(
                    "more than {} rows in snapshot",
                    self.config.snapshot_len
                ));
            }
            let fields: Vec<&str> = line.split(',').collect();
            for (out_col, &col) in columns.iter().enumerate() {
                let field = fields.get(col).ok_or_else(|| {
                    format!("line {}: missing column {}", line_no + 1, col)
                })?;
                let value: f32 = field.trim().parse().map_err(|_| {
                    format!("line {}: unparsable value '{}'", line_no + 1, field.trim())
                })?;
                snapshot[[rows, out_col]] = value;
            }
            rows += 1;
        }
        if rows != self.config.snapshot_len {
            return Err(format!(
                "expected {} rows, got {}",
                self.config.snapshot_len, rows
            ));
        }
        Ok(snapshot)
    }
}

impl RawRunSource for CsvRunSource {
    fn layout(&self) -> RunLayout {
        RunLayout::Snapshots { snapshot_len: self.config.snapshot_len }
    }

    fn load_split(&self, split: Split) -> Result<BTreeMap<usize, RawRun>> {
        let mut runs = BTreeMap::new();
        for (run_idx, run_path) in self.run_folders(split)? {
            let files = self.snapshot_files(&run_path)?;
            let mut timesteps = Vec::with_capacity(files.len());
            let mut features = Array3::zeros((
                files.len(),
                self.config.snapshot_len,
                self.config.columns.len(),
            ));
            for (i, file) in files.iter().enumerate() {
                timesteps.push(self.timestep_from_file(file)?);
                let snapshot = self.parse_snapshot_file(file)?;
                features
                    .slice_mut(ndarray::s![i, .., ..])
                    .assign(&snapshot);
            }
            debug!(split = %split, run = run_idx, files = files.len(), "parsed raw run");
            runs.insert(
                run_idx,
                RawRun { features: RunFeatures::Snapshots(features), timesteps },
            );
        }
        Ok(runs)
    }
}

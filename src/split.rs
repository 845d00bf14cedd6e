//! Split names and per-domain run index distributions.
//!
//! A domain's runs are partitioned into three named splits. The development
//! split is the only one that run selection and censoring ever narrow; the
//! test split is always served untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PrepError;

/// The three run partitions of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Development data: scaler fitting, run selection and censoring apply here.
    Dev,
    /// Validation data: censored only when `truncate_val` is set.
    Val,
    /// Held-out test data: never narrowed, never censored.
    Test,
}

impl Split {
    /// All splits in canonical order.
    pub const ALL: [Split; 3] = [Split::Dev, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Dev => "dev",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Split::Dev),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(PrepError::UnknownSplit(other.to_string())),
        }
    }
}

/// Which run indices belong to which split.
///
/// Indices refer to the raw dataset's run numbering (folder or file
/// numbering on disk), so they stay stable across loader instantiations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSplitDist {
    pub dev: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl RunSplitDist {
    pub fn new(dev: Vec<usize>, val: Vec<usize>, test: Vec<usize>) -> Self {
        Self { dev, val, test }
    }

    /// Run indices assigned to `split`.
    pub fn indices(&self, split: Split) -> &[usize] {
        match split {
            Split::Dev => &self.dev,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    /// Number of development runs. Run selection fractions resolve
    /// against this count.
    pub fn num_dev_runs(&self) -> usize {
        self.dev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trip() {
        for split in Split::ALL {
            assert_eq!(split, split.as_str().parse().unwrap());
        }
    }

    #[test]
    fn test_unknown_split_rejected() {
        let err = "train".parse::<Split>().unwrap_err();
        assert!(matches!(err, PrepError::UnknownSplit(s) if s == "train"));
    }

    #[test]
    fn test_dist_indices() {
        let dist = RunSplitDist::new(vec![1, 2], vec![3], vec![4, 5, 6, 7]);
        assert_eq!(dist.indices(Split::Dev), &[1, 2]);
        assert_eq!(dist.indices(Split::Val), &[3]);
        assert_eq!(dist.indices(Split::Test), &[4, 5, 6, 7]);
        assert_eq!(dist.num_dev_runs(), 2);
    }
}

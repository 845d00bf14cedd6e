//! Built-in domain descriptions.
//!
//! A domain is one recording condition of a dataset family (one rig, one
//! operating regime). Domains are modeled as data, not types: each id maps
//! to a [`DomainSpec`] describing how its runs are laid out on disk, how
//! they are windowed by default, and which runs belong to which split.
//!
//! Domains 1-3 are snapshot-layout vibration domains: each time step is a
//! fixed-length high-frequency snapshot recorded once per cycle. Domain 4
//! is a sequence-layout domain of one low-frequency record per cycle.

use crate::error::{PrepError, Result};
use crate::split::RunSplitDist;

/// How a domain's per-run feature arrays are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLayout {
    /// One flat feature record per time step: `[T, channels]`.
    Sequence,
    /// One fixed-length snapshot per time step: `[T, snapshot_len, channels]`.
    /// The stored snapshot length is the domain's maximum usable window.
    Snapshots { snapshot_len: usize },
}

/// Static description of one domain.
#[derive(Debug, Clone)]
pub struct DomainSpec {
    /// Domain identifier, embedded in cache and scaler filenames.
    pub id: u32,
    /// Window size used when a loader does not request one explicitly.
    pub default_window_size: usize,
    /// Cap applied to derived RUL targets when the loader does not override it.
    pub default_max_rul: u32,
    /// Feature array layout of this domain's runs.
    pub layout: RunLayout,
    /// Default assignment of run indices to splits.
    pub run_split_dist: RunSplitDist,
}

/// Stored snapshot length of the vibration domains (samples per snapshot).
pub const SNAPSHOT_LEN: usize = 2560;

/// Default RUL cap shared by all built-in domains (cycles).
pub const DEFAULT_MAX_RUL: u32 = 125;

impl DomainSpec {
    /// Look up a built-in domain by id.
    pub fn get(id: u32) -> Result<DomainSpec> {
        match id {
            1 => Ok(Self::snapshot_domain(
                1,
                RunSplitDist::new(vec![1, 2], vec![3], vec![4, 5, 6, 7]),
            )),
            2 => Ok(Self::snapshot_domain(
                2,
                RunSplitDist::new(vec![1, 2], vec![3], vec![4, 5, 6, 7]),
            )),
            3 => Ok(Self::snapshot_domain(
                3,
                RunSplitDist::new(vec![1], vec![2], vec![3]),
            )),
            4 => Ok(DomainSpec {
                id: 4,
                default_window_size: 30,
                default_max_rul: DEFAULT_MAX_RUL,
                layout: RunLayout::Sequence,
                run_split_dist: RunSplitDist::new(
                    (1..=8).collect(),
                    vec![9, 10],
                    (11..=14).collect(),
                ),
            }),
            other => Err(PrepError::UnknownDomain(other)),
        }
    }

    /// All built-in domain ids.
    pub fn known_ids() -> Vec<u32> {
        vec![1, 2, 3, 4]
    }

    fn snapshot_domain(id: u32, run_split_dist: RunSplitDist) -> DomainSpec {
        DomainSpec {
            id,
            default_window_size: SNAPSHOT_LEN,
            default_max_rul: DEFAULT_MAX_RUL,
            layout: RunLayout::Snapshots { snapshot_len: SNAPSHOT_LEN },
            run_split_dist,
        }
    }
}

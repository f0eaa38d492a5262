// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Operating parameters of the consensus instance.
/// All fields should tolerate inconsistencies with other validators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameters {
    /// Number of validators sampled per poll.
    #[serde(default = "Parameters::default_k")]
    pub k: usize,

    /// Votes required within a poll for the poll to count towards confidence.
    #[serde(default = "Parameters::default_alpha")]
    pub alpha: usize,

    /// Confidence threshold finalizing a transaction with no known conflicts.
    #[serde(default = "Parameters::default_beta_virtuous")]
    pub beta_virtuous: u32,

    /// Confidence threshold finalizing a transaction that has conflicts.
    #[serde(default = "Parameters::default_beta_rogue")]
    pub beta_rogue: u32,

    /// Maximum number of transactions bundled into a single candidate vertex.
    #[serde(default = "Parameters::default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of outstanding polls that repolling may create.
    #[serde(default = "Parameters::default_concurrent_repolls")]
    pub concurrent_repolls: usize,

    /// Capacity of the bounded cache of decided vertex ids.
    #[serde(default = "Parameters::default_decided_cache_size")]
    pub decided_cache_size: usize,

    /// Capacity of the bounded cache of dropped (abandoned) vertex ids.
    #[serde(default = "Parameters::default_dropped_cache_size")]
    pub dropped_cache_size: usize,
}

impl Parameters {
    fn default_k() -> usize {
        20
    }

    fn default_alpha() -> usize {
        15
    }

    fn default_beta_virtuous() -> u32 {
        15
    }

    fn default_beta_rogue() -> u32 {
        20
    }

    fn default_batch_size() -> usize {
        30
    }

    fn default_concurrent_repolls() -> usize {
        4
    }

    fn default_decided_cache_size() -> usize {
        1024
    }

    fn default_dropped_cache_size() -> usize {
        1024
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: Parameters::default_k(),
            alpha: Parameters::default_alpha(),
            beta_virtuous: Parameters::default_beta_virtuous(),
            beta_rogue: Parameters::default_beta_rogue(),
            batch_size: Parameters::default_batch_size(),
            concurrent_repolls: Parameters::default_concurrent_repolls(),
            decided_cache_size: Parameters::default_decided_cache_size(),
            dropped_cache_size: Parameters::default_dropped_cache_size(),
        }
    }
}

// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Committee of the current epoch.
/// Stakes are fixed for the epoch; the engine only samples and counts them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Committee {
    /// Epoch of the committee.
    epoch: Epoch,
    /// Total stake in the committee.
    total_stake: Stake,
    /// The authorities in the committee, in AuthorityIndex order.
    authorities: Vec<Authority>,
}

impl Committee {
    pub fn new(epoch: Epoch, authorities: Vec<Authority>) -> Self {
        assert!(!authorities.is_empty(), "Committee cannot be empty!");
        assert!(
            authorities.len() < u32::MAX as usize,
            "Too many authorities ({})!",
            authorities.len()
        );
        let total_stake = authorities.iter().map(|a| a.stake).sum();
        assert_ne!(total_stake, 0, "Total stake cannot be 0!");
        Self {
            epoch,
            total_stake,
            authorities,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn total_stake(&self) -> Stake {
        self.total_stake
    }

    pub fn stake(&self, authority_index: AuthorityIndex) -> Stake {
        self.authorities[authority_index.value()].stake
    }

    pub fn authority(&self, authority_index: AuthorityIndex) -> &Authority {
        &self.authorities[authority_index.value()]
    }

    pub fn authorities(&self) -> impl Iterator<Item = (AuthorityIndex, &Authority)> {
        self.authorities
            .iter()
            .enumerate()
            .map(|(i, a)| (AuthorityIndex(i as u32), a))
    }

    pub fn size(&self) -> usize {
        self.authorities.len()
    }

    pub fn exists(&self, authority_index: AuthorityIndex) -> bool {
        authority_index.value() < self.size()
    }

    pub fn to_authority_index(&self, index: usize) -> Option<AuthorityIndex> {
        if index < self.authorities.len() {
            Some(AuthorityIndex(index as u32))
        } else {
            None
        }
    }

    /// Samples `k` distinct authorities, weighted by stake, without
    /// replacement. Returns None when the committee has fewer than `k`
    /// members, which callers treat as a recoverable condition.
    pub fn sample<R: Rng>(&self, k: usize, rng: &mut R) -> Option<Vec<AuthorityIndex>> {
        if self.size() < k {
            return None;
        }

        let mut remaining: Vec<(AuthorityIndex, Stake)> = self
            .authorities()
            .map(|(index, authority)| (index, authority.stake))
            .collect();
        let mut remaining_stake = self.total_stake;
        let mut sampled = Vec::with_capacity(k);

        for _ in 0..k {
            // Only zero stake authorities can remain once the stake is
            // exhausted; take them in index order.
            let position = if remaining_stake == 0 {
                0
            } else {
                let mut point = rng.gen_range(0..remaining_stake);
                remaining
                    .iter()
                    .position(|(_, stake)| {
                        if point < *stake {
                            true
                        } else {
                            point -= *stake;
                            false
                        }
                    })
                    .expect("Sampling point must land on a remaining authority")
            };
            let (index, stake) = remaining.swap_remove(position);
            remaining_stake -= stake;
            sampled.push(index);
        }

        Some(sampled)
    }

    /// Create a committee of the given stakes for testing.
    pub fn new_for_test(epoch: Epoch, stakes: Vec<Stake>) -> Self {
        let authorities = stakes
            .into_iter()
            .enumerate()
            .map(|(i, stake)| Authority {
                stake,
                hostname: format!("test_host_{i}"),
            })
            .collect();
        Self::new(epoch, authorities)
    }
}

/// Represents one authority in the committee.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Authority {
    /// Voting power of the authority in the committee.
    pub stake: Stake,
    /// The authority's hostname, for metrics and logging.
    pub hostname: String,
}

/// Each authority is uniquely identified by its AuthorityIndex in the Committee.
/// AuthorityIndex is between 0 (inclusive) and the total number of authorities (exclusive).
#[derive(
    Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Debug, Default, Hash, Serialize, Deserialize,
)]
pub struct AuthorityIndex(u32);

impl AuthorityIndex {
    pub fn value(&self) -> usize {
        self.0 as usize
    }

    pub fn new_for_test(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for AuthorityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

pub type Epoch = u64;
pub type Stake = u64;

// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use snowdag_config::AuthorityIndex;
use tracing::debug;

use crate::vertex::VertexId;

/// Sends push queries to sampled validators. The network layer routes the
/// responses back through the engine as chits or query failures.
pub trait QuerySender: Send + Sync {
    fn push_query(
        &self,
        validators: BTreeSet<AuthorityIndex>,
        request_id: u64,
        vertex_id: VertexId,
        vertex_bytes: Bytes,
    );
}

struct Poll {
    /// Sampled validators that have not responded yet.
    pending: BTreeSet<AuthorityIndex>,
    /// Chits received so far, by preferred vertex.
    votes: BTreeMap<VertexId, usize>,
}

/// The outstanding polls of this validator, keyed by request id.
///
/// A poll completes when every sampled validator has either voted or failed;
/// completion returns the tally and removes the poll.
pub(crate) struct PollSet {
    polls: BTreeMap<u64, Poll>,
}

impl PollSet {
    pub(crate) fn new() -> Self {
        Self {
            polls: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.polls.len()
    }

    /// Registers a poll for `request_id` over the sampled validators.
    /// Returns false when the request id is already in flight or the sample
    /// is empty.
    pub(crate) fn add(&mut self, request_id: u64, validators: Vec<AuthorityIndex>) -> bool {
        if validators.is_empty() || self.polls.contains_key(&request_id) {
            return false;
        }
        self.polls.insert(
            request_id,
            Poll {
                pending: validators.into_iter().collect(),
                votes: BTreeMap::new(),
            },
        );
        true
    }

    /// Records the response of `authority` to poll `request_id`. A `None`
    /// vote is a query failure and only unblocks the poll. Returns the tally
    /// once the last sampled validator has responded.
    pub(crate) fn vote(
        &mut self,
        request_id: u64,
        authority: AuthorityIndex,
        vote: Option<VertexId>,
    ) -> Option<BTreeMap<VertexId, usize>> {
        let poll = self.polls.get_mut(&request_id)?;
        if !poll.pending.remove(&authority) {
            debug!(
                "Ignoring vote from unsampled or duplicate authority {} for request {}",
                authority, request_id
            );
            return None;
        }
        if let Some(vertex_id) = vote {
            *poll.votes.entry(vertex_id).or_insert(0) += 1;
        }
        if !poll.pending.is_empty() {
            return None;
        }
        self.polls
            .remove(&request_id)
            .map(|finished| finished.votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority(index: u32) -> AuthorityIndex {
        AuthorityIndex::new_for_test(index)
    }

    fn vertex(seed: u8) -> VertexId {
        VertexId::new([seed; 32])
    }

    #[test]
    fn poll_completes_when_all_respond() {
        let mut polls = PollSet::new();
        assert!(polls.add(1, vec![authority(0), authority(1), authority(2)]));
        assert_eq!(polls.len(), 1);

        assert!(polls.vote(1, authority(0), Some(vertex(1))).is_none());
        assert!(polls.vote(1, authority(1), Some(vertex(1))).is_none());
        let tally = polls.vote(1, authority(2), Some(vertex(2))).unwrap();

        assert_eq!(tally.get(&vertex(1)), Some(&2));
        assert_eq!(tally.get(&vertex(2)), Some(&1));
        assert_eq!(polls.len(), 0);
    }

    #[test]
    fn failures_unblock_without_voting() {
        let mut polls = PollSet::new();
        assert!(polls.add(7, vec![authority(0), authority(1)]));

        assert!(polls.vote(7, authority(0), None).is_none());
        let tally = polls.vote(7, authority(1), Some(vertex(3))).unwrap();

        assert_eq!(tally.len(), 1);
        assert_eq!(tally.get(&vertex(3)), Some(&1));
    }

    #[test]
    fn duplicate_and_unsampled_votes_are_ignored() {
        let mut polls = PollSet::new();
        assert!(polls.add(7, vec![authority(0), authority(1)]));

        assert!(polls.vote(7, authority(0), Some(vertex(1))).is_none());
        // Voting twice, or from a validator outside the sample, changes
        // nothing.
        assert!(polls.vote(7, authority(0), Some(vertex(1))).is_none());
        assert!(polls.vote(7, authority(5), Some(vertex(1))).is_none());

        let tally = polls.vote(7, authority(1), None).unwrap();
        assert_eq!(tally.get(&vertex(1)), Some(&1));
    }

    #[test]
    fn add_rejects_duplicates_and_empty_samples() {
        let mut polls = PollSet::new();
        assert!(!polls.add(1, vec![]));
        assert!(polls.add(1, vec![authority(0)]));
        assert!(!polls.add(1, vec![authority(1)]));

        // An unknown request id is ignored outright.
        assert!(polls.vote(2, authority(0), Some(vertex(1))).is_none());
    }
}

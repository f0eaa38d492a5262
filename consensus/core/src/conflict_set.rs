// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
    sync::Arc,
};

use crate::{
    error::{ConsensusError, ConsensusResult},
    transaction::{InputId, Tx, TxId},
};

/// Tracks the pool of currently processing transactions and which of them are
/// mutually exclusive. Two transactions conflict iff their input sets
/// overlap; the relation is symmetric by construction.
///
/// A transaction leaves the pool only through `updateable()`, once its fate
/// is fixed. At most one member of a conflict set is ever returned as
/// acceptable, and its conflicts are returned as rejectable no later than the
/// batch that accepts it.
pub(crate) struct ConflictSet {
    /// Processing transactions by id.
    txs: BTreeMap<TxId, Arc<dyn Tx>>,
    /// For every input consumed by a processing transaction, the
    /// transactions consuming it.
    spenders: BTreeMap<InputId, BTreeSet<TxId>>,
    /// Consecutive successful polls per transaction.
    confidence: BTreeMap<TxId, u32>,
    /// Transactions whose confidence threshold has been met but which have
    /// not yet been released through `updateable()`.
    conditionally_accepted: BTreeSet<TxId>,
}

impl ConflictSet {
    pub(crate) fn new() -> Self {
        Self {
            txs: BTreeMap::new(),
            spenders: BTreeMap::new(),
            confidence: BTreeMap::new(),
            conditionally_accepted: BTreeSet::new(),
        }
    }

    /// Begins tracking `tx` for conflict purposes.
    pub(crate) fn add(&mut self, tx: Arc<dyn Tx>) -> ConsensusResult<()> {
        let id = tx.id();
        if self.txs.contains_key(&id) {
            return Err(ConsensusError::DuplicateTransaction(id));
        }
        for input in tx.inputs() {
            self.spenders.entry(input).or_default().insert(id);
        }
        self.txs.insert(id, tx);
        Ok(())
    }

    pub(crate) fn contains(&self, id: &TxId) -> bool {
        self.txs.contains_key(id)
    }

    pub(crate) fn get(&self, id: &TxId) -> Option<Arc<dyn Tx>> {
        self.txs.get(id).cloned()
    }

    /// True iff no currently tracked transaction conflicts with `tx`.
    pub(crate) fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        self.conflicts(tx).is_empty()
    }

    /// The currently tracked transactions whose input sets overlap with
    /// `tx`'s, excluding `tx` itself.
    pub(crate) fn conflicts(&self, tx: &dyn Tx) -> BTreeSet<TxId> {
        let id = tx.id();
        let mut conflicting = BTreeSet::new();
        for input in tx.inputs() {
            if let Some(spenders) = self.spenders.get(&input) {
                conflicting.extend(spenders.iter().filter(|spender| **spender != id));
            }
        }
        conflicting
    }

    /// Records a successful poll for `id` and returns its new confidence.
    pub(crate) fn record_vote(&mut self, id: TxId) -> u32 {
        let confidence = self.confidence.entry(id).or_insert(0);
        *confidence += 1;
        *confidence
    }

    /// Clears the confidence of every tracked transaction not present in
    /// `endorsed`. Confidence counts consecutive successful polls, so a
    /// completed poll that passes a transaction over starts it from zero.
    pub(crate) fn reset_votes_except(&mut self, endorsed: &BTreeSet<TxId>) {
        self.confidence.retain(|id, _| endorsed.contains(id));
    }

    /// Marks `id` as conditionally accepted: its confidence threshold has
    /// been met, but finalization waits for the next `updateable()` batch.
    pub(crate) fn accept(&mut self, id: TxId) {
        if self.txs.contains_key(&id) {
            self.conditionally_accepted.insert(id);
        }
    }

    /// Returns the transactions whose fate is now fixed, as a batch of
    /// (acceptable, rejectable). Every acceptable transaction was previously
    /// marked via `accept`; every conflict of an acceptable transaction is
    /// returned as rejectable in the same call. Returned transactions are no
    /// longer tracked.
    pub(crate) fn updateable(&mut self) -> (Vec<Arc<dyn Tx>>, Vec<Arc<dyn Tx>>) {
        let mut acceptable = Vec::new();
        let mut rejectable = Vec::new();

        // BTreeSet order makes resolution deterministic when two
        // conditionally accepted transactions conflict with each other: the
        // lower id wins.
        for id in mem::take(&mut self.conditionally_accepted) {
            let Some(tx) = self.txs.get(&id).cloned() else {
                // Already rejected by an earlier transaction in this batch.
                continue;
            };
            for conflict_id in self.conflicts(tx.as_ref()) {
                if let Some(conflict) = self.remove(&conflict_id) {
                    rejectable.push(conflict);
                }
            }
            self.remove(&id);
            acceptable.push(tx);
        }

        (acceptable, rejectable)
    }

    fn remove(&mut self, id: &TxId) -> Option<Arc<dyn Tx>> {
        let tx = self.txs.remove(id)?;
        self.confidence.remove(id);
        for input in tx.inputs() {
            if let Some(spenders) = self.spenders.get_mut(&input) {
                spenders.remove(id);
                if spenders.is_empty() {
                    self.spenders.remove(&input);
                }
            }
        }
        Some(tx)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.txs.len()
    }
}

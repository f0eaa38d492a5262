// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

use snowdag_config::Parameters;
use tracing::debug;

use crate::{
    conflict_set::ConflictSet,
    error::{ConsensusError, ConsensusResult},
    transaction::{Tx, TxId},
    vertex::{Vertex, VertexId},
};

/// Vertex identifiers newly decided by a single consensus operation.
#[derive(Default, Debug)]
pub struct Decisions {
    pub accepted: Vec<VertexId>,
    pub rejected: Vec<VertexId>,
}

impl Decisions {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty()
    }
}

/// The consensus DAG the issuance state machine feeds.
///
/// `add` receives a vertex whose whole causal history has already been
/// admitted, and returns every vertex the admission cascade newly decided.
/// Votes from completed polls arrive through `record_votes` and can decide
/// vertices the same way.
pub trait Consensus: Send {
    fn parameters(&self) -> &Parameters;

    /// Whether the vertex has been admitted (processing or decided).
    fn vertex_issued(&self, id: &VertexId) -> bool;

    /// Whether the transaction is tracked for conflicts or already decided.
    fn tx_issued(&self, id: &TxId) -> bool;

    /// Admits a vertex. All parents must already be issued and all carried
    /// transactions verified.
    fn add(&mut self, vtx: Arc<dyn Vertex>) -> ConsensusResult<Decisions>;

    /// True iff no tracked transaction conflicts with `tx`.
    fn is_virtuous(&self, tx: &dyn Tx) -> bool;

    /// The tracked transactions conflicting with `tx`.
    fn conflicts(&self, tx: &dyn Tx) -> BTreeSet<TxId>;

    /// Applies the winning vertices of a completed poll. A vote for a vertex
    /// endorses its whole undecided ancestry. Call with no winners when a
    /// completed poll reached quorum for nothing.
    fn record_votes(&mut self, votes: Vec<VertexId>) -> ConsensusResult<Decisions>;

    /// The preferred frontier: processing vertices new candidates should
    /// build on.
    fn preferences(&self) -> Vec<VertexId>;

    /// True once no undecided vertex remains.
    fn finalized(&self) -> bool;
}

struct VertexEntry {
    vtx: Arc<dyn Vertex>,
    tx_ids: Vec<TxId>,
}

/// Avalanche-style DAG consensus over a [`ConflictSet`].
///
/// A processing vertex is accepted once all of its transactions and parents
/// are accepted, and rejected as soon as one of its transactions or parents
/// is rejected. Decisions cascade: a single admission or vote can settle a
/// whole ancestry.
pub struct DagConsensus {
    parameters: Parameters,
    conflicts: ConflictSet,
    /// Admitted, not yet decided vertices.
    vertices: BTreeMap<VertexId, VertexEntry>,
    /// Processing vertices endorsed by at least one completed poll. Only
    /// endorsed vertices can be accepted; this keeps empty vertices over an
    /// accepted frontier from being accepted without ever being polled.
    voted: BTreeSet<VertexId>,
    accepted_vertices: BTreeSet<VertexId>,
    rejected_vertices: BTreeSet<VertexId>,
    accepted_txs: BTreeSet<TxId>,
    rejected_txs: BTreeSet<TxId>,
    /// Decided vertex and transaction ids in decision order, for pruning the
    /// sets above once history outgrows the decided cache bound.
    decided_vertex_log: VecDeque<VertexId>,
    decided_tx_log: VecDeque<TxId>,
}

impl DagConsensus {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            conflicts: ConflictSet::new(),
            vertices: BTreeMap::new(),
            voted: BTreeSet::new(),
            accepted_vertices: BTreeSet::new(),
            rejected_vertices: BTreeSet::new(),
            accepted_txs: BTreeSet::new(),
            rejected_txs: BTreeSet::new(),
            decided_vertex_log: VecDeque::new(),
            decided_tx_log: VecDeque::new(),
        }
    }

    /// Releases every transaction whose fate is now fixed, then decides
    /// vertices to a fixpoint.
    fn settle(&mut self) -> ConsensusResult<Decisions> {
        let mut decisions = Decisions::default();

        loop {
            let (acceptable, rejectable) = self.conflicts.updateable();
            let txs_settled = !acceptable.is_empty() || !rejectable.is_empty();

            for tx in acceptable {
                tx.accept()
                    .map_err(|err| ConsensusError::TxAcceptFailed(tx.id(), err.to_string()))?;
                self.accepted_txs.insert(tx.id());
                self.decided_tx_log.push_back(tx.id());
            }
            for tx in rejectable {
                tx.reject()
                    .map_err(|err| ConsensusError::TxRejectFailed(tx.id(), err.to_string()))?;
                self.rejected_txs.insert(tx.id());
                self.decided_tx_log.push_back(tx.id());
            }

            let mut vertices_settled = false;
            loop {
                let Some(id) = self.next_decidable_vertex() else {
                    break;
                };
                vertices_settled = true;
                let entry = self.vertices.remove(&id).expect("Vertex entry must exist");
                self.voted.remove(&id);
                self.decided_vertex_log.push_back(id);
                if self.is_rejected(&entry) {
                    debug!("Vertex {} rejected", id);
                    self.rejected_vertices.insert(id);
                    decisions.rejected.push(id);
                } else {
                    debug!("Vertex {} accepted", id);
                    self.accepted_vertices.insert(id);
                    decisions.accepted.push(id);
                }
            }

            if !txs_settled && !vertices_settled {
                self.prune_decided();
                return Ok(decisions);
            }
        }
    }

    fn next_decidable_vertex(&self) -> Option<VertexId> {
        self.vertices
            .iter()
            .find(|(id, entry)| self.is_rejected(entry) || self.is_accepted(id, entry))
            .map(|(id, _)| *id)
    }

    fn is_rejected(&self, entry: &VertexEntry) -> bool {
        entry
            .tx_ids
            .iter()
            .any(|id| self.rejected_txs.contains(id))
            || entry
                .vtx
                .parents()
                .iter()
                .any(|parent| self.rejected_vertices.contains(parent))
    }

    fn is_accepted(&self, id: &VertexId, entry: &VertexEntry) -> bool {
        self.voted.contains(id)
            && entry
                .tx_ids
                .iter()
                .all(|id| self.accepted_txs.contains(id))
            && entry
                .vtx
                .parents()
                .iter()
                .all(|parent| self.parent_accepted(parent))
    }

    // Parents unknown to this instance were decided before it started
    // tracking (bootstrapped history) and count as accepted.
    fn parent_accepted(&self, parent: &VertexId) -> bool {
        self.accepted_vertices.contains(parent) || !self.vertex_issued(parent)
    }

    /// Decided history is kept only as long as a newly arriving vertex could
    /// plausibly reference it, matching the engine's decided cache bound.
    fn prune_decided(&mut self) {
        let cap = self.parameters.decided_cache_size;
        while self.decided_vertex_log.len() > cap {
            let id = self
                .decided_vertex_log
                .pop_front()
                .expect("Log outgrew its bound");
            self.accepted_vertices.remove(&id);
            self.rejected_vertices.remove(&id);
        }
        while self.decided_tx_log.len() > cap {
            let id = *self.decided_tx_log.front().expect("Log outgrew its bound");
            // A decided transaction can still gate an undecided vertex that
            // carries it; keep it until that vertex settles.
            if self
                .vertices
                .values()
                .any(|entry| entry.tx_ids.contains(&id))
            {
                break;
            }
            self.decided_tx_log.pop_front();
            self.accepted_txs.remove(&id);
            self.rejected_txs.remove(&id);
        }
    }
}

impl Consensus for DagConsensus {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn vertex_issued(&self, id: &VertexId) -> bool {
        self.vertices.contains_key(id)
            || self.accepted_vertices.contains(id)
            || self.rejected_vertices.contains(id)
    }

    fn tx_issued(&self, id: &TxId) -> bool {
        self.conflicts.contains(id)
            || self.accepted_txs.contains(id)
            || self.rejected_txs.contains(id)
    }

    fn add(&mut self, vtx: Arc<dyn Vertex>) -> ConsensusResult<Decisions> {
        let id = vtx.id();
        if self.vertex_issued(&id) {
            return Ok(Decisions::default());
        }

        let txs = vtx.txs()?;
        let mut tx_ids = Vec::with_capacity(txs.len());
        for tx in txs {
            let tx_id = tx.id();
            if !self.tx_issued(&tx_id) {
                self.conflicts.add(tx)?;
            }
            tx_ids.push(tx_id);
        }
        self.vertices.insert(id, VertexEntry { vtx, tx_ids });

        self.settle()
    }

    fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        self.conflicts.is_virtuous(tx)
    }

    fn conflicts(&self, tx: &dyn Tx) -> BTreeSet<TxId> {
        self.conflicts.conflicts(tx)
    }

    fn record_votes(&mut self, votes: Vec<VertexId>) -> ConsensusResult<Decisions> {
        // A chit endorses the voted vertex and everything it builds on, so
        // the credit flows through the undecided transitive ancestry. That is
        // what lets polls over empty repoll vertices keep raising the
        // confidence of stalled ancestors.
        let mut frontier = votes;
        let mut endorsed: BTreeSet<VertexId> = BTreeSet::new();
        let mut credited: BTreeSet<TxId> = BTreeSet::new();
        while let Some(vertex_id) = frontier.pop() {
            if !endorsed.insert(vertex_id) {
                continue;
            }
            let Some(entry) = self.vertices.get(&vertex_id) else {
                continue;
            };
            self.voted.insert(vertex_id);
            credited.extend(entry.tx_ids.iter().copied());
            frontier.extend(entry.vtx.parents().iter().copied());
        }

        for tx_id in &credited {
            let Some(tx) = self.conflicts.get(tx_id) else {
                continue;
            };
            let confidence = self.conflicts.record_vote(*tx_id);
            // Rogue transactions need the higher confidence threshold.
            let threshold = if self.conflicts.is_virtuous(tx.as_ref()) {
                self.parameters.beta_virtuous
            } else {
                self.parameters.beta_rogue
            };
            if confidence >= threshold {
                self.conflicts.accept(*tx_id);
            }
        }
        // Confidence counts consecutive successes: every transaction this
        // completed poll did not endorse starts over.
        self.conflicts.reset_votes_except(&credited);

        self.settle()
    }

    fn preferences(&self) -> Vec<VertexId> {
        // Frontier: processing vertices that no other processing vertex
        // builds on yet.
        let referenced: BTreeSet<VertexId> = self
            .vertices
            .values()
            .flat_map(|entry| entry.vtx.parents().iter().copied())
            .collect();
        let frontier: Vec<VertexId> = self
            .vertices
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect();
        if !frontier.is_empty() {
            return frontier;
        }
        // Everything is decided; build on recently accepted vertices.
        self.accepted_vertices.iter().rev().take(2).copied().collect()
    }

    fn finalized(&self) -> bool {
        self.vertices.is_empty()
    }
}

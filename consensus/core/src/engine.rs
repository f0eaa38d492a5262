// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
    num::NonZeroUsize,
    sync::Arc,
};

use lru::LruCache;
use rand::{rngs::StdRng, SeedableRng};
use snowdag_config::AuthorityIndex;
use tracing::{debug, info, warn};

use crate::{
    blocker::Blocker,
    consensus::{Consensus, Decisions},
    context::Context,
    error::{ConsensusError, ConsensusResult, ErrorSink},
    issuer::Issuer,
    poll::{PollSet, QuerySender},
    storage::VertexStore,
    transaction::{InputId, Tx, TxId},
    vertex::{Vertex, VertexBuilder, VertexId, VertexParser},
};

/// The issuance engine of one validator.
///
/// Vertices arrive from local batching or from the network, wait in the
/// pending set until their ancestry is admitted, and are then admitted to
/// consensus and polled. All event handlers run on a single call path, so no
/// internal synchronization is needed.
///
/// The engine fails stop: the first fatal error is latched and every
/// subsequent operation returns it without doing further work.
pub struct Engine {
    context: Arc<Context>,
    consensus: Box<dyn Consensus>,
    store: Arc<dyn VertexStore>,
    sender: Arc<dyn QuerySender>,
    builder: Arc<dyn VertexBuilder>,
    parser: Arc<dyn VertexParser>,
    rng: StdRng,

    /// Vertices whose issuance has started and not yet resolved.
    pending: BTreeSet<VertexId>,
    /// Dependency bookkeeping for each pending vertex.
    issuers: BTreeMap<VertexId, Issuer>,
    /// Pending vertices keyed by the parent vertex blocking them.
    vtx_blocked: Blocker<VertexId, VertexId>,
    /// Pending vertices keyed by the transaction blocking them.
    tx_blocked: Blocker<TxId, VertexId>,
    /// Vertices admitted to consensus and not yet decided.
    processing: BTreeMap<VertexId, Arc<dyn Vertex>>,
    /// Recently decided vertex ids, to drop duplicate gossip cheaply.
    decided: LruCache<VertexId, ()>,
    /// Recently abandoned vertex ids. Unlike decided vertices these may be
    /// issued again.
    dropped: LruCache<VertexId, ()>,
    /// Canonical transaction instance per id, so every vertex carrying a
    /// transaction shares the copy consensus tracks.
    known_txs: BTreeMap<TxId, Arc<dyn Tx>>,

    polls: PollSet,
    request_id: u64,
    errs: ErrorSink,
}

impl Engine {
    pub fn new(
        context: Arc<Context>,
        consensus: Box<dyn Consensus>,
        store: Arc<dyn VertexStore>,
        sender: Arc<dyn QuerySender>,
        builder: Arc<dyn VertexBuilder>,
        parser: Arc<dyn VertexParser>,
    ) -> Self {
        let decided_cache = NonZeroUsize::new(context.parameters.decided_cache_size)
            .expect("Decided cache size must be positive");
        let dropped_cache = NonZeroUsize::new(context.parameters.dropped_cache_size)
            .expect("Dropped cache size must be positive");
        let rng = StdRng::seed_from_u64(context.own_index.value() as u64);
        Self {
            context,
            consensus,
            store,
            sender,
            builder,
            parser,
            rng,
            pending: BTreeSet::new(),
            issuers: BTreeMap::new(),
            vtx_blocked: Blocker::new(),
            tx_blocked: Blocker::new(),
            processing: BTreeMap::new(),
            decided: LruCache::new(decided_cache),
            dropped: LruCache::new(dropped_cache),
            known_txs: BTreeMap::new(),
            polls: PollSet::new(),
            request_id: 0,
            errs: ErrorSink::default(),
        }
    }

    /// Starts issuing a vertex received as raw bytes from the network.
    /// Malformed bytes are an error of the sender, not of this engine.
    pub fn issue_from_bytes(&mut self, bytes: &[u8]) -> ConsensusResult<()> {
        let vtx = self.parser.parse_vertex(bytes)?;
        self.issue_vertex(vtx)
    }

    /// Starts issuing a vertex. The vertex is admitted immediately when its
    /// whole ancestry is known, and parked until then otherwise.
    pub fn issue_vertex(&mut self, vtx: Arc<dyn Vertex>) -> ConsensusResult<()> {
        self.issue(vtx);
        self.update_stats();
        self.flush_errors()
    }

    /// Batches locally submitted transactions into new vertices over the
    /// currently preferred frontier.
    pub fn issue_txs(&mut self, txs: Vec<Arc<dyn Tx>>) -> ConsensusResult<()> {
        if self.errs.errored() {
            return self.flush_errors();
        }
        let txs = self.canonicalize(txs);
        self.batch(txs, false, false);
        self.update_stats();
        self.flush_errors()
    }

    /// Gives up on a vertex whose ancestry cannot be completed, along with
    /// every pending vertex that transitively depends on it. A vertex that
    /// was already admitted is unaffected.
    pub fn abandon_vertex(&mut self, vtx_id: VertexId) -> ConsensusResult<()> {
        self.abandon(vtx_id);
        self.update_stats();
        self.flush_errors()
    }

    /// Records the chit of `authority` for poll `request_id`.
    pub fn record_chits(
        &mut self,
        request_id: u64,
        authority: AuthorityIndex,
        vote: VertexId,
    ) -> ConsensusResult<()> {
        self.handle_vote(request_id, authority, Some(vote))
    }

    /// Records that `authority` failed to answer poll `request_id`.
    pub fn record_query_failed(
        &mut self,
        request_id: u64,
        authority: AuthorityIndex,
    ) -> ConsensusResult<()> {
        self.handle_vote(request_id, authority, None)
    }

    /// Issues an empty vertex over the preferred frontier to keep polling
    /// while undecided vertices remain, bounded by `concurrent_repolls`.
    pub fn repoll(&mut self) -> ConsensusResult<()> {
        if self.errs.errored() {
            return self.flush_errors();
        }
        self.repoll_internal();
        self.update_stats();
        self.flush_errors()
    }

    fn handle_vote(
        &mut self,
        request_id: u64,
        authority: AuthorityIndex,
        vote: Option<VertexId>,
    ) -> ConsensusResult<()> {
        if self.errs.errored() {
            return self.flush_errors();
        }
        if let Some(tally) = self.polls.vote(request_id, authority, vote) {
            let alpha = self.context.parameters.alpha;
            let winners: Vec<VertexId> = tally
                .into_iter()
                .filter(|(_, votes)| *votes >= alpha)
                .map(|(vertex_id, _)| vertex_id)
                .collect();
            // A completed poll is recorded even without winners: confidence
            // counts consecutive successes, so it resets unendorsed streaks.
            match self.consensus.record_votes(winners) {
                Ok(decisions) => {
                    if let Err(err) = self.process_decided(decisions) {
                        self.errs.add(err);
                    }
                }
                Err(err) => self.errs.add(err),
            }
            self.repoll_internal();
        }
        self.update_stats();
        self.flush_errors()
    }

    fn issue(&mut self, vtx: Arc<dyn Vertex>) {
        if self.errs.errored() {
            return;
        }
        let vtx_id = vtx.id();
        if self.pending.contains(&vtx_id)
            || self.decided.contains(&vtx_id)
            || self.consensus.vertex_issued(&vtx_id)
        {
            return;
        }
        if self.dropped.contains(&vtx_id) {
            debug!("Issuing previously dropped vertex {} again", vtx_id);
        }

        // A decode failure during admission would leave consensus in an
        // inconsistent state, so it is checked up front and is fatal.
        let txs = match vtx.txs() {
            Ok(txs) => self.canonicalize(txs),
            Err(err) => {
                self.errs.add(err);
                return;
            }
        };

        self.pending.insert(vtx_id);

        let mut issuer = Issuer::new(vtx.clone());
        for parent in vtx.parents() {
            if !self.consensus.vertex_issued(parent) && !self.decided.contains(parent) {
                self.vtx_blocked.register(*parent, vtx_id);
                issuer.register_vertex_dep(*parent);
            }
        }
        // Dependencies carried by this vertex's own payload are satisfied by
        // admitting the vertex itself; waiting on them would never resolve.
        let payload: BTreeSet<TxId> = txs.iter().map(|tx| tx.id()).collect();
        for tx in &txs {
            for dep in tx.dependencies() {
                if !payload.contains(&dep) && !self.consensus.tx_issued(&dep) {
                    self.tx_blocked.register(dep, vtx_id);
                    issuer.register_tx_dep(dep);
                }
            }
        }
        self.issuers.insert(vtx_id, issuer);

        self.update(vtx_id);
    }

    /// Drives the issuance of one pending vertex as far as its dependencies
    /// allow. Idempotent: a vertex is admitted at most once, and a still
    /// blocked vertex is left untouched.
    fn update(&mut self, vtx_id: VertexId) {
        if self.errs.errored() {
            return;
        }
        let Some(issuer) = self.issuers.remove(&vtx_id) else {
            return;
        };
        if issuer.blocked() {
            self.issuers.insert(vtx_id, issuer);
            return;
        }
        self.pending.remove(&vtx_id);
        if self.consensus.vertex_issued(&vtx_id) {
            return;
        }

        let vtx = issuer.vtx();
        let txs = match vtx.txs() {
            Ok(txs) => self.canonicalize(txs),
            Err(err) => {
                self.errs.add(err);
                return;
            }
        };

        let mut valid_txs = Vec::with_capacity(txs.len());
        for tx in &txs {
            match tx.verify() {
                Ok(()) => valid_txs.push(tx.clone()),
                Err(err) => {
                    debug!("Transaction {} failed verification: {}", tx.id(), err);
                    self.known_txs.remove(&tx.id());
                    self.context
                        .metrics
                        .node_metrics
                        .failed_tx_verifications
                        .inc();
                }
            }
        }
        if valid_txs.len() != txs.len() {
            debug!(
                "Dropping vertex {} and rebatching its {} valid transactions",
                vtx_id,
                valid_txs.len()
            );
            self.batch(valid_txs, false, false);
            self.drop_vertex(vtx_id);
            self.abandon_dependents(vtx_id);
            return;
        }

        // The admission cascade below can decide this vertex in the same
        // call, so it must be visible to `process_decided` already.
        self.processing.insert(vtx_id, vtx.clone());
        match self.consensus.add(vtx.clone()) {
            Ok(decisions) => {
                if let Err(err) = self.process_decided(decisions) {
                    self.errs.add(err);
                    return;
                }
            }
            Err(err) => {
                self.errs.add(err);
                return;
            }
        }
        debug!("Vertex {} admitted", vtx_id);

        // The request id advances even when the poll cannot be started, so
        // responses to earlier in-flight polls never alias a new one.
        let k = self.context.parameters.k;
        let sample = self.context.committee.sample(k, &mut self.rng);
        self.request_id += 1;
        let mut polled = false;
        match sample {
            Some(validators) => {
                if self.polls.add(self.request_id, validators.clone()) {
                    self.sender.push_query(
                        validators.into_iter().collect(),
                        self.request_id,
                        vtx_id,
                        vtx.bytes(),
                    );
                    polled = true;
                } else {
                    self.context.metrics.node_metrics.dropped_polls.inc();
                    warn!("Dropped poll for vertex {}", vtx_id);
                }
            }
            None => {
                self.context.metrics.node_metrics.dropped_polls.inc();
                warn!(
                    "Dropped poll for vertex {}: committee too small to sample {} validators",
                    vtx_id, k
                );
            }
        }

        self.fulfill_vtx_waiters(vtx_id);
        for tx in &txs {
            self.fulfill_tx_waiters(tx.id());
        }
        // Repolling only makes progress when polls can actually be started;
        // skipping it here also bounds the chain of empty repoll vertices.
        if polled {
            self.repoll_internal();
        }
    }

    fn abandon(&mut self, vtx_id: VertexId) {
        let was_pending = self.issuers.remove(&vtx_id).is_some();
        self.pending.remove(&vtx_id);
        // Admission wins over a late abandon.
        if self.consensus.vertex_issued(&vtx_id) {
            return;
        }
        if was_pending {
            self.drop_vertex(vtx_id);
        }
        self.abandon_dependents(vtx_id);
    }

    fn drop_vertex(&mut self, vtx_id: VertexId) {
        self.dropped.put(vtx_id, ());
        self.context.metrics.node_metrics.dropped_vertices.inc();
    }

    fn abandon_dependents(&mut self, vtx_id: VertexId) {
        for waiter in self.vtx_blocked.abandon(vtx_id) {
            debug!("Abandoning vertex {} blocked on {}", waiter, vtx_id);
            self.abandon(waiter);
        }
    }

    fn fulfill_vtx_waiters(&mut self, dep: VertexId) {
        for waiter in self.vtx_blocked.fulfill(dep) {
            if let Some(issuer) = self.issuers.get_mut(&waiter) {
                issuer.fulfill_vertex(&dep);
            }
            self.update(waiter);
        }
    }

    fn fulfill_tx_waiters(&mut self, dep: TxId) {
        for waiter in self.tx_blocked.fulfill(dep) {
            if let Some(issuer) = self.issuers.get_mut(&waiter) {
                issuer.fulfill_tx(&dep);
            }
            self.update(waiter);
        }
    }

    /// Finalizes the vertices consensus just decided. Acceptance persists the
    /// vertex before being visible anywhere else.
    fn process_decided(&mut self, decisions: Decisions) -> ConsensusResult<()> {
        for vtx_id in decisions.accepted {
            let Some(vtx) = self.processing.remove(&vtx_id) else {
                return Err(ConsensusError::VertexNotProcessing(vtx_id));
            };
            self.store
                .save_vertex(vtx.as_ref())
                .map_err(|err| ConsensusError::SaveVertexFailed(vtx_id, err))?;
            self.decided.put(vtx_id, ());
            self.dropped.pop(&vtx_id);
            self.context.metrics.node_metrics.accepted_vertices.inc();
            info!("Vertex {} accepted", vtx_id);
        }
        for vtx_id in decisions.rejected {
            let Some(_vtx) = self.processing.remove(&vtx_id) else {
                return Err(ConsensusError::VertexNotProcessing(vtx_id));
            };
            self.decided.put(vtx_id, ());
            self.dropped.pop(&vtx_id);
            self.context.metrics.node_metrics.rejected_vertices.inc();
            info!("Vertex {} rejected", vtx_id);
        }
        Ok(())
    }

    /// Splits `txs` into vertices, flushing a batch whenever it is full or
    /// the next transaction conflicts with one already in it. With `empty`
    /// set a vertex is issued even when no transaction survived filtering.
    fn batch(&mut self, txs: Vec<Arc<dyn Tx>>, force: bool, empty: bool) {
        let batch_size = self.context.parameters.batch_size;
        let mut batch: Vec<Arc<dyn Tx>> = Vec::new();
        let mut consumed: BTreeSet<InputId> = BTreeSet::new();

        for tx in txs {
            if !force && self.consensus.tx_issued(&tx.id()) {
                debug!("Skipping issuance of duplicate transaction {}", tx.id());
                continue;
            }
            let inputs = tx.inputs();
            let overlaps = inputs.iter().any(|input| consumed.contains(input));
            if batch.len() >= batch_size || overlaps {
                self.issue_batch(mem::take(&mut batch));
                consumed.clear();
            }
            consumed.extend(inputs);
            batch.push(tx);
        }

        if !batch.is_empty() || empty {
            self.issue_batch(batch);
        }
    }

    fn issue_batch(&mut self, txs: Vec<Arc<dyn Tx>>) {
        let parents = self.consensus.preferences();
        match self.builder.build_vertex(parents, txs) {
            Ok(vtx) => self.issue(vtx),
            Err(err) => self.errs.add(err),
        }
    }

    fn repoll_internal(&mut self) {
        // Repolling exists to push undecided vertices over their confidence
        // thresholds; with nothing undecided it would only mint an unbounded
        // stream of empty vertices over the accepted frontier.
        if self.consensus.finalized() {
            return;
        }
        if self.polls.len() >= self.context.parameters.concurrent_repolls {
            return;
        }
        self.batch(Vec::new(), false, true);
    }

    /// Substitutes each transaction with the canonical instance of its id,
    /// so status transitions are observed by every vertex carrying it.
    fn canonicalize(&mut self, txs: Vec<Arc<dyn Tx>>) -> Vec<Arc<dyn Tx>> {
        txs.into_iter()
            .map(|tx| {
                self.known_txs
                    .entry(tx.id())
                    .or_insert_with(|| tx.clone())
                    .clone()
            })
            .collect()
    }

    fn update_stats(&mut self) {
        let metrics = &self.context.metrics.node_metrics;
        metrics.blocked_vertices.set(self.pending.len() as i64);
        metrics
            .processing_vertices
            .set(self.processing.len() as i64);
    }

    fn flush_errors(&mut self) -> ConsensusResult<()> {
        match self.errs.error() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    fn request_id(&self) -> u64 {
        self.request_id
    }

    #[cfg(test)]
    fn num_pending(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    fn is_processing(&self, vtx_id: &VertexId) -> bool {
        self.processing.contains_key(vtx_id)
    }
}

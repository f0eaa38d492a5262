// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use bytes::Bytes;
use prometheus::IntCounter;
use tracing::{debug, warn};

use crate::{
    blocker::Blocker,
    context::Context,
    error::{ConsensusError, ConsensusResult},
    transaction::{Tx, TxId},
    vertex::Status,
};

/// Looks up transactions by id in the local index during bootstrap.
pub trait TxProvider: Send + Sync {
    fn get_tx(&self, id: &TxId) -> Option<Arc<dyn Tx>>;
}

/// Decodes raw transaction bytes fetched during bootstrap.
pub trait TxParser: Send + Sync {
    fn parse_tx(&self, bytes: &[u8]) -> ConsensusResult<Arc<dyn Tx>>;
}

/// A unit of bootstrap replay work.
pub trait Job: Send + Sync {
    fn id(&self) -> TxId;

    /// Dependencies that are not known to be accepted yet. A dependency that
    /// cannot be found locally counts as missing.
    fn missing_dependencies(&self) -> BTreeSet<TxId>;

    /// Runs the job. Must only be called once no dependency is missing.
    fn execute(&self) -> ConsensusResult<()>;

    /// The raw encoded payload, for persisting unfinished jobs.
    fn bytes(&self) -> Bytes;
}

/// Replays one transaction fetched during bootstrap.
pub struct TxJob {
    provider: Arc<dyn TxProvider>,
    num_accepted: IntCounter,
    num_dropped: IntCounter,
    tx: Arc<dyn Tx>,
}

impl TxJob {
    pub fn new(
        provider: Arc<dyn TxProvider>,
        num_accepted: IntCounter,
        num_dropped: IntCounter,
        tx: Arc<dyn Tx>,
    ) -> Self {
        Self {
            provider,
            num_accepted,
            num_dropped,
            tx,
        }
    }
}

impl Job for TxJob {
    fn id(&self) -> TxId {
        self.tx.id()
    }

    fn missing_dependencies(&self) -> BTreeSet<TxId> {
        let mut missing = BTreeSet::new();
        for dep in self.tx.dependencies() {
            match self.provider.get_tx(&dep) {
                Some(tx) if tx.status() == Status::Accepted => {}
                _ => {
                    missing.insert(dep);
                }
            }
        }
        missing
    }

    fn execute(&self) -> ConsensusResult<()> {
        let id = self.tx.id();
        if !self.missing_dependencies().is_empty() {
            self.num_dropped.inc();
            return Err(ConsensusError::MissingDependencies(id));
        }
        match self.tx.status() {
            Status::Unknown | Status::Rejected => {
                self.num_dropped.inc();
                Err(ConsensusError::UnexpectedTxStatus(id, self.tx.status()))
            }
            Status::Processing => {
                // The network agreed on this transaction during the period
                // this validator was offline, so a local verification failure
                // must not stop the replay.
                if let Err(err) = self.tx.verify() {
                    debug!("Transaction {} failed verification during bootstrap: {}", id, err);
                }
                self.num_accepted.inc();
                self.tx
                    .accept()
                    .map_err(|err| ConsensusError::TxAcceptFailed(id, err.to_string()))
            }
            Status::Accepted => Ok(()),
        }
    }

    fn bytes(&self) -> Bytes {
        self.tx.bytes()
    }
}

/// Builds [`TxJob`]s out of raw fetched bytes.
pub struct TxJobParser {
    provider: Arc<dyn TxProvider>,
    parser: Arc<dyn TxParser>,
    num_accepted: IntCounter,
    num_dropped: IntCounter,
}

impl TxJobParser {
    pub fn new(
        context: &Context,
        provider: Arc<dyn TxProvider>,
        parser: Arc<dyn TxParser>,
    ) -> Self {
        Self {
            provider,
            parser,
            num_accepted: context.metrics.node_metrics.bootstrap_accepted_txs.clone(),
            num_dropped: context.metrics.node_metrics.bootstrap_dropped_txs.clone(),
        }
    }

    pub fn parse(&self, bytes: &[u8]) -> ConsensusResult<Box<dyn Job>> {
        let tx = self.parser.parse_tx(bytes)?;
        Ok(Box::new(TxJob::new(
            self.provider.clone(),
            self.num_accepted.clone(),
            self.num_dropped.clone(),
            tx,
        )))
    }
}

/// Executes bootstrap jobs in dependency order.
///
/// A pushed job runs immediately when nothing it depends on is missing, and
/// is parked otherwise. Completion of a dependency re-evaluates its waiters;
/// a job that still cannot run once all its blockers have resolved drops
/// itself through its own `execute`.
pub struct JobQueue {
    jobs: BTreeMap<TxId, Box<dyn Job>>,
    /// Outstanding blockers per parked job.
    deps: BTreeMap<TxId, BTreeSet<TxId>>,
    blocked: Blocker<TxId, TxId>,
    executed: BTreeSet<TxId>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            deps: BTreeMap::new(),
            blocked: Blocker::new(),
            executed: BTreeSet::new(),
        }
    }

    pub fn push(&mut self, job: Box<dyn Job>) {
        let id = job.id();
        if self.executed.contains(&id) || self.jobs.contains_key(&id) {
            return;
        }
        let missing = job.missing_dependencies();
        if missing.is_empty() {
            self.run(id, job);
            return;
        }
        for dep in &missing {
            self.blocked.register(*dep, id);
        }
        self.deps.insert(id, missing);
        self.jobs.insert(id, job);
    }

    /// Number of jobs parked on unresolved dependencies.
    pub fn num_blocked(&self) -> usize {
        self.jobs.len()
    }

    fn run(&mut self, id: TxId, job: Box<dyn Job>) {
        let mut worklist = vec![(id, job)];
        while let Some((id, job)) = worklist.pop() {
            match job.execute() {
                Ok(()) => {
                    self.executed.insert(id);
                }
                Err(err) => warn!("Dropping bootstrap job {}: {}", id, err),
            }
            for waiter in self.blocked.fulfill(id) {
                let remaining = self
                    .deps
                    .get_mut(&waiter)
                    .expect("Parked jobs track their blockers");
                remaining.remove(&id);
                if !remaining.is_empty() {
                    continue;
                }
                self.deps.remove(&waiter);
                let waiting_job = self
                    .jobs
                    .remove(&waiter)
                    .expect("Parked jobs stay in the queue");
                worklist.push((waiter, waiting_job));
            }
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

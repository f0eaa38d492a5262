// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snowdag_config::AuthorityIndex;

use crate::{
    bootstrap::TxProvider,
    error::{ConsensusError, ConsensusResult},
    poll::QuerySender,
    transaction::{InputId, Tx, TxId},
    vertex::{Status, Vertex, VertexBuilder, VertexId, VertexParser},
};

/// Wire form of a test transaction, so vertices survive an encode/parse trip.
#[derive(Serialize, Deserialize)]
struct TestTxWire {
    id: TxId,
    dependencies: Vec<TxId>,
    inputs: Vec<InputId>,
}

#[derive(Serialize, Deserialize)]
struct TestVertexWire {
    id: VertexId,
    parents: Vec<VertexId>,
    txs: Vec<TestTxWire>,
}

/// A scriptable transaction. Construction is builder style:
/// `TestTransaction::new(1).with_inputs(...).build()`.
pub(crate) struct TestTransaction {
    id: TxId,
    dependencies: Vec<TxId>,
    inputs: Vec<InputId>,
    verify_error: Option<String>,
    accept_error: Option<String>,
    status: Mutex<Status>,
    bytes: Bytes,
}

impl TestTransaction {
    pub(crate) fn new(seed: u8) -> Self {
        Self {
            id: TxId::new([seed; 32]),
            dependencies: vec![],
            inputs: vec![],
            verify_error: None,
            accept_error: None,
            status: Mutex::new(Status::Processing),
            bytes: Bytes::new(),
        }
    }

    pub(crate) fn with_dependencies(mut self, dependencies: Vec<TxId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub(crate) fn with_inputs(mut self, inputs: Vec<InputId>) -> Self {
        self.inputs = inputs;
        self
    }

    pub(crate) fn with_verify_error(mut self, message: &str) -> Self {
        self.verify_error = Some(message.to_string());
        self
    }

    pub(crate) fn with_accept_error(mut self, message: &str) -> Self {
        self.accept_error = Some(message.to_string());
        self
    }

    pub(crate) fn with_status(self, status: Status) -> Self {
        *self.status.lock() = status;
        self
    }

    pub(crate) fn build(mut self) -> Arc<TestTransaction> {
        let wire = TestTxWire {
            id: self.id,
            dependencies: self.dependencies.clone(),
            inputs: self.inputs.clone(),
        };
        self.bytes = Bytes::from(bcs::to_bytes(&wire).expect("Serialization should not fail"));
        Arc::new(self)
    }

    fn from_wire(wire: TestTxWire) -> Arc<TestTransaction> {
        TestTransaction {
            id: wire.id,
            dependencies: wire.dependencies,
            inputs: wire.inputs,
            verify_error: None,
            accept_error: None,
            status: Mutex::new(Status::Processing),
            bytes: Bytes::new(),
        }
        .build()
    }
}

impl Tx for TestTransaction {
    fn id(&self) -> TxId {
        self.id
    }

    fn dependencies(&self) -> Vec<TxId> {
        self.dependencies.clone()
    }

    fn inputs(&self) -> Vec<InputId> {
        self.inputs.clone()
    }

    fn verify(&self) -> ConsensusResult<()> {
        match &self.verify_error {
            Some(message) => Err(ConsensusError::InvalidTransaction(
                self.id,
                message.clone(),
            )),
            None => Ok(()),
        }
    }

    fn accept(&self) -> ConsensusResult<()> {
        if let Some(message) = &self.accept_error {
            return Err(ConsensusError::TxAcceptFailed(self.id, message.clone()));
        }
        *self.status.lock() = Status::Accepted;
        Ok(())
    }

    fn reject(&self) -> ConsensusResult<()> {
        *self.status.lock() = Status::Rejected;
        Ok(())
    }

    fn status(&self) -> Status {
        *self.status.lock()
    }

    fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

/// A vertex with explicit id, parents and transactions.
pub(crate) struct TestVertex {
    id: VertexId,
    parents: Vec<VertexId>,
    txs: Vec<Arc<dyn Tx>>,
    txs_error: bool,
    bytes: Bytes,
}

impl TestVertex {
    pub(crate) fn new(seed: u8) -> Self {
        Self {
            id: VertexId::new([seed; 32]),
            parents: vec![],
            txs: vec![],
            txs_error: false,
            bytes: Bytes::new(),
        }
    }

    pub(crate) fn with_parents(mut self, parents: Vec<VertexId>) -> Self {
        self.parents = parents;
        self
    }

    pub(crate) fn with_txs(mut self, txs: Vec<Arc<TestTransaction>>) -> Self {
        self.txs = txs.into_iter().map(|tx| tx as Arc<dyn Tx>).collect();
        self
    }

    /// Makes `txs()` fail as if the payload could not be decoded.
    pub(crate) fn with_txs_error(mut self) -> Self {
        self.txs_error = true;
        self
    }

    pub(crate) fn build(mut self) -> Arc<TestVertex> {
        let wire = TestVertexWire {
            id: self.id,
            parents: self.parents.clone(),
            txs: self
                .txs
                .iter()
                .map(|tx| TestTxWire {
                    id: tx.id(),
                    dependencies: tx.dependencies(),
                    inputs: tx.inputs(),
                })
                .collect(),
        };
        self.bytes = Bytes::from(bcs::to_bytes(&wire).expect("Serialization should not fail"));
        Arc::new(self)
    }
}

impl Vertex for TestVertex {
    fn id(&self) -> VertexId {
        self.id
    }

    fn parents(&self) -> &[VertexId] {
        &self.parents
    }

    fn txs(&self) -> ConsensusResult<Vec<Arc<dyn Tx>>> {
        if self.txs_error {
            return Err(ConsensusError::MalformedVertex(bcs::Error::Eof));
        }
        Ok(self.txs.clone())
    }

    fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

/// Builds vertices with ids derived deterministically from contents, so
/// issuing the same parents and transactions twice produces the same vertex.
pub(crate) struct TestVertexBuilder;

impl VertexBuilder for TestVertexBuilder {
    fn build_vertex(
        &self,
        parents: Vec<VertexId>,
        txs: Vec<Arc<dyn Tx>>,
    ) -> ConsensusResult<Arc<dyn Vertex>> {
        let encoded = bcs::to_bytes(&(
            &parents,
            txs.iter().map(|tx| tx.id()).collect::<Vec<_>>(),
        ))
        .map_err(|err| ConsensusError::BuildVertexFailed(err.to_string()))?;
        let mut digest = [0u8; 32];
        for (i, byte) in encoded.iter().enumerate() {
            digest[i % 32] = digest[i % 32].wrapping_add(*byte);
        }
        let vertex = TestVertex {
            id: VertexId::new(digest),
            parents,
            txs,
            txs_error: false,
            bytes: Bytes::new(),
        }
        .build();
        Ok(vertex)
    }
}

/// Decodes the bcs wire form written by [`TestVertex::build`].
pub(crate) struct TestParser;

impl VertexParser for TestParser {
    fn parse_vertex(&self, bytes: &[u8]) -> ConsensusResult<Arc<dyn Vertex>> {
        let wire: TestVertexWire =
            bcs::from_bytes(bytes).map_err(ConsensusError::MalformedVertex)?;
        let txs = wire
            .txs
            .into_iter()
            .map(|tx| TestTransaction::from_wire(tx) as Arc<dyn Tx>)
            .collect();
        let vertex = TestVertex {
            id: wire.id,
            parents: wire.parents,
            txs,
            txs_error: false,
            bytes: Bytes::copy_from_slice(bytes),
        }
        .build();
        Ok(vertex)
    }
}

#[derive(Clone)]
pub(crate) struct PushQuery {
    pub validators: BTreeSet<AuthorityIndex>,
    pub request_id: u64,
    pub vertex_id: VertexId,
    pub vertex_bytes: Bytes,
}

/// Captures outgoing push queries for inspection.
pub(crate) struct RecordingSender {
    queries: Mutex<Vec<PushQuery>>,
}

impl RecordingSender {
    pub(crate) fn new() -> Self {
        Self {
            queries: Mutex::new(vec![]),
        }
    }

    pub(crate) fn queries(&self) -> Vec<PushQuery> {
        self.queries.lock().clone()
    }
}

impl QuerySender for RecordingSender {
    fn push_query(
        &self,
        validators: BTreeSet<AuthorityIndex>,
        request_id: u64,
        vertex_id: VertexId,
        vertex_bytes: Bytes,
    ) {
        self.queries.lock().push(PushQuery {
            validators,
            request_id,
            vertex_id,
            vertex_bytes,
        });
    }
}

/// Backing transaction index for bootstrap jobs.
pub(crate) struct TestTxProvider {
    txs: Mutex<BTreeMap<TxId, Arc<dyn Tx>>>,
}

impl TestTxProvider {
    pub(crate) fn new() -> Self {
        Self {
            txs: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn insert(&self, tx: Arc<dyn Tx>) {
        self.txs.lock().insert(tx.id(), tx);
    }
}

impl TxProvider for TestTxProvider {
    fn get_tx(&self, id: &TxId) -> Option<Arc<dyn Tx>> {
        self.txs.lock().get(id).cloned()
    }
}

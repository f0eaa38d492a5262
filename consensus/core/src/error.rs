// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::{
    transaction::TxId,
    vertex::{Status, VertexId},
};

/// Errors that can occur while admitting vertices, deciding transactions or
/// replaying bootstrap jobs.
#[derive(Clone, Debug, Error)]
pub enum ConsensusError {
    #[error("Error deserializing vertex: {0}")]
    MalformedVertex(bcs::Error),

    #[error("Error deserializing transaction: {0}")]
    MalformedTransaction(bcs::Error),

    #[error("Transaction {0} is already being tracked")]
    DuplicateTransaction(TxId),

    #[error("Transaction {0} failed verification: {1}")]
    InvalidTransaction(TxId, String),

    #[error("Couldn't find accepted vertex {0} in the processing set. Vertex not saved to the VM's database")]
    VertexNotProcessing(VertexId),

    #[error("Couldn't save vertex {0} to the VM's database: {1}")]
    SaveVertexFailed(VertexId, String),

    #[error("Failed to build vertex: {0}")]
    BuildVertexFailed(String),

    #[error("Failed to accept transaction {0}: {1}")]
    TxAcceptFailed(TxId, String),

    #[error("Failed to reject transaction {0}: {1}")]
    TxRejectFailed(TxId, String),

    #[error("Couldn't accept transaction {0} because it has missing dependencies")]
    MissingDependencies(TxId),

    #[error("Attempting to execute transaction {0} with status {1}")]
    UnexpectedTxStatus(TxId, Status),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Sticky accumulator for engine-fatal errors. Once an error is recorded,
/// every state-machine entry point short-circuits until the operator
/// inspects and restarts the engine.
#[derive(Default)]
pub(crate) struct ErrorSink {
    error: Option<ConsensusError>,
}

impl ErrorSink {
    pub(crate) fn add(&mut self, error: ConsensusError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub(crate) fn errored(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn error(&self) -> Option<&ConsensusError> {
        self.error.as_ref()
    }
}

// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

/// Consensus modules.
mod blocker;
mod bootstrap;
mod conflict_set;
mod consensus;
mod context;
mod engine;
mod error;
mod issuer;
mod metrics;
mod poll;
pub mod storage;
mod transaction;
mod vertex;

/// Consensus test utilities.
#[cfg(test)]
mod test_fixtures;

/// Exported Consensus API.
pub use consensus::{Consensus, DagConsensus, Decisions};
pub use context::Context;
pub use engine::Engine;
pub use error::{ConsensusError, ConsensusResult};
pub use metrics::Metrics;
pub use poll::QuerySender;
pub use transaction::{InputId, Tx, TxId};
pub use vertex::{Status, Vertex, VertexBuilder, VertexId, VertexParser};

/// Exported bootstrap API.
pub use bootstrap::{Job, JobQueue, TxJob, TxJobParser, TxParser, TxProvider};
pub use storage::{mem_store::MemStore, VertexStore};

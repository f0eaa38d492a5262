// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snowdag_config::DIGEST_LENGTH;

use crate::{error::ConsensusResult, transaction::Tx};

/// A vertex bundles transactions and references to the parent vertices the
/// issuing validator preferred at proposal time.
///
/// The concrete representation is owned by the VM layer; consensus only needs
/// identifiers, causal references and the raw encoded payload to gossip.
pub trait Vertex: Send + Sync {
    fn id(&self) -> VertexId;

    /// Parent vertex references, in the order they were encoded.
    fn parents(&self) -> &[VertexId];

    /// Decodes the transactions carried by this vertex. Decode failure inside
    /// admission is engine-fatal.
    fn txs(&self) -> ConsensusResult<Vec<Arc<dyn Tx>>>;

    /// The raw encoded vertex, as gossiped in push queries.
    fn bytes(&self) -> Bytes;
}

/// Decodes raw vertex bytes received from the network.
pub trait VertexParser: Send + Sync {
    fn parse_vertex(&self, bytes: &[u8]) -> ConsensusResult<Arc<dyn Vertex>>;
}

/// Assembles a new candidate vertex over the given parents. Used both for
/// fresh batches and for re-batching valid transactions out of a vertex that
/// failed verification.
pub trait VertexBuilder: Send + Sync {
    fn build_vertex(
        &self,
        parents: Vec<VertexId>,
        txs: Vec<Arc<dyn Tx>>,
    ) -> ConsensusResult<Arc<dyn Vertex>>;
}

/// Uniquely identifies a vertex. Computed by the VM layer over the encoded
/// vertex; opaque to consensus.
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VertexId([u8; DIGEST_LENGTH]);

impl VertexId {
    pub const fn new(digest: [u8; DIGEST_LENGTH]) -> Self {
        Self(digest)
    }
}

impl Hash for VertexId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.0[..8]);
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V({})",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.0[..8])
        )
    }
}

/// Status of a vertex or transaction as seen by this validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Known and being voted on, not yet decided.
    Processing,
    /// Permanently accepted.
    Accepted,
    /// Permanently rejected.
    Rejected,
    /// Not known to this validator.
    Unknown,
}

impl Status {
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Processing => write!(f, "Processing"),
            Status::Accepted => write!(f, "Accepted"),
            Status::Rejected => write!(f, "Rejected"),
            Status::Unknown => write!(f, "Unknown"),
        }
    }
}

// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snowdag_config::DIGEST_LENGTH;

use crate::{error::ConsensusResult, vertex::Status};

/// A transaction carried by a vertex. Shared by reference between the vertex
/// and the conflict tracking layer; only the single engine event path mutates
/// its status, through `accept`/`reject`.
pub trait Tx: Send + Sync {
    fn id(&self) -> TxId;

    /// Transactions that must be decided before this one can be voted on.
    fn dependencies(&self) -> Vec<TxId>;

    /// Identifiers of the state this transaction consumes. Two processing
    /// transactions conflict iff their input sets overlap.
    fn inputs(&self) -> Vec<InputId>;

    /// Checks the transaction is well formed and currently valid. Failure is
    /// local to the transaction, never engine-fatal.
    fn verify(&self) -> ConsensusResult<()>;

    /// Finalizes the transaction. May fail, which is engine-fatal outside of
    /// bootstrap.
    fn accept(&self) -> ConsensusResult<()>;

    /// Permanently rejects the transaction.
    fn reject(&self) -> ConsensusResult<()>;

    fn status(&self) -> Status;

    /// The raw encoded transaction.
    fn bytes(&self) -> Bytes;
}

/// Uniquely identifies a transaction.
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxId([u8; DIGEST_LENGTH]);

impl TxId {
    pub const fn new(digest: [u8; DIGEST_LENGTH]) -> Self {
        Self(digest)
    }
}

impl Hash for TxId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.0[..8]);
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T({})",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.0[..8])
        )
    }
}

/// Identifies a piece of state consumed by a transaction.
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputId([u8; DIGEST_LENGTH]);

impl InputId {
    pub const fn new(digest: [u8; DIGEST_LENGTH]) -> Self {
        Self(digest)
    }
}

impl fmt::Debug for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "I({})",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.0[..8])
        )
    }
}

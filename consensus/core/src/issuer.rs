// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    transaction::TxId,
    vertex::{Vertex, VertexId},
};

/// Tracks the unmet dependencies of one candidate vertex.
///
/// An issuer is created when the vertex enters the pending set and lives in
/// the engine's issuer map until the vertex is admitted or abandoned. The
/// engine notifies it as dependencies resolve; once both dependency sets are
/// empty the engine admits the vertex.
pub(crate) struct Issuer {
    vtx: Arc<dyn Vertex>,
    /// Parent vertices not yet admitted.
    vtx_deps: BTreeSet<VertexId>,
    /// Transactions referenced by the vertex's payload that are not yet
    /// tracked by consensus.
    tx_deps: BTreeSet<TxId>,
}

impl Issuer {
    pub(crate) fn new(vtx: Arc<dyn Vertex>) -> Self {
        Self {
            vtx,
            vtx_deps: BTreeSet::new(),
            tx_deps: BTreeSet::new(),
        }
    }

    pub(crate) fn vtx(&self) -> Arc<dyn Vertex> {
        self.vtx.clone()
    }

    pub(crate) fn register_vertex_dep(&mut self, dep: VertexId) {
        self.vtx_deps.insert(dep);
    }

    pub(crate) fn register_tx_dep(&mut self, dep: TxId) {
        self.tx_deps.insert(dep);
    }

    /// A parent vertex has been admitted.
    pub(crate) fn fulfill_vertex(&mut self, dep: &VertexId) {
        self.vtx_deps.remove(dep);
    }

    /// A payload transaction dependency is now tracked by consensus.
    pub(crate) fn fulfill_tx(&mut self, dep: &TxId) {
        self.tx_deps.remove(dep);
    }

    /// Whether any dependency is still outstanding.
    pub(crate) fn blocked(&self) -> bool {
        !self.vtx_deps.is_empty() || !self.tx_deps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::TestVertex;

    #[test]
    fn blocked_until_all_dependencies_resolve() {
        let vtx = TestVertex::new(1).build();
        let mut issuer = Issuer::new(vtx);
        assert!(!issuer.blocked());

        let parent = VertexId::new([2; 32]);
        let dep_tx = TxId::new([3; 32]);
        issuer.register_vertex_dep(parent);
        issuer.register_tx_dep(dep_tx);
        assert!(issuer.blocked());

        issuer.fulfill_vertex(&parent);
        assert!(issuer.blocked());

        issuer.fulfill_tx(&dep_tx);
        assert!(!issuer.blocked());
    }

    #[test]
    fn fulfilling_an_unknown_dependency_is_harmless() {
        let vtx = TestVertex::new(1).build();
        let mut issuer = Issuer::new(vtx);
        issuer.register_vertex_dep(VertexId::new([2; 32]));

        issuer.fulfill_vertex(&VertexId::new([9; 32]));
        issuer.fulfill_tx(&TxId::new([9; 32]));
        assert!(issuer.blocked());
    }
}

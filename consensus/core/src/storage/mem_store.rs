// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::{
    storage::VertexStore,
    vertex::{Vertex, VertexId},
};

/// In-memory implementation of [`VertexStore`], for testing.
pub struct MemStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    vertices: BTreeMap<VertexId, Bytes>,
    /// Times each vertex id has been saved.
    save_counts: BTreeMap<VertexId, usize>,
    fail_saving: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Makes every subsequent save fail, to exercise fatal error paths.
    pub fn fail_saving(&self) {
        self.inner.write().fail_saving = true;
    }

    pub fn contains(&self, id: &VertexId) -> bool {
        self.inner.read().vertices.contains_key(id)
    }

    pub fn save_count(&self, id: &VertexId) -> usize {
        self.inner
            .read()
            .save_counts
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.read().vertices.len()
    }
}

impl VertexStore for MemStore {
    fn save_vertex(&self, vertex: &dyn Vertex) -> Result<(), String> {
        let mut inner = self.inner.write();
        if inner.fail_saving {
            return Err("injected save failure".to_string());
        }
        let id = vertex.id();
        inner.vertices.insert(id, vertex.bytes());
        *inner.save_counts.entry(id).or_insert(0) += 1;
        Ok(())
    }
}

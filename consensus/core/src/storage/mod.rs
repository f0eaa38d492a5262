// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod mem_store;

use crate::vertex::Vertex;

/// Durably persists accepted vertices.
///
/// `save_vertex` is called exactly once per accepted vertex, before the
/// acceptance is reported to callers. A save failure is engine-fatal.
pub trait VertexStore: Send + Sync {
    fn save_vertex(&self, vertex: &dyn Vertex) -> Result<(), String>;
}

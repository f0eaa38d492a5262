// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};

/// Metrics of this consensus instance.
pub struct Metrics {
    pub(crate) node_metrics: NodeMetrics,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Arc<Self> {
        Arc::new(Self {
            node_metrics: NodeMetrics::new(registry),
        })
    }
}

pub(crate) struct NodeMetrics {
    /// Vertices waiting on unmet dependencies before they can be issued.
    pub blocked_vertices: IntGauge,
    /// Vertices admitted to consensus but not yet decided.
    pub processing_vertices: IntGauge,
    /// Vertices decided as accepted over the lifetime of the engine.
    pub accepted_vertices: IntCounter,
    /// Vertices decided as rejected over the lifetime of the engine.
    pub rejected_vertices: IntCounter,
    /// Vertices abandoned before admission.
    pub dropped_vertices: IntCounter,
    /// Polls skipped because too few validators could be sampled.
    pub dropped_polls: IntCounter,
    /// Transactions dropped during admission because verification failed.
    pub failed_tx_verifications: IntCounter,
    /// Transactions accepted while replaying bootstrap jobs.
    pub bootstrap_accepted_txs: IntCounter,
    /// Bootstrap jobs dropped due to missing dependencies or a bad status.
    pub bootstrap_dropped_txs: IntCounter,
}

impl NodeMetrics {
    pub(crate) fn new(registry: &Registry) -> Self {
        Self {
            blocked_vertices: register_int_gauge_with_registry!(
                "blocked_vertices",
                "Vertices waiting on unmet dependencies before they can be issued",
                registry
            )
            .unwrap(),
            processing_vertices: register_int_gauge_with_registry!(
                "processing_vertices",
                "Vertices admitted to consensus but not yet decided",
                registry
            )
            .unwrap(),
            accepted_vertices: register_int_counter_with_registry!(
                "accepted_vertices",
                "Vertices decided as accepted over the lifetime of the engine",
                registry
            )
            .unwrap(),
            rejected_vertices: register_int_counter_with_registry!(
                "rejected_vertices",
                "Vertices decided as rejected over the lifetime of the engine",
                registry
            )
            .unwrap(),
            dropped_vertices: register_int_counter_with_registry!(
                "dropped_vertices",
                "Vertices abandoned before admission",
                registry
            )
            .unwrap(),
            dropped_polls: register_int_counter_with_registry!(
                "dropped_polls",
                "Polls skipped because too few validators could be sampled",
                registry
            )
            .unwrap(),
            failed_tx_verifications: register_int_counter_with_registry!(
                "failed_tx_verifications",
                "Transactions dropped during admission because verification failed",
                registry
            )
            .unwrap(),
            bootstrap_accepted_txs: register_int_counter_with_registry!(
                "bootstrap_accepted_txs",
                "Transactions accepted while replaying bootstrap jobs",
                registry
            )
            .unwrap(),
            bootstrap_dropped_txs: register_int_counter_with_registry!(
                "bootstrap_dropped_txs",
                "Bootstrap jobs dropped due to missing dependencies or a bad status",
                registry
            )
            .unwrap(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_metrics() -> Arc<Metrics> {
    Metrics::new(&Registry::new())
}

// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use snowdag_config::{AuthorityIndex, Committee, Parameters};

use crate::metrics::Metrics;

#[cfg(test)]
use crate::metrics::test_metrics;

/// Context contains the configuration and metrics shared by all components of
/// this validator's consensus instance.
pub struct Context {
    /// Index of this validator in the committee.
    pub own_index: AuthorityIndex,
    /// Committee of the current epoch.
    pub committee: Committee,
    /// Parameters of this consensus instance.
    pub parameters: Parameters,
    /// Metrics of this consensus instance.
    pub metrics: Arc<Metrics>,
}

impl Context {
    pub fn new(
        own_index: AuthorityIndex,
        committee: Committee,
        parameters: Parameters,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            own_index,
            committee,
            parameters,
            metrics,
        }
    }

    /// Create a test context with a committee of given size and even stake.
    #[cfg(test)]
    pub(crate) fn new_for_test(committee_size: usize) -> Self {
        let committee = Committee::new_for_test(0, vec![1; committee_size]);
        Context::new(
            AuthorityIndex::new_for_test(0),
            committee,
            Parameters::default(),
            test_metrics(),
        )
    }

    #[cfg(test)]
    pub(crate) fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

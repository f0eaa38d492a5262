// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

/// A registry of waiters blocked on dependencies. `D` is the dependency
/// identifier type and `W` the key of the waiter blocked on it.
///
/// The blocker only records who is waiting on what; the engine delivers the
/// actual fulfill/abandon/update notifications to the waiters returned here,
/// all before the draining call returns to its caller. Waiters whose
/// dependency set becomes empty drive their own transition, so delivery must
/// be idempotent on their side.
pub(crate) struct Blocker<D, W> {
    waiting: BTreeMap<D, BTreeSet<W>>,
}

impl<D: Ord + Copy, W: Ord + Copy> Blocker<D, W> {
    pub(crate) fn new() -> Self {
        Self {
            waiting: BTreeMap::new(),
        }
    }

    /// Records that `waiter` is blocked on `dependency`.
    pub(crate) fn register(&mut self, dependency: D, waiter: W) {
        self.waiting.entry(dependency).or_default().insert(waiter);
    }

    /// The dependency has been satisfied. Drains and returns every waiter
    /// registered on it, in no particular order.
    pub(crate) fn fulfill(&mut self, dependency: D) -> Vec<W> {
        self.drain(dependency)
    }

    /// The dependency will never be satisfied. Drains and returns every
    /// waiter registered on it so the caller can propagate the failure.
    pub(crate) fn abandon(&mut self, dependency: D) -> Vec<W> {
        self.drain(dependency)
    }

    fn drain(&mut self, dependency: D) -> Vec<W> {
        self.waiting
            .remove(&dependency)
            .map(|waiters| waiters.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of dependencies with at least one registered waiter.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiting.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

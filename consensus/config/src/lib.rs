// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod committee;
mod parameters;

pub use committee::*;
pub use parameters::*;

/// Length of the opaque digests (vertex, transaction and input identifiers)
/// handled by the engine. The VM layer computes them; consensus never hashes.
pub const DIGEST_LENGTH: usize = 32;

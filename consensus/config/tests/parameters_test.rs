// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use snowdag_config::Parameters;

#[test]
fn parameters_defaults_are_consistent() {
    let parameters = Parameters::default();

    assert!(parameters.alpha > parameters.k / 2);
    assert!(parameters.alpha <= parameters.k);
    assert!(parameters.beta_virtuous <= parameters.beta_rogue);
    assert!(parameters.batch_size > 0);
    assert!(parameters.concurrent_repolls > 0);
}

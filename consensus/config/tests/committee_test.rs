// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use rand::{rngs::StdRng, SeedableRng as _};
use snowdag_config::Committee;

#[test]
fn committee_basics() {
    let committee = Committee::new_for_test(100, vec![1, 2, 3, 4]);

    assert_eq!(committee.epoch(), 100);
    assert_eq!(committee.size(), 4);
    assert_eq!(committee.total_stake(), 10);

    for (index, authority) in committee.authorities() {
        assert_eq!(committee.stake(index), authority.stake);
        assert!(committee.exists(index));
    }

    assert_eq!(committee.to_authority_index(3).unwrap().value(), 3);
    assert!(committee.to_authority_index(4).is_none());
}

#[test]
fn sample_returns_distinct_validators() {
    let committee = Committee::new_for_test(0, vec![5; 10]);
    let mut rng = StdRng::from_seed([9; 32]);

    for _ in 0..100 {
        let sampled = committee.sample(7, &mut rng).unwrap();
        assert_eq!(sampled.len(), 7);
        let unique = sampled.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), 7);
    }
}

#[test]
fn sample_fails_on_small_committee() {
    let committee = Committee::new_for_test(0, vec![1, 1, 1]);
    let mut rng = StdRng::from_seed([9; 32]);

    assert!(committee.sample(4, &mut rng).is_none());
    assert_eq!(committee.sample(3, &mut rng).unwrap().len(), 3);
}

#[test]
fn sample_favors_stake() {
    // One authority holds almost all the stake; it must appear in every
    // single-validator sample often enough to dominate.
    let committee = Committee::new_for_test(0, vec![1, 1, 1, 997]);
    let mut rng = StdRng::from_seed([7; 32]);

    let heavy = committee.to_authority_index(3).unwrap();
    let hits = (0..1000)
        .filter(|_| committee.sample(1, &mut rng).unwrap()[0] == heavy)
        .count();
    assert!(hits > 900, "heavy authority sampled only {hits} times");
}

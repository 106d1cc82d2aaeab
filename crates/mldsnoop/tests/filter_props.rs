// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Membership filter properties over random group addresses.

use mldsnoop::{BitVector, BloomHasher, MembershipFilter};
use std::net::Ipv6Addr;

fn random_group(rng: &mut fastrand::Rng) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[0] = 0xff;
    octets[1] = 0x3e;
    for b in &mut octets[2..] {
        *b = rng.u8(..);
    }
    Ipv6Addr::from(octets)
}

#[test]
fn test_indices_are_deterministic_and_in_range() {
    let mut rng = fastrand::Rng::with_seed(7);
    let a = BloomHasher::new(1_000_003, 8).unwrap();
    let b = BloomHasher::new(1_000_003, 8).unwrap();

    for _ in 0..256 {
        let g = random_group(&mut rng);
        let ia = a.indices(&g);
        assert_eq!(ia, b.indices(&g));
        assert_eq!(ia.as_slice().len(), 8);
        assert!(ia.as_slice().iter().all(|&i| i < 1_000_003));
    }
}

#[test]
fn test_fewer_hashes_are_a_prefix() {
    let mut rng = fastrand::Rng::with_seed(8);
    let full = BloomHasher::new(65_536, 8).unwrap();
    let short = BloomHasher::new(65_536, 3).unwrap();
    for _ in 0..64 {
        let g = random_group(&mut rng);
        assert_eq!(short.indices(&g).as_slice(), &full.indices(&g).as_slice()[..3]);
    }
}

#[test]
fn test_added_groups_are_contained_until_deleted() {
    let mut rng = fastrand::Rng::with_seed(9);
    let mut filter = MembershipFilter::new(1 << 20, 8).unwrap();
    let groups: Vec<_> = (0..200).map(|_| random_group(&mut rng)).collect();

    for g in &groups {
        filter.add(g);
    }
    // No false negatives.
    assert!(groups.iter().all(|g| filter.contains(g)));

    for g in &groups[..100] {
        assert!(filter.del(g));
    }
    assert!(groups[100..].iter().all(|g| filter.contains(g)));
}

#[test]
fn test_repeated_adds_do_not_inflate_counters() {
    let g: Ipv6Addr = "ff3e::beef".parse().unwrap();
    let mut filter = MembershipFilter::new(4096, 4).unwrap();
    assert!(filter.add(&g));
    for _ in 0..10 {
        assert!(!filter.add(&g));
    }
    assert!(filter.del(&g));
    assert!(!filter.contains(&g));
}

#[test]
fn test_counters_saturate() {
    let mut v = BitVector::new(40);
    for _ in 0..300 {
        v.inc(33);
    }
    assert_eq!(v.get(33), u8::MAX);
    for _ in 0..300 {
        v.dec(33);
    }
    assert_eq!(v.get(33), 0);
}

#[test]
fn test_every_group_expires_within_timeout_ticks() {
    let mut rng = fastrand::Rng::with_seed(10);
    let mut filter = MembershipFilter::new(1 << 16, 8).unwrap();
    let groups: Vec<_> = (0..32).map(|_| random_group(&mut rng)).collect();
    for g in &groups {
        filter.add(g);
        filter.timer_refresh(g, 5);
    }

    for _ in 0..4 {
        filter.decay();
    }
    assert!(groups.iter().all(|g| filter.contains(g)));

    filter.decay();
    assert!(groups.iter().all(|g| !filter.contains(g)));
    assert_eq!(filter.occupancy(), 0);
}

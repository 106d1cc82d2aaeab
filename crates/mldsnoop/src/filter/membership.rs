// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Counted bloom filter with per-slot expiry timers.

use std::net::Ipv6Addr;
use std::ops::Range;

use super::hash::{BloomHasher, HashIndices};
use super::vector::{decay_lanes, BitVector};
use crate::error::Result;

/// Per-interface membership state.
///
/// `group` holds presence counters, `timer` holds ticks-to-expiry for the
/// same slots. An address is a member while all of its `group` slots are
/// nonzero.
#[derive(Debug, Clone)]
pub struct MembershipFilter {
    group: BitVector,
    timer: BitVector,
    hasher: BloomHasher,
}

impl MembershipFilter {
    /// Allocate a filter of `size` slots using `k` hash indices.
    pub fn new(size: usize, k: usize) -> Result<Self> {
        let hasher = BloomHasher::new(size, k)?;
        Ok(Self {
            group: BitVector::new(size),
            timer: BitVector::new(size),
            hasher,
        })
    }

    #[inline]
    pub fn indices(&self, addr: &Ipv6Addr) -> HashIndices {
        self.hasher.indices(addr)
    }

    /// True iff every hashed group slot is nonzero.
    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        self.indices(addr)
            .as_slice()
            .iter()
            .all(|&i| self.group.get(i) != 0)
    }

    /// Add `addr`. Returns `true` on an absent-to-present transition.
    ///
    /// Adding an address already present is a no-op.
    pub fn add(&mut self, addr: &Ipv6Addr) -> bool {
        let idx = self.indices(addr);
        if idx.as_slice().iter().all(|&i| self.group.get(i) != 0) {
            return false;
        }
        for &i in idx.as_slice() {
            self.group.inc(i);
        }
        true
    }

    /// Remove `addr`. Returns `true` if it was present.
    ///
    /// Removing an absent address is a no-op.
    pub fn del(&mut self, addr: &Ipv6Addr) -> bool {
        let idx = self.indices(addr);
        if !idx.as_slice().iter().all(|&i| self.group.get(i) != 0) {
            return false;
        }
        for &i in idx.as_slice() {
            self.group.dec(i);
        }
        true
    }

    /// Timer value at the first hash index.
    pub fn timer_get(&self, addr: &Ipv6Addr) -> u8 {
        self.timer.get(self.indices(addr).first())
    }

    /// Overwrite every hashed timer slot.
    pub fn timer_set(&mut self, addr: &Ipv6Addr, val: u8) {
        for &i in self.indices(addr).as_slice() {
            self.timer.set(i, val);
        }
    }

    /// Raise every hashed timer slot to at least `full`.
    ///
    /// Slots shared with a longer-lived address keep their larger value.
    pub fn timer_refresh(&mut self, addr: &Ipv6Addr, full: u8) {
        for &i in self.indices(addr).as_slice() {
            if self.timer.get(i) < full {
                self.timer.set(i, full);
            }
        }
    }

    /// Number of lanes a full decay pass walks.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.group.lanes()
    }

    /// Decay a lane range. Returns the number of group slots cleared.
    pub fn decay_lanes(&mut self, lanes: Range<usize>) -> usize {
        decay_lanes(&mut self.timer, &mut self.group, lanes)
    }

    /// Decay the whole filter once.
    pub fn decay(&mut self) -> usize {
        let lanes = self.lanes();
        self.decay_lanes(0..lanes)
    }

    /// Forget every membership and timer.
    pub fn clear(&mut self) {
        self.group.clear();
        self.timer.clear();
    }

    /// Raw group counter, for diagnostics.
    #[inline]
    pub fn group_at(&self, idx: usize) -> u8 {
        self.group.get(idx)
    }

    /// Occupied group slots.
    pub fn occupancy(&self) -> usize {
        self.group.count_nonzero()
    }
}

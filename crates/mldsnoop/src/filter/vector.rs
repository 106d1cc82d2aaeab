// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lane-wise byte counters.
//!
//! Storage is a boxed slice of 16-byte lanes so the decay kernel walks
//! fixed-width chunks the compiler can vectorize. Every counter saturates
//! in `[0, 255]`.

use std::ops::Range;

/// Bytes per lane.
pub const LANE: usize = 16;

/// Fixed-size array of saturating byte counters.
#[derive(Clone, PartialEq, Eq)]
pub struct BitVector {
    lanes: Box<[[u8; LANE]]>,
    len: usize,
}

impl BitVector {
    /// Allocate `len` zeroed counters (storage rounded up to a whole lane).
    pub fn new(len: usize) -> Self {
        let lanes = vec![[0u8; LANE]; len.div_ceil(LANE)].into_boxed_slice();
        Self { lanes, len }
    }

    /// Number of addressable counters.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of lanes backing the vector.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Read counter `idx`.
    ///
    /// # Panics
    /// Panics if `idx` is beyond the allocated lanes.
    #[inline]
    pub fn get(&self, idx: usize) -> u8 {
        self.lanes[idx / LANE][idx % LANE]
    }

    /// Overwrite counter `idx`.
    #[inline]
    pub fn set(&mut self, idx: usize, val: u8) {
        self.lanes[idx / LANE][idx % LANE] = val;
    }

    /// Saturating increment; returns the new value.
    #[inline]
    pub fn inc(&mut self, idx: usize) -> u8 {
        let slot = &mut self.lanes[idx / LANE][idx % LANE];
        *slot = slot.saturating_add(1);
        *slot
    }

    /// Saturating decrement; returns the new value.
    #[inline]
    pub fn dec(&mut self, idx: usize) -> u8 {
        let slot = &mut self.lanes[idx / LANE][idx % LANE];
        *slot = slot.saturating_sub(1);
        *slot
    }

    /// Zero every counter.
    pub fn clear(&mut self) {
        self.lanes.iter_mut().for_each(|lane| *lane = [0; LANE]);
    }

    /// Number of nonzero counters.
    pub fn count_nonzero(&self) -> usize {
        self.lanes
            .iter()
            .flat_map(|lane| lane.iter())
            .filter(|b| **b != 0)
            .count()
    }
}

impl std::fmt::Debug for BitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitVector")
            .field("len", &self.len)
            .field("nonzero", &self.count_nonzero())
            .finish()
    }
}

/// One decay step over `lanes` of a timer/group pair.
///
/// Every nonzero timer byte is decremented, then every group byte whose
/// timer byte is now zero is cleared. Returns how many group bytes went
/// from nonzero to zero.
///
/// # Panics
/// Panics if the vectors differ in lane count or the range is out of bounds.
pub fn decay_lanes(timer: &mut BitVector, group: &mut BitVector, lanes: Range<usize>) -> usize {
    assert_eq!(timer.lanes(), group.lanes(), "timer/group size mismatch");

    let mut expired = 0;
    let timers = &mut timer.lanes[lanes.clone()];
    let groups = &mut group.lanes[lanes];
    for (t, g) in timers.iter_mut().zip(groups.iter_mut()) {
        expired += decay_lane(t, g);
    }
    expired
}

#[inline]
fn decay_lane(timer: &mut [u8; LANE], group: &mut [u8; LANE]) -> usize {
    let mut expired = 0;
    for (t, g) in timer.iter_mut().zip(group.iter_mut()) {
        *t = t.saturating_sub(1);
        if *t == 0 && *g != 0 {
            *g = 0;
            expired += 1;
        }
    }
    expired
}

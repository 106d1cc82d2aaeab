// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probabilistic membership storage.
//!
//! - [`BitVector`]: saturating byte counters in 16-byte lanes
//! - [`BloomHasher`]: SHA-256 derived slot indices
//! - [`MembershipFilter`]: counted bloom filter plus per-slot timers

pub mod hash;
pub mod membership;
pub mod vector;

pub use hash::{BloomHasher, HashIndices, MAX_HASHES};
pub use membership::MembershipFilter;
pub use vector::{BitVector, LANE};

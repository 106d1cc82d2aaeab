// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bloom index derivation.
//!
//! SHA-256 over the raw 16 address bytes, sliced into little-endian 32-bit
//! words, each reduced modulo the vector size. The digest holds eight words,
//! which caps `k` at [`MAX_HASHES`].

use ring::digest::{digest, SHA256};
use std::net::Ipv6Addr;

use crate::error::{Error, Result};

/// Upper bound on hash indices per address.
pub const MAX_HASHES: usize = 8;

/// The `k` slot indices of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashIndices {
    idx: [usize; MAX_HASHES],
    k: usize,
}

impl HashIndices {
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.idx[..self.k]
    }

    /// Index used for timer lookups.
    #[inline]
    pub fn first(&self) -> usize {
        self.idx[0]
    }
}

/// Maps addresses to `k` indices in `[0, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomHasher {
    size: usize,
    k: usize,
}

impl BloomHasher {
    pub fn new(size: usize, k: usize) -> Result<Self> {
        if size == 0 || size > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!("bloom size {} out of range", size)));
        }
        if k == 0 || k > MAX_HASHES {
            return Err(Error::InvalidConfig(format!(
                "hash count {} not in 1..={}",
                k, MAX_HASHES
            )));
        }
        Ok(Self { size, k })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn indices(&self, addr: &Ipv6Addr) -> HashIndices {
        let hash = digest(&SHA256, &addr.octets());
        let mut idx = [0usize; MAX_HASHES];
        for (slot, word) in idx.iter_mut().zip(hash.as_ref().chunks_exact(4)).take(self.k) {
            let w = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            *slot = w as usize % self.size;
        }
        HashIndices { idx, k: self.k }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let h = BloomHasher::new(1 << 20, 8).unwrap();
        let addr: Ipv6Addr = "ff3e::1234".parse().unwrap();
        assert_eq!(h.indices(&addr), h.indices(&addr));
        assert_eq!(h.indices(&addr).as_slice().len(), 8);
    }

    #[test]
    fn test_indices_in_range() {
        let h = BloomHasher::new(1000, 5).unwrap();
        for i in 0..200u16 {
            let addr = Ipv6Addr::new(0xff3e, 0, 0, 0, 0, 0, 0, i);
            assert!(h.indices(&addr).as_slice().iter().all(|&i| i < 1000));
        }
    }

    #[test]
    fn test_prefix_of_larger_k() {
        // k only truncates: the first words are the same for any k.
        let addr: Ipv6Addr = "ff02::1:3".parse().unwrap();
        let h3 = BloomHasher::new(4096, 3).unwrap().indices(&addr);
        let h8 = BloomHasher::new(4096, 8).unwrap().indices(&addr);
        assert_eq!(h3.as_slice(), &h8.as_slice()[..3]);
        assert_eq!(h3.first(), h8.first());
    }

    #[test]
    fn test_first_word_little_endian() {
        let addr = Ipv6Addr::UNSPECIFIED;
        let d = digest(&SHA256, &addr.octets());
        let b = d.as_ref();
        let w = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
        let h = BloomHasher::new(BLOOM_TEST_SIZE, 1).unwrap();
        assert_eq!(h.indices(&addr).first(), w % BLOOM_TEST_SIZE);
    }

    const BLOOM_TEST_SIZE: usize = 16_777_216;

    #[test]
    fn test_rejects_bad_k() {
        assert!(BloomHasher::new(16, 0).is_err());
        assert!(BloomHasher::new(16, 9).is_err());
        assert!(BloomHasher::new(0, 1).is_err());
    }
}

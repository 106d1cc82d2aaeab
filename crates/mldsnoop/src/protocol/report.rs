// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MLDv2 Listener Report codec (RFC 3810 5.2).
//!
//! ```text
//!  0               1               2               3
//! +---------------+---------------+-------------------------------+
//! |  Type = 143   |   Reserved    |           Checksum            |
//! +---------------+---------------+-------------------------------+
//! |           Reserved            |  Nr of Mcast Address Records  |
//! +-------------------------------+-------------------------------+
//! |  Record Type  |  Aux Data Len |     Number of Sources (N)     |
//! +---------------+---------------+-------------------------------+
//! |                  Multicast Address (16 bytes)                 |
//! |                  Source Address [1..N] (16 bytes each)        |
//! |                  Auxiliary Data (Aux Data Len * 4 bytes)      |
//! +---------------------------------------------------------------+
//! ```

use std::net::Ipv6Addr;

use thiserror::Error;

use crate::config::MLD2_LISTEN_REPORT;

/// Fixed report header length.
pub const REPORT_HEADER_LEN: usize = 8;

/// Fixed record header length (type, aux len, source count, group).
pub const RECORD_HEADER_LEN: usize = 20;

const IPV6_BYTES: usize = 16;

/// Listener report decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("truncated report header ({0} bytes)")]
    TruncatedHeader(usize),
    #[error("ICMPv6 type {0} is not a listener report")]
    NotAReport(u8),
    #[error("record {index} truncated at offset {offset}")]
    TruncatedRecord { index: usize, offset: usize },
}

/// Multicast Address Record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    ModeIsInclude,
    ModeIsExclude,
    ChangeToIncludeMode,
    ChangeToExcludeMode,
    AllowNewSources,
    BlockOldSources,
    Unknown(u8),
}

impl From<u8> for RecordType {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::ModeIsInclude,
            2 => Self::ModeIsExclude,
            3 => Self::ChangeToIncludeMode,
            4 => Self::ChangeToExcludeMode,
            5 => Self::AllowNewSources,
            6 => Self::BlockOldSources,
            other => Self::Unknown(other),
        }
    }
}

impl From<RecordType> for u8 {
    fn from(t: RecordType) -> Self {
        match t {
            RecordType::ModeIsInclude => 1,
            RecordType::ModeIsExclude => 2,
            RecordType::ChangeToIncludeMode => 3,
            RecordType::ChangeToExcludeMode => 4,
            RecordType::AllowNewSources => 5,
            RecordType::BlockOldSources => 6,
            RecordType::Unknown(v) => v,
        }
    }
}

/// One Multicast Address Record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub record_type: RecordType,
    /// Auxiliary data length in 32-bit words.
    pub aux_len: u8,
    pub group: Ipv6Addr,
    pub sources: Vec<Ipv6Addr>,
}

impl AddressRecord {
    pub fn new(record_type: RecordType, group: Ipv6Addr, sources: Vec<Ipv6Addr>) -> Self {
        Self {
            record_type,
            aux_len: 0,
            group,
            sources,
        }
    }

    /// Bytes this record occupies on the wire.
    pub fn wire_len(&self) -> usize {
        RECORD_HEADER_LEN + self.sources.len() * IPV6_BYTES + usize::from(self.aux_len) * 4
    }
}

/// A decoded Version 2 Multicast Listener Report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerReport {
    pub records: Vec<AddressRecord>,
}

impl ListenerReport {
    /// Decode an ICMPv6 message starting at its type byte.
    ///
    /// Records are walked by their full length, sources and auxiliary data
    /// included. Trailing bytes after the last record are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < REPORT_HEADER_LEN {
            return Err(ParseError::TruncatedHeader(buf.len()));
        }
        if buf[0] != MLD2_LISTEN_REPORT {
            return Err(ParseError::NotAReport(buf[0]));
        }

        let nrec = usize::from(u16::from_be_bytes([buf[6], buf[7]]));
        let mut records = Vec::with_capacity(nrec.min(64));
        let mut offset = REPORT_HEADER_LEN;

        for index in 0..nrec {
            let truncated = ParseError::TruncatedRecord { index, offset };
            let hdr = buf
                .get(offset..offset + RECORD_HEADER_LEN)
                .ok_or(truncated.clone())?;

            let record_type = RecordType::from(hdr[0]);
            let aux_len = hdr[1];
            let nsrc = usize::from(u16::from_be_bytes([hdr[2], hdr[3]]));
            let group = read_addr(&hdr[4..RECORD_HEADER_LEN]);

            let src_start = offset + RECORD_HEADER_LEN;
            let src_end = src_start + nsrc * IPV6_BYTES;
            let end = src_end + usize::from(aux_len) * 4;
            if end > buf.len() {
                return Err(truncated);
            }

            let sources = buf[src_start..src_end]
                .chunks_exact(IPV6_BYTES)
                .map(read_addr)
                .collect();

            records.push(AddressRecord {
                record_type,
                aux_len,
                group,
                sources,
            });
            offset = end;
        }

        Ok(Self { records })
    }

    /// Encode with a zero checksum (the kernel fills it for raw ICMPv6).
    ///
    /// Auxiliary data is written as zeros.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = REPORT_HEADER_LEN + self.records.iter().map(AddressRecord::wire_len).sum::<usize>();
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&[MLD2_LISTEN_REPORT, 0, 0, 0, 0, 0]);
        buf.extend_from_slice(&(self.records.len() as u16).to_be_bytes());

        for rec in &self.records {
            buf.push(rec.record_type.into());
            buf.push(rec.aux_len);
            buf.extend_from_slice(&(rec.sources.len() as u16).to_be_bytes());
            buf.extend_from_slice(&rec.group.octets());
            for src in &rec.sources {
                buf.extend_from_slice(&src.octets());
            }
            buf.resize(buf.len() + usize::from(rec.aux_len) * 4, 0);
        }
        buf
    }
}

fn read_addr(b: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; IPV6_BYTES];
    octets.copy_from_slice(&b[..IPV6_BYTES]);
    Ipv6Addr::from(octets)
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Join/part notification payload and event masks.

use std::fmt;
use std::net::Ipv6Addr;

/// Notification datagram size: ifindex (4) + group (16).
pub const NOTIFICATION_LEN: usize = 20;

/// A single membership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Join,
    Part,
}

impl Event {
    pub fn mask(self) -> EventMask {
        match self {
            Event::Join => EventMask::JOIN,
            Event::Part => EventMask::PART,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Join => f.write_str("JOIN"),
            Event::Part => f.write_str("PART"),
        }
    }
}

/// Set of events a watcher or channel covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask(u8);

impl EventMask {
    pub const JOIN: Self = Self(1);
    pub const PART: Self = Self(2);
    pub const ALL: Self = Self(3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones. Returns `None` if empty.
    pub fn from_bits(bits: u8) -> Option<Self> {
        let bits = bits & Self::ALL.0;
        (bits != 0).then_some(Self(bits))
    }

    pub fn contains(self, event: Event) -> bool {
        self.0 & event.mask().0 != 0
    }
}

impl From<Event> for EventMask {
    fn from(e: Event) -> Self {
        e.mask()
    }
}

/// Decoded notification datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub ifindex: u32,
    pub group: Ipv6Addr,
}

impl Notification {
    pub fn encode(&self) -> [u8; NOTIFICATION_LEN] {
        let mut buf = [0u8; NOTIFICATION_LEN];
        buf[..4].copy_from_slice(&self.ifindex.to_be_bytes());
        buf[4..].copy_from_slice(&self.group.octets());
        buf
    }

    /// Decode; `None` if the datagram is shorter than 20 bytes.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < NOTIFICATION_LEN {
            return None;
        }
        let ifindex = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&buf[4..NOTIFICATION_LEN]);
        Some(Self {
            ifindex,
            group: Ipv6Addr::from(octets),
        })
    }
}

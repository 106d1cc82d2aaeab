// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast transport used for join/part notifications.
//!
//! The engine only needs a small socket contract: bind to an interface and
//! a channel, join/leave, send and receive fixed-size datagrams with a
//! bounded wait, and set loopback and hop limit.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`UdpTransport`] | IPv6 UDP multicast over socket2 |
//! | [`MemoryTransport`] | in-process bus with call counters (tests, simulation) |

use std::fmt;
use std::io;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::unix::io::RawFd;
use std::time::Duration;

pub mod memory;
pub mod udp;

pub use memory::{MemoryTransport, TransportCounters};
pub use udp::UdpTransport;

/// A multicast destination: group address plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    pub addr: Ipv6Addr,
    pub port: u16,
}

impl Channel {
    pub const fn new(addr: Ipv6Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Link-local scoped groups need an interface to be addressable.
    pub fn is_link_scoped(&self) -> bool {
        let o = self.addr.octets();
        o[0] == 0xff && (o[1] & 0x0f) <= 0x02
    }

    /// Socket address, carrying `ifindex` as scope id when link scoped.
    pub fn socket_addr(&self, ifindex: u32) -> SocketAddrV6 {
        let scope = if self.is_link_scoped() { ifindex } else { 0 };
        SocketAddrV6::new(self.addr, self.port, 0, scope)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.addr, self.port)
    }
}

/// Socket factory.
pub trait Transport: Send + Sync + fmt::Debug {
    fn socket(&self) -> io::Result<Box<dyn McastSocket>>;
}

/// One multicast socket. Dropping it leaves every joined channel.
pub trait McastSocket: Send {
    /// Restrict to interface `ifindex`; 0 means any.
    fn bind_interface(&mut self, ifindex: u32) -> io::Result<()>;

    fn set_loopback(&mut self, on: bool) -> io::Result<()>;

    /// Multicast hop limit (TTL).
    fn set_hops(&mut self, hops: u32) -> io::Result<()>;

    /// Receive only datagrams addressed to `chan`.
    fn bind_channel(&mut self, chan: &Channel) -> io::Result<()>;

    fn join(&mut self, chan: &Channel) -> io::Result<()>;

    fn leave(&mut self, chan: &Channel) -> io::Result<()>;

    fn send(&self, chan: &Channel, buf: &[u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for one datagram. `Ok(None)` on timeout.
    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Underlying descriptor, if the socket has one.
    fn raw_fd(&self) -> Option<RawFd>;
}

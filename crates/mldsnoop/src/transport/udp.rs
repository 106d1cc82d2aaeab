// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IPv6 UDP multicast transport.
//!
//! Receive sockets bind to the channel address itself so the kernel only
//! hands them datagrams for that group, with SO_REUSEADDR and SO_REUSEPORT
//! so several local watchers can share a channel.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use super::{Channel, McastSocket, Transport};
use crate::sys;

/// Creates [`UdpSocket`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl UdpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for UdpTransport {
    fn socket(&self) -> io::Result<Box<dyn McastSocket>> {
        Ok(Box::new(UdpSocket::new()?))
    }
}

/// IPv6 UDP socket implementing [`McastSocket`].
#[derive(Debug)]
pub struct UdpSocket {
    socket: Socket,
    ifindex: u32,
    joined: Vec<Channel>,
    read_timeout: Option<Duration>,
}

impl UdpSocket {
    pub fn new() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_only_v6(true)?;
        socket.set_reuse_address(true)?;
        sys::set_reuseport(socket.as_raw_fd())?;
        Ok(Self {
            socket,
            ifindex: 0,
            joined: Vec::new(),
            read_timeout: None,
        })
    }
}

impl McastSocket for UdpSocket {
    fn bind_interface(&mut self, ifindex: u32) -> io::Result<()> {
        if ifindex != 0 {
            self.socket.set_multicast_if_v6(ifindex)?;
        }
        self.ifindex = ifindex;
        Ok(())
    }

    fn set_loopback(&mut self, on: bool) -> io::Result<()> {
        self.socket.set_multicast_loop_v6(on)
    }

    fn set_hops(&mut self, hops: u32) -> io::Result<()> {
        self.socket.set_multicast_hops_v6(hops)
    }

    fn bind_channel(&mut self, chan: &Channel) -> io::Result<()> {
        let addr = chan.socket_addr(self.ifindex);
        self.socket.bind(&SockAddr::from(addr))?;
        log::trace!("[udp] bound {}", addr);
        Ok(())
    }

    fn join(&mut self, chan: &Channel) -> io::Result<()> {
        self.socket.join_multicast_v6(&chan.addr, self.ifindex)?;
        self.joined.push(*chan);
        log::trace!("[udp] joined {} on ifindex {}", chan, self.ifindex);
        Ok(())
    }

    fn leave(&mut self, chan: &Channel) -> io::Result<()> {
        self.socket.leave_multicast_v6(&chan.addr, self.ifindex)?;
        self.joined.retain(|c| c != chan);
        Ok(())
    }

    fn send(&self, chan: &Channel, buf: &[u8]) -> io::Result<usize> {
        let dst = SockAddr::from(chan.socket_addr(self.ifindex));
        self.socket.send_to(buf, &dst)
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        if self.read_timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }
        match (&self.socket).read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.socket.as_raw_fd())
    }
}

impl Drop for UdpSocket {
    fn drop(&mut self) {
        for chan in std::mem::take(&mut self.joined) {
            if let Err(e) = self.socket.leave_multicast_v6(&chan.addr, self.ifindex) {
                log::debug!("[udp] leave {} failed (non-fatal): {}", chan, e);
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw ICMPv6 socket joined to the all-MLDv2-routers group.
//!
//! Needs CAP_NET_RAW. The socket is non-blocking; readiness comes from the
//! listener's mio poll and the arrival interface from IPV6_PKTINFO.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem;
use std::net::Ipv6Addr;
use std::os::unix::io::{AsRawFd, RawFd};

use crate::config::MLD2_CAPABLE_ROUTERS;
use crate::sys;

/// One datagram read by [`RawSocket::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub len: usize,
    /// Arrival interface from IPV6_PKTINFO; `None` if the kernel sent none.
    pub ifindex: Option<u32>,
    pub src: Ipv6Addr,
}

/// `AF_INET6/SOCK_RAW/IPPROTO_ICMPV6` socket.
#[derive(Debug)]
pub struct RawSocket {
    socket: Socket,
    joined: Vec<u32>,
}

impl RawSocket {
    /// Open the socket and enable packet info delivery.
    pub fn open() -> io::Result<Self> {
        let socket = Socket::new(
            Domain::IPV6,
            Type::from(libc::SOCK_RAW),
            Some(Protocol::from(libc::IPPROTO_ICMPV6)),
        )?;
        sys::setsockopt_int(
            socket.as_raw_fd(),
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVPKTINFO,
            1,
        )?;
        socket.set_nonblocking(true)?;
        log::debug!("[snoop] raw ICMPv6 socket fd={}", socket.as_raw_fd());
        Ok(Self {
            socket,
            joined: Vec::new(),
        })
    }

    /// Join `ff02::16` on `ifindex`.
    pub fn join(&mut self, ifindex: u32) -> io::Result<()> {
        self.socket.join_multicast_v6(&MLD2_CAPABLE_ROUTERS, ifindex)?;
        self.joined.push(ifindex);
        log::debug!(
            "[snoop] joined {} on {} ({})",
            MLD2_CAPABLE_ROUTERS,
            sys::ifname(ifindex),
            ifindex
        );
        Ok(())
    }

    /// Interfaces joined so far, in join order.
    pub fn joined(&self) -> &[u32] {
        &self.joined
    }

    /// Read one datagram with its ancillary data.
    ///
    /// Returns `WouldBlock` when nothing is queued.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<Received> {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };
        // SAFETY: sockaddr_in6 is plain old data; all-zero is a valid value
        let mut src: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        // u64 backing keeps the control buffer aligned for cmsghdr
        let mut control = [0u64; 16];

        // SAFETY: msghdr is plain old data; all-zero is a valid value
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = &mut src as *mut libc::sockaddr_in6 as *mut libc::c_void;
        msg.msg_namelen = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = mem::size_of_val(&control) as _;

        // SAFETY:
        // - fd is the open raw socket owned by self
        // - msg points at iov, src and control, all live on this stack frame
        // - the kernel writes at most iov_len / msg_namelen / msg_controllen bytes
        let n = unsafe { libc::recvmsg(self.socket.as_raw_fd(), &mut msg, 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut ifindex = None;
        // SAFETY: msg was filled by recvmsg; CMSG_FIRSTHDR only reads its control fields
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        while !cmsg.is_null() {
            // SAFETY: cmsg is non-null and lies within the control buffer
            let hdr = unsafe { &*cmsg };
            if hdr.cmsg_level == libc::IPPROTO_IPV6 && hdr.cmsg_type == libc::IPV6_PKTINFO {
                // SAFETY:
                // - the kernel sized this cmsg for an in6_pktinfo
                // - read_unaligned tolerates the cmsg data alignment
                let info = unsafe {
                    std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::in6_pktinfo)
                };
                ifindex = Some(info.ipi6_ifindex as u32);
            }
            // SAFETY: msg and cmsg are valid as above
            cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
        }

        Ok(Received {
            len: n as usize,
            ifindex,
            src: Ipv6Addr::from(src.sin6_addr.s6_addr),
        })
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        for ifindex in std::mem::take(&mut self.joined) {
            if let Err(e) = self.socket.leave_multicast_v6(&MLD2_CAPABLE_ROUTERS, ifindex) {
                log::debug!("[snoop] leave on {} failed (non-fatal): {}", ifindex, e);
            }
        }
        log::debug!("[snoop] raw socket closed");
    }
}

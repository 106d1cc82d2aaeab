// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host interface and address discovery.

use std::collections::HashSet;
use std::ffi::CStr;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv6Addr};

use crate::sys;

/// Answers "is this address configured on this host".
pub trait LocalAddresses: Send + Sync + fmt::Debug {
    fn is_local(&self, addr: &Ipv6Addr) -> bool;
}

/// Queries the live interface table on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAddresses;

impl LocalAddresses for SystemAddresses {
    fn is_local(&self, addr: &Ipv6Addr) -> bool {
        match local_ip_address::list_afinet_netifas() {
            Ok(ifs) => ifs.iter().any(|(_, ip)| *ip == IpAddr::V6(*addr)),
            Err(e) => {
                log::debug!("[snoop] failed to list local addresses: {}", e);
                false
            }
        }
    }
}

/// Fixed address set.
#[derive(Debug, Clone, Default)]
pub struct StaticAddresses {
    addrs: HashSet<Ipv6Addr>,
}

impl StaticAddresses {
    pub fn new<I: IntoIterator<Item = Ipv6Addr>>(addrs: I) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
        }
    }
}

impl LocalAddresses for StaticAddresses {
    fn is_local(&self, addr: &Ipv6Addr) -> bool {
        self.addrs.contains(addr)
    }
}

/// Indices of interfaces carrying an IPv6 address with IFF_MULTICAST set,
/// in discovery order without duplicates.
pub fn multicast_interfaces() -> io::Result<Vec<u32>> {
    let mut found = Vec::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY:
    // - `ifaddrs` is a valid pointer to a null pointer, which getifaddrs will populate
    // - The returned list is freed with freeifaddrs below
    let ret = unsafe { libc::getifaddrs(&mut ifaddrs) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifa = ifaddrs;
    while !ifa.is_null() {
        // SAFETY:
        // - `ifa` is non-null and comes from getifaddrs
        // - The structure stays valid until freeifaddrs
        let entry = unsafe { &*ifa };
        ifa = entry.ifa_next;

        if entry.ifa_addr.is_null() {
            continue;
        }
        // SAFETY: ifa_addr checked non-null; only sa_family is read
        let family = unsafe { (*entry.ifa_addr).sa_family } as libc::c_int;
        if family != libc::AF_INET6 || entry.ifa_flags & libc::IFF_MULTICAST as libc::c_uint == 0 {
            continue;
        }

        // SAFETY: ifa_name is non-null and NUL-terminated for every getifaddrs entry
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }.to_string_lossy();
        match sys::ifindex(&name) {
            Some(idx) if !found.contains(&idx) => {
                log::debug!("[snoop] candidate interface {} ({})", name, idx);
                found.push(idx);
            }
            Some(_) => {}
            None => log::debug!("[snoop] no index for interface {}", name),
        }
    }

    // SAFETY: `ifaddrs` is the unfreed list returned by getifaddrs above
    unsafe { libc::freeifaddrs(ifaddrs) };

    Ok(found)
}

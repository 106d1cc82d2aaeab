// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thin libc helpers shared by the raw and UDP sockets.

use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;

/// `setsockopt` with an `int` option value.
pub(crate) fn setsockopt_int(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    val: libc::c_int,
) -> io::Result<()> {
    // SAFETY:
    // - fd is a socket descriptor owned by the caller for the duration of the call
    // - val is a stack-allocated c_int, properly aligned
    // - size_of::<c_int>() matches the option value passed
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &val as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Enable SO_REUSEPORT so several local watchers can bind the same channel.
pub(crate) fn set_reuseport(fd: RawFd) -> io::Result<()> {
    setsockopt_int(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, 1)
}

/// Interface name for `ifindex`, or its number when the lookup fails.
pub fn ifname(ifindex: u32) -> String {
    let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
    // SAFETY:
    // - buf is IF_NAMESIZE bytes, the size if_indextoname requires
    // - on success the kernel writes a NUL-terminated name into buf
    let ptr = unsafe { libc::if_indextoname(ifindex, buf.as_mut_ptr()) };
    if ptr.is_null() {
        return ifindex.to_string();
    }
    // SAFETY: ptr points into buf, which holds a NUL-terminated string
    let name = unsafe { CStr::from_ptr(ptr) };
    name.to_string_lossy().into_owned()
}

/// Interface index for `name`; `None` if no such interface.
pub fn ifindex(name: &str) -> Option<u32> {
    let cname = std::ffi::CString::new(name).ok()?;
    // SAFETY: cname is a valid NUL-terminated string for the call duration
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    (idx != 0).then_some(idx)
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking "is anyone listening yet" queries.
//!
//! The filter answers first; no socket is touched when the group is already
//! present. Otherwise the caller subscribes to the group's JOIN channel and
//! polls it in `wait_poll` steps, re-checking the filter on every step,
//! until a listener shows up, the deadline passes or the snooper stops.

use std::net::Ipv6Addr;
use std::ops::BitOr;
use std::time::{Duration, Instant};

use crate::config::BUFSIZE;
use crate::error::{Error, Result};
use crate::mld::MldInner;
use crate::notify::{notification_channel, open_subscriber};
use crate::protocol::{EventMask, Notification};

/// Flags for [`Mld::wait`](crate::Mld::wait).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WaitFlags(u32);

impl WaitFlags {
    pub const NONE: Self = Self(0);
    /// Fail with [`Error::WouldBlock`] instead of blocking.
    pub const DONTWAIT: Self = Self(1);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WaitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub(crate) fn wait(
    inner: &MldInner,
    ifindex: u32,
    group: &Ipv6Addr,
    flags: WaitFlags,
    timeout: Option<Duration>,
) -> Result<()> {
    let slots = inner.slots(ifindex)?;
    let present = || slots.iter().any(|&slot| inner.contains(slot, group));

    if present() {
        log::trace!("[wait] {} already has a listener", group);
        return Ok(());
    }
    if flags.contains(WaitFlags::DONTWAIT) {
        return Err(Error::WouldBlock);
    }
    if inner.stop.is_stopped() {
        return Err(Error::Stopped);
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    let channel = notification_channel(Some(group), EventMask::JOIN, inner.config.event_port);
    for &slot in &slots {
        inner.register(slot, &channel.addr);
    }
    let mut socket = open_subscriber(inner.transport.as_ref(), ifindex, &channel)?;
    log::debug!("[wait] waiting for {} on {}", group, channel);

    let mut buf = [0u8; BUFSIZE];
    let result = loop {
        // Covers a join published before the subscription was in place.
        if present() {
            break Ok(());
        }
        if inner.stop.is_stopped() {
            break Err(Error::Stopped);
        }
        let step = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break Err(Error::TimedOut);
                }
                (deadline - now).min(inner.config.wait_poll)
            }
            None => inner.config.wait_poll,
        };

        match socket.recv_timeout(&mut buf, step) {
            Ok(Some(n)) => match Notification::decode(&buf[..n]) {
                Some(note) if note.group == *group && (ifindex == 0 || note.ifindex == ifindex) => {
                    break Ok(());
                }
                _ => log::trace!("[wait] ignoring unrelated datagram on {}", channel),
            },
            Ok(None) => {}
            Err(e) => break Err(e.into()),
        }

        for &slot in &slots {
            inner.register(slot, &channel.addr);
        }
    };

    if let Err(e) = socket.leave(&channel) {
        log::debug!("[wait] leave {} failed (non-fatal): {}", channel, e);
    }
    log::debug!("[wait] {} done: {:?}", group, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let both = WaitFlags::NONE | WaitFlags::DONTWAIT;
        assert!(both.contains(WaitFlags::DONTWAIT));
        assert!(!WaitFlags::NONE.contains(WaitFlags::DONTWAIT));
        assert!(WaitFlags::default().contains(WaitFlags::NONE));
        assert_eq!(both.bits(), 1);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification channel derivation.
//!
//! A channel keeps the first two bytes of its base address (multicast
//! prefix, flags and scope) and fills the remaining fourteen with
//! SHA-256(base || event mask). JOIN, PART and ALL notifications for the
//! same group therefore land on distinct groups of the same scope.

use ring::digest::{Context, SHA256};
use std::net::Ipv6Addr;

use crate::protocol::EventMask;
use crate::transport::Channel;

/// Base address of wildcard ("any group") channels.
pub const ANY_GROUP: Ipv6Addr = Ipv6Addr::new(0xff1e, 0, 0, 0, 0, 0, 0, 0);

/// Derive the channel carrying `events` notifications for `group`, or for
/// every group when `group` is `None`.
pub fn notification_channel(group: Option<&Ipv6Addr>, events: EventMask, port: u16) -> Channel {
    let base = group.copied().unwrap_or(ANY_GROUP);
    Channel::new(sidehash(&base, &[events.bits()]), port)
}

fn sidehash(base: &Ipv6Addr, key: &[u8]) -> Ipv6Addr {
    let octets = base.octets();
    let mut ctx = Context::new(&SHA256);
    ctx.update(&octets);
    ctx.update(key);
    let hash = ctx.finish();

    let mut out = [0u8; 16];
    out[..2].copy_from_slice(&octets[..2]);
    out[2..].copy_from_slice(&hash.as_ref()[..14]);
    Ipv6Addr::from(out)
}

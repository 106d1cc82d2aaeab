// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Join/part publication.
//!
//! Each membership transition is sent to four channels so that subscribers
//! at any granularity hear it:
//!
//! | Group    | Events |
//! |----------|--------|
//! | group    | event  |
//! | group    | ALL    |
//! | wildcard | event  |
//! | wildcard | ALL    |
//!
//! A channel whose address is absent from the interface filter has no
//! registered subscriber and is skipped.

use std::io;
use std::net::Ipv6Addr;
use std::sync::atomic::Ordering;

use super::notification_channel;
use crate::mld::{Counters, MldInner};
use crate::protocol::{Event, EventMask, Notification};
use crate::transport::{Channel, McastSocket, Transport};

/// Channels an `event` on `group` is published to, in send order.
pub fn publish_channels(group: &Ipv6Addr, event: Event, port: u16) -> [Channel; 4] {
    [
        notification_channel(Some(group), event.mask(), port),
        notification_channel(Some(group), EventMask::ALL, port),
        notification_channel(None, event.mask(), port),
        notification_channel(None, EventMask::ALL, port),
    ]
}

impl MldInner {
    /// Publish `event` for `group` on the interface in `slot`.
    ///
    /// Must not be called with the slot's filter lock held.
    pub(crate) fn notify(&self, slot: usize, group: &Ipv6Addr, event: Event) {
        let ifindex = self.ifindex_at(slot);
        let payload = Notification {
            ifindex,
            group: *group,
        }
        .encode();

        let mut sender: Option<Box<dyn McastSocket>> = None;
        for chan in publish_channels(group, event, self.config.event_port) {
            if !self.contains(slot, &chan.addr) {
                Counters::bump(&self.counters.notifications_skipped);
                continue;
            }

            if sender.is_none() {
                match open_sender(self.transport.as_ref(), ifindex) {
                    Ok(socket) => sender = Some(socket),
                    Err(e) => {
                        log::warn!("[notify] cannot open sender on {}: {}", ifindex, e);
                        return;
                    }
                }
            }
            let Some(socket) = sender.as_ref() else {
                return;
            };

            match socket.send(&chan, &payload) {
                Ok(_) => {
                    self.counters
                        .notifications_sent
                        .fetch_add(1, Ordering::Relaxed);
                    log::trace!("[notify] {} {} -> {}", event, group, chan);
                }
                Err(e) => log::debug!("[notify] send to {} failed: {}", chan, e),
            }
        }
    }
}

fn open_sender(transport: &dyn Transport, ifindex: u32) -> io::Result<Box<dyn McastSocket>> {
    let mut socket = transport.socket()?;
    socket.set_loopback(true)?;
    socket.set_hops(1)?;
    socket.bind_interface(ifindex)?;
    Ok(socket)
}

/// Socket joined to `chan`, bound to `ifindex` unless it is 0.
pub(crate) fn open_subscriber(
    transport: &dyn Transport,
    ifindex: u32,
    chan: &Channel,
) -> io::Result<Box<dyn McastSocket>> {
    let mut socket = transport.socket()?;
    socket.set_loopback(true)?;
    socket.set_hops(1)?;
    if ifindex != 0 {
        socket.bind_interface(ifindex)?;
    }
    socket.bind_channel(chan)?;
    socket.join(chan)?;
    Ok(socket)
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background join/part subscriptions.

use std::net::Ipv6Addr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::bus::open_subscriber;
use super::notification_channel;
use crate::config::BUFSIZE;
use crate::error::{Error, Result};
use crate::mld::MldInner;
use crate::protocol::{Event, EventMask, Notification};
use crate::transport::{Channel, McastSocket};

/// Callback invoked on the watch thread for every notification.
pub type WatchCallback = Arc<dyn Fn(&WatchEvent, &WatchInfo) + Send + Sync>;

/// One received notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent {
    pub ifindex: u32,
    pub group: Ipv6Addr,
    /// Known when the watch subscribed to a single event kind.
    pub event: Option<Event>,
}

/// What a [`Watch`] subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchInfo {
    /// 0 for every tracked interface.
    pub ifindex: u32,
    /// `None` for every group.
    pub group: Option<Ipv6Addr>,
    pub events: EventMask,
    pub channel: Channel,
}

/// A live subscription with its own socket and thread.
///
/// The thread exits on [`stop`](Self::stop), [`cancel`](Self::cancel), on
/// drop, or when the snooper stops, within one `wait_poll` interval. A
/// stopped watch can be restarted with [`start`](Self::start).
pub struct Watch {
    inner: Arc<MldInner>,
    slots: Vec<usize>,
    info: WatchInfo,
    callback: WatchCallback,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Watch {
    pub(crate) fn start_new(
        inner: Arc<MldInner>,
        ifindex: u32,
        group: Option<Ipv6Addr>,
        events: EventMask,
        callback: WatchCallback,
    ) -> Result<Self> {
        let slots = inner.slots(ifindex)?;
        let channel = notification_channel(group.as_ref(), events, inner.config.event_port);
        let mut watch = Self {
            inner,
            slots,
            info: WatchInfo {
                ifindex,
                group,
                events,
                channel,
            },
            callback,
            cancel: Arc::new(AtomicBool::new(false)),
            thread: None,
        };
        watch.start()?;
        Ok(watch)
    }

    pub fn info(&self) -> &WatchInfo {
        &self.info
    }

    /// Whether the watch thread is still receiving.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// (Re)open the socket and spawn the receive thread. No-op if running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.inner.stop.is_stopped() {
            return Err(Error::Stopped);
        }
        self.stop();

        // Filter in the channel before joining so no publish is skipped.
        for &slot in &self.slots {
            self.inner.register(slot, &self.info.channel.addr);
        }
        let socket = open_subscriber(
            self.inner.transport.as_ref(),
            self.info.ifindex,
            &self.info.channel,
        )?;

        let cancel = Arc::new(AtomicBool::new(false));
        let thread = {
            let inner = Arc::clone(&self.inner);
            let slots = self.slots.clone();
            let info = self.info.clone();
            let callback = Arc::clone(&self.callback);
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name("mld-watch".to_string())
                .spawn(move || run_watch(&inner, socket, &slots, &info, &callback, &cancel))?
        };
        self.cancel = cancel;
        self.thread = Some(thread);

        log::debug!(
            "[watch] subscribed to {} (group={:?} events={:?} ifindex={})",
            self.info.channel,
            self.info.group,
            self.info.events,
            self.info.ifindex
        );
        Ok(())
    }

    /// Stop and join the receive thread, releasing its socket.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("[watch] thread for {} panicked", self.info.channel);
            }
        }
    }

    /// Stop the watch and release it.
    pub fn cancel(mut self) {
        self.stop();
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("info", &self.info)
            .field("running", &self.is_running())
            .finish()
    }
}

fn single_event(mask: EventMask) -> Option<Event> {
    match mask {
        EventMask::JOIN => Some(Event::Join),
        EventMask::PART => Some(Event::Part),
        _ => None,
    }
}

fn run_watch(
    inner: &MldInner,
    mut socket: Box<dyn McastSocket>,
    slots: &[usize],
    info: &WatchInfo,
    callback: &WatchCallback,
    cancel: &AtomicBool,
) {
    let mut buf = [0u8; BUFSIZE];
    let event = single_event(info.events);

    while !cancel.load(Ordering::Acquire) && !inner.stop.is_stopped() {
        // Keep the channel address from decaying out of the filter.
        for &slot in slots {
            inner.register(slot, &info.channel.addr);
        }

        let n = match socket.recv_timeout(&mut buf, inner.config.wait_poll) {
            Ok(Some(n)) => n,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("[watch] receive on {} failed: {}", info.channel, e);
                break;
            }
        };
        let Some(note) = Notification::decode(&buf[..n]) else {
            log::debug!("[watch] short notification ({} bytes) on {}", n, info.channel);
            continue;
        };

        let ev = WatchEvent {
            ifindex: note.ifindex,
            group: note.group,
            event,
        };
        if catch_unwind(AssertUnwindSafe(|| (**callback)(&ev, info))).is_err() {
            log::error!("[watch] callback panicked on {}", info.channel);
        }
    }

    if let Err(e) = socket.leave(&info.channel) {
        log::debug!("[watch] leave {} failed (non-fatal): {}", info.channel, e);
    }
    log::debug!("[watch] {} closed", info.channel);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        assert_eq!(single_event(EventMask::JOIN), Some(Event::Join));
        assert_eq!(single_event(EventMask::PART), Some(Event::Part));
        assert_eq!(single_event(EventMask::ALL), None);
    }
}

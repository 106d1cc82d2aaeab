// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process multicast bus.
//!
//! Sockets created from the same [`MemoryTransport`] share one bus. A send
//! to a channel is delivered to every socket that joined it on a matching
//! interface (0 matches any). Every operation is counted so callers can
//! assert which transport calls happened.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Channel, McastSocket, Transport};

/// Snapshot of [`MemoryTransport`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCounters {
    pub sockets: u64,
    pub binds: u64,
    pub joins: u64,
    pub leaves: u64,
    pub sends: u64,
    pub delivered: u64,
    pub recvs: u64,
}

impl TransportCounters {
    /// Every counted call, excluding deliveries.
    pub fn total_calls(&self) -> u64 {
        self.sockets + self.binds + self.joins + self.leaves + self.sends + self.recvs
    }
}

#[derive(Debug, Default)]
struct Stats {
    sockets: AtomicU64,
    binds: AtomicU64,
    joins: AtomicU64,
    leaves: AtomicU64,
    sends: AtomicU64,
    delivered: AtomicU64,
    recvs: AtomicU64,
}

#[derive(Debug)]
struct Member {
    socket: u64,
    chan: Channel,
    ifindex: u32,
    tx: Sender<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Bus {
    members: Mutex<Vec<Member>>,
    next_id: AtomicU64,
    stats: Stats,
}

/// Loopback-only transport backed by crossbeam channels.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    bus: Arc<Bus>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> TransportCounters {
        let s = &self.bus.stats;
        TransportCounters {
            sockets: s.sockets.load(Ordering::Relaxed),
            binds: s.binds.load(Ordering::Relaxed),
            joins: s.joins.load(Ordering::Relaxed),
            leaves: s.leaves.load(Ordering::Relaxed),
            sends: s.sends.load(Ordering::Relaxed),
            delivered: s.delivered.load(Ordering::Relaxed),
            recvs: s.recvs.load(Ordering::Relaxed),
        }
    }

    /// Number of live channel memberships on the bus.
    pub fn memberships(&self) -> usize {
        self.bus.members.lock().len()
    }
}

impl Transport for MemoryTransport {
    fn socket(&self) -> io::Result<Box<dyn McastSocket>> {
        self.bus.stats.sockets.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::unbounded();
        Ok(Box::new(MemorySocket {
            id: self.bus.next_id.fetch_add(1, Ordering::Relaxed),
            bus: Arc::clone(&self.bus),
            ifindex: 0,
            loopback: true,
            tx,
            rx,
        }))
    }
}

struct MemorySocket {
    id: u64,
    bus: Arc<Bus>,
    ifindex: u32,
    loopback: bool,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl McastSocket for MemorySocket {
    fn bind_interface(&mut self, ifindex: u32) -> io::Result<()> {
        self.bus.stats.binds.fetch_add(1, Ordering::Relaxed);
        self.ifindex = ifindex;
        Ok(())
    }

    fn set_loopback(&mut self, on: bool) -> io::Result<()> {
        self.loopback = on;
        Ok(())
    }

    fn set_hops(&mut self, _hops: u32) -> io::Result<()> {
        Ok(())
    }

    fn bind_channel(&mut self, _chan: &Channel) -> io::Result<()> {
        self.bus.stats.binds.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn join(&mut self, chan: &Channel) -> io::Result<()> {
        self.bus.stats.joins.fetch_add(1, Ordering::Relaxed);
        self.bus.members.lock().push(Member {
            socket: self.id,
            chan: *chan,
            ifindex: self.ifindex,
            tx: self.tx.clone(),
        });
        Ok(())
    }

    fn leave(&mut self, chan: &Channel) -> io::Result<()> {
        self.bus.stats.leaves.fetch_add(1, Ordering::Relaxed);
        self.bus
            .members
            .lock()
            .retain(|m| !(m.socket == self.id && m.chan == *chan));
        Ok(())
    }

    fn send(&self, chan: &Channel, buf: &[u8]) -> io::Result<usize> {
        self.bus.stats.sends.fetch_add(1, Ordering::Relaxed);
        // Everything on the bus is host-local.
        if !self.loopback {
            return Ok(buf.len());
        }
        let members = self.bus.members.lock();
        for m in members.iter().filter(|m| m.chan == *chan) {
            if m.ifindex != 0 && self.ifindex != 0 && m.ifindex != self.ifindex {
                continue;
            }
            if m.tx.send(buf.to_vec()).is_ok() {
                self.bus.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(buf.len())
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        self.bus.stats.recvs.fetch_add(1, Ordering::Relaxed);
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                let n = msg.len().min(buf.len());
                buf[..n].copy_from_slice(&msg[..n]);
                Ok(Some(n))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory bus closed"))
            }
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        self.bus.members.lock().retain(|m| m.socket != self.id);
    }
}

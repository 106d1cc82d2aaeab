// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The snooper context.
//!
//! [`Mld`] owns one [`MembershipFilter`] per tracked interface, the job
//! queue, the stop signal and the notification transport. Every background
//! loop (listener, ticker, decay and refresh jobs, watches) holds an
//! `Arc<MldInner>` and observes the same stop signal.
//!
//! # Lifecycle
//!
//! ```text
//! MldBuilder::build()  -> Idle       (filters, workers, optional ticker)
//! MldBuilder::start()  -> Listening  (+ raw socket, listener job)
//! Mld::stop() / drop   -> Stopped    (signal raised, queue drained, workers joined)
//! ```

use parking_lot::RwLock;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{MldConfig, IFACE_MAX};
use crate::error::{Error, Result};
use crate::filter::MembershipFilter;
use crate::job::{Job, JobQueue};
use crate::notify::{self, Watch, WatchCallback};
use crate::protocol::{AddressRecord, Event, EventMask, ListenerReport};
use crate::signal::{StopHandle, StopSignal};
use crate::snoop::{self, LocalAddresses, RawSocket, RecordAction, SystemAddresses};
use crate::sys;
use crate::timer;
use crate::transport::{Channel, Transport, UdpTransport};
use crate::wait::WaitFlags;

/// Snapshot of [`Mld`] activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MldStats {
    pub packets: u64,
    pub reports: u64,
    pub records: u64,
    pub malformed: u64,
    pub joins: u64,
    pub parts: u64,
    pub notifications_sent: u64,
    pub notifications_skipped: u64,
    pub ticks: u64,
    pub expired_slots: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) packets: AtomicU64,
    pub(crate) reports: AtomicU64,
    pub(crate) records: AtomicU64,
    pub(crate) malformed: AtomicU64,
    pub(crate) joins: AtomicU64,
    pub(crate) parts: AtomicU64,
    pub(crate) notifications_sent: AtomicU64,
    pub(crate) notifications_skipped: AtomicU64,
    pub(crate) ticks: AtomicU64,
    pub(crate) expired_slots: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MldStats {
        MldStats {
            packets: self.packets.load(Ordering::Relaxed),
            reports: self.reports.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            parts: self.parts.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_skipped: self.notifications_skipped.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            expired_slots: self.expired_slots.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the context handle and every background loop.
#[derive(Debug)]
pub(crate) struct MldInner {
    pub(crate) config: MldConfig,
    ifaces: Vec<u32>,
    filters: Vec<RwLock<MembershipFilter>>,
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) queue: JobQueue,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) locals: Arc<dyn LocalAddresses>,
    pub(crate) counters: Counters,
}

impl MldInner {
    /// Filter slot of a tracked interface.
    pub(crate) fn slot(&self, ifindex: u32) -> Result<usize> {
        self.ifaces
            .iter()
            .position(|&i| i == ifindex)
            .ok_or(Error::InvalidInterface(ifindex))
    }

    /// Slots covered by `ifindex`; 0 selects all of them.
    pub(crate) fn slots(&self, ifindex: u32) -> Result<Vec<usize>> {
        if ifindex == 0 {
            Ok((0..self.ifaces.len()).collect())
        } else {
            Ok(vec![self.slot(ifindex)?])
        }
    }

    pub(crate) fn ifindex_at(&self, slot: usize) -> u32 {
        self.ifaces[slot]
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.ifaces.len()
    }

    pub(crate) fn filter(&self, slot: usize) -> &RwLock<MembershipFilter> {
        &self.filters[slot]
    }

    pub(crate) fn contains(&self, slot: usize, addr: &Ipv6Addr) -> bool {
        self.filters[slot].read().contains(addr)
    }

    /// Add and publish JOIN on transition. The filter lock is released
    /// before anything is sent.
    pub(crate) fn add(&self, slot: usize, addr: &Ipv6Addr) -> bool {
        let added = self.filters[slot].write().add(addr);
        self.announce_join(slot, addr, added)
    }

    /// Add a reported group with its timers already at full timeout.
    ///
    /// Both vectors change under one write lock, so a decay pass never sees
    /// the new group counters next to zero timers.
    pub(crate) fn join(&self, slot: usize, addr: &Ipv6Addr) -> bool {
        let added = {
            let mut filter = self.filters[slot].write();
            let added = filter.add(addr);
            filter.timer_refresh(addr, self.config.timeout);
            added
        };
        self.announce_join(slot, addr, added)
    }

    fn announce_join(&self, slot: usize, addr: &Ipv6Addr, added: bool) -> bool {
        if added {
            Counters::bump(&self.counters.joins);
            log::debug!(
                "[mld] {} joined on {}",
                addr,
                sys::ifname(self.ifaces[slot])
            );
            self.notify(slot, addr, Event::Join);
        }
        added
    }

    /// Delete and publish PART on transition.
    pub(crate) fn del(&self, slot: usize, addr: &Ipv6Addr) -> bool {
        let removed = self.filters[slot].write().del(addr);
        if removed {
            Counters::bump(&self.counters.parts);
            log::debug!(
                "[mld] {} left on {}",
                addr,
                sys::ifname(self.ifaces[slot])
            );
            self.notify(slot, addr, Event::Part);
        }
        removed
    }

    /// Record interest in a notification channel address without publishing
    /// anything, and keep it alive for one full timeout.
    pub(crate) fn register(&self, slot: usize, addr: &Ipv6Addr) {
        let mut filter = self.filters[slot].write();
        filter.add(addr);
        filter.timer_refresh(addr, self.config.timeout);
    }

    /// Raise the timer of `addr` on a worker.
    pub(crate) fn schedule_refresh(self: &Arc<Self>, slot: usize, addr: Ipv6Addr) -> Arc<Job> {
        let inner = Arc::clone(self);
        self.queue.push_new(move || {
            inner.filters[slot]
                .write()
                .timer_refresh(&addr, inner.config.timeout);
        })
    }
}

/// Handle to a running snooper. Dropping it stops everything.
#[derive(Debug)]
pub struct Mld {
    inner: Arc<MldInner>,
}

impl Mld {
    pub fn builder() -> MldBuilder {
        MldBuilder::default()
    }

    /// Snoop on every multicast-capable interface with `config`.
    pub fn start(config: MldConfig) -> Result<Self> {
        Self::builder().config(config).start()
    }

    /// Raise the stop signal, discard pending jobs and join the workers.
    ///
    /// Blocked waits return [`Error::Stopped`]; watches exit at their next
    /// receive timeout.
    pub fn stop(&self) {
        if !self.inner.stop.is_stopped() {
            log::debug!("[mld] stopping");
        }
        self.inner.stop.stop();
        self.inner.queue.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_stopped()
    }

    /// Cloneable handle for signal handlers.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.inner.stop))
    }

    /// Block until the snooper is stopped (by a handle or by a fatal
    /// listener error).
    pub fn wait_stopped(&self) {
        self.inner.stop.wait();
    }

    pub fn config(&self) -> &MldConfig {
        &self.inner.config
    }

    /// Tracked interface indices, in slot order.
    pub fn interfaces(&self) -> &[u32] {
        &self.inner.ifaces
    }

    /// Filter slot of `ifindex`.
    pub fn slot(&self, ifindex: u32) -> Result<usize> {
        self.inner.slot(ifindex)
    }

    pub fn stats(&self) -> MldStats {
        self.inner.counters.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<MldInner> {
        &self.inner
    }

    /// Add `group` on `ifindex`, publishing JOIN if it was absent.
    pub fn filter_add(&self, ifindex: u32, group: &Ipv6Addr) -> Result<bool> {
        let slot = self.inner.slot(ifindex)?;
        Ok(self.inner.add(slot, group))
    }

    /// Remove `group` on `ifindex`, publishing PART if it was present.
    pub fn filter_del(&self, ifindex: u32, group: &Ipv6Addr) -> Result<bool> {
        let slot = self.inner.slot(ifindex)?;
        Ok(self.inner.del(slot, group))
    }

    /// Membership test; `ifindex == 0` checks every tracked interface.
    pub fn filter_contains(&self, ifindex: u32, group: &Ipv6Addr) -> Result<bool> {
        Ok(self
            .inner
            .slots(ifindex)?
            .into_iter()
            .any(|slot| self.inner.contains(slot, group)))
    }

    /// Timer value at the first hash index of `group`.
    pub fn timer_get(&self, ifindex: u32, group: &Ipv6Addr) -> Result<u8> {
        let slot = self.inner.slot(ifindex)?;
        Ok(self.inner.filter(slot).read().timer_get(group))
    }

    /// Overwrite every timer slot of `group`.
    pub fn timer_set(&self, ifindex: u32, group: &Ipv6Addr, val: u8) -> Result<()> {
        let slot = self.inner.slot(ifindex)?;
        self.inner.filter(slot).write().timer_set(group, val);
        Ok(())
    }

    /// Schedule a refresh of `group` to the configured timeout.
    pub fn timer_refresh(&self, ifindex: u32, group: &Ipv6Addr) -> Result<Arc<Job>> {
        let slot = self.inner.slot(ifindex)?;
        Ok(self.inner.schedule_refresh(slot, *group))
    }

    /// Run one decay pass over every interface on the calling thread.
    ///
    /// Returns the number of group slots that expired.
    pub fn timer_tick(&self) -> usize {
        timer::decay_all(&self.inner)
    }

    /// Apply one MLDv2 record received on `ifindex`.
    pub fn apply_record(&self, ifindex: u32, record: &AddressRecord) -> Result<RecordAction> {
        let slot = self.inner.slot(ifindex)?;
        Ok(snoop::apply_record(&self.inner, slot, record))
    }

    /// Apply a decoded listener report received on `ifindex`.
    pub fn handle_report(&self, ifindex: u32, report: &ListenerReport) -> Result<Vec<RecordAction>> {
        let slot = self.inner.slot(ifindex)?;
        Ok(snoop::handle_report(&self.inner, slot, report))
    }

    /// Decode and apply a raw ICMPv6 message received on `ifindex`.
    ///
    /// Messages other than listener reports are ignored.
    pub fn handle_packet(&self, ifindex: u32, buf: &[u8]) -> Result<Vec<RecordAction>> {
        snoop::handle_packet(&self.inner, ifindex, buf)
    }

    /// Channel carrying `events` notifications for `group` (`None` = any).
    pub fn notification_channel(&self, group: Option<&Ipv6Addr>, events: EventMask) -> Channel {
        notify::notification_channel(group, events, self.inner.config.event_port)
    }

    /// Block until someone listens to `group` on `ifindex` (0 = any).
    pub fn wait(&self, ifindex: u32, group: &Ipv6Addr, flags: WaitFlags) -> Result<()> {
        crate::wait::wait(&self.inner, ifindex, group, flags, None)
    }

    /// [`wait`](Self::wait) with a deadline; expiry yields [`Error::TimedOut`].
    pub fn wait_timeout(
        &self,
        ifindex: u32,
        group: &Ipv6Addr,
        flags: WaitFlags,
        timeout: Duration,
    ) -> Result<()> {
        crate::wait::wait(&self.inner, ifindex, group, flags, Some(timeout))
    }

    /// Subscribe to join/part notifications. See [`Watch`].
    pub fn watch<F>(
        &self,
        ifindex: u32,
        group: Option<Ipv6Addr>,
        events: EventMask,
        callback: F,
    ) -> Result<Watch>
    where
        F: Fn(&notify::WatchEvent, &notify::WatchInfo) + Send + Sync + 'static,
    {
        let callback: WatchCallback = Arc::new(callback);
        Watch::start_new(Arc::clone(&self.inner), ifindex, group, events, callback)
    }
}

impl Drop for Mld {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Configures and creates an [`Mld`].
#[derive(Debug)]
pub struct MldBuilder {
    config: MldConfig,
    interfaces: Vec<u32>,
    transport: Arc<dyn Transport>,
    locals: Arc<dyn LocalAddresses>,
    ticker: bool,
}

impl Default for MldBuilder {
    fn default() -> Self {
        Self {
            config: MldConfig::default(),
            interfaces: Vec::new(),
            transport: Arc::new(UdpTransport::new()),
            locals: Arc::new(SystemAddresses),
            ticker: true,
        }
    }
}

impl MldBuilder {
    #[must_use]
    pub fn config(mut self, config: MldConfig) -> Self {
        self.config = config;
        self
    }

    /// Track `ifindex`. Without any, `start()` discovers interfaces.
    #[must_use]
    pub fn interface(mut self, ifindex: u32) -> Self {
        if !self.interfaces.contains(&ifindex) {
            self.interfaces.push(ifindex);
        }
        self
    }

    #[must_use]
    pub fn interfaces<I: IntoIterator<Item = u32>>(mut self, ifaces: I) -> Self {
        for ifindex in ifaces {
            self = self.interface(ifindex);
        }
        self
    }

    /// Notification transport (default: [`UdpTransport`]).
    #[must_use]
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Local address oracle (default: [`SystemAddresses`]).
    #[must_use]
    pub fn local_addresses<L: LocalAddresses + 'static>(mut self, locals: L) -> Self {
        self.locals = Arc::new(locals);
        self
    }

    /// Run the periodic decay ticker (default: on).
    #[must_use]
    pub fn ticker(mut self, on: bool) -> Self {
        self.ticker = on;
        self
    }

    /// Create an idle context over the configured interfaces, without a
    /// raw socket. Reports are fed through [`Mld::handle_packet`].
    pub fn build(self) -> Result<Mld> {
        if self.interfaces.is_empty() {
            return Err(Error::NoInterfaces);
        }
        let ticker = self.ticker;
        let inner = self.into_inner(usize::from(ticker))?;
        if ticker {
            timer::spawn_ticker(&inner);
        }
        Ok(Mld { inner })
    }

    /// Open the raw socket, join `ff02::16` on each interface (discovering
    /// them if none were configured) and start listening.
    pub fn start(mut self) -> Result<Mld> {
        self.config.validate()?;

        let candidates = if self.interfaces.is_empty() {
            snoop::multicast_interfaces()?
        } else {
            std::mem::take(&mut self.interfaces)
        };

        let mut socket = RawSocket::open()?;
        for ifindex in candidates {
            if let Err(e) = socket.join(ifindex) {
                log::warn!(
                    "[mld] skipping {} ({}): join failed: {}",
                    sys::ifname(ifindex),
                    ifindex,
                    e
                );
            }
        }
        if socket.joined().is_empty() {
            return Err(Error::NoInterfaces);
        }
        self.interfaces = socket.joined().to_vec();

        let ticker = self.ticker;
        let inner = self.into_inner(1 + usize::from(ticker))?;
        snoop::spawn_listener(&inner, socket);
        if ticker {
            timer::spawn_ticker(&inner);
        }
        log::info!(
            "[mld] snooping on {} interface(s): {:?}",
            inner.ifaces.len(),
            inner.ifaces
        );
        Ok(Mld { inner })
    }

    fn into_inner(self, long_running: usize) -> Result<Arc<MldInner>> {
        let config = self.config;
        config.validate()?;
        if config.workers <= long_running {
            return Err(Error::InvalidConfig(format!(
                "{} workers cannot host {} long-running loops plus timer jobs",
                config.workers, long_running
            )));
        }
        if self.interfaces.len() > IFACE_MAX {
            return Err(Error::InvalidConfig(format!(
                "{} interfaces exceed the limit of {}",
                self.interfaces.len(),
                IFACE_MAX
            )));
        }
        if self.interfaces.contains(&0) {
            return Err(Error::InvalidInterface(0));
        }

        let filters = self
            .interfaces
            .iter()
            .map(|_| {
                MembershipFilter::new(config.bloom_size, config.bloom_hashes).map(RwLock::new)
            })
            .collect::<Result<Vec<_>>>()?;
        let queue = JobQueue::new(config.workers)?;

        Ok(Arc::new(MldInner {
            config,
            ifaces: self.interfaces,
            filters,
            stop: StopSignal::shared(),
            queue,
            transport: self.transport,
            locals: self.locals,
            counters: Counters::default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn small() -> MldConfig {
        MldConfig::default().with_bloom_size(4096).with_workers(2)
    }

    fn grp(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_requires_interfaces() {
        let err = Mld::builder().config(small()).build().unwrap_err();
        assert!(matches!(err, Error::NoInterfaces));
    }

    #[test]
    fn test_rejects_interface_zero() {
        let err = Mld::builder()
            .config(small())
            .interface(0)
            .ticker(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInterface(0)));
    }

    #[test]
    fn test_ticker_needs_spare_worker() {
        let err = Mld::builder()
            .config(small().with_workers(1))
            .interface(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_slots_follow_builder_order() {
        let mld = Mld::builder()
            .config(small())
            .interfaces([7, 3, 7])
            .transport(MemoryTransport::new())
            .ticker(false)
            .build()
            .unwrap();
        assert_eq!(mld.interfaces(), &[7, 3]);
        assert_eq!(mld.slot(3).unwrap(), 1);
        assert!(matches!(mld.slot(4), Err(Error::InvalidInterface(4))));
    }

    #[test]
    fn test_filter_ops_by_ifindex() {
        let mld = Mld::builder()
            .config(small())
            .interfaces([1, 2])
            .transport(MemoryTransport::new())
            .ticker(false)
            .build()
            .unwrap();
        let g = grp("ff3e::42");

        assert!(mld.filter_add(2, &g).unwrap());
        assert!(mld.filter_contains(2, &g).unwrap());
        assert!(!mld.filter_contains(1, &g).unwrap());
        assert!(mld.filter_contains(0, &g).unwrap());
        assert!(mld.filter_add(9, &g).is_err());

        mld.timer_set(2, &g, 7).unwrap();
        assert_eq!(mld.timer_get(2, &g).unwrap(), 7);
        mld.timer_refresh(2, &g).unwrap().wait();
        assert_eq!(mld.timer_get(2, &g).unwrap(), 125);

        assert!(mld.filter_del(2, &g).unwrap());
        assert!(!mld.filter_contains(0, &g).unwrap());

        let stats = mld.stats();
        assert_eq!(stats.joins, 1);
        assert_eq!(stats.parts, 1);
    }

    #[test]
    fn test_reported_group_survives_decay_before_refresh() {
        use crate::protocol::RecordType;

        let mld = Mld::builder()
            .config(MldConfig::default().with_bloom_size(4096).with_workers(1))
            .interface(1)
            .transport(MemoryTransport::new())
            .ticker(false)
            .build()
            .unwrap();
        let g = grp("ff3e::1234");

        // Hold the only worker so the queued refresh cannot run yet.
        let (release, gate) = crossbeam::channel::bounded::<()>(0);
        let blocker = mld.inner.queue.push_new(move || {
            let _ = gate.recv();
        });

        let record = AddressRecord::new(RecordType::ModeIsExclude, g, vec![]);
        let action = mld.apply_record(1, &record).unwrap();
        assert!(mld.filter_contains(1, &g).unwrap());
        assert_eq!(mld.timer_get(1, &g).unwrap(), 125);

        mld.timer_tick();
        assert!(mld.filter_contains(1, &g).unwrap());
        assert_eq!(mld.timer_get(1, &g).unwrap(), 124);

        release.send(()).unwrap();
        blocker.wait();
        match action {
            RecordAction::Add { joined, refresh, .. } => {
                assert!(joined);
                refresh.wait();
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(mld.filter_contains(1, &g).unwrap());
        assert_eq!(mld.timer_get(1, &g).unwrap(), 125);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mld = Mld::builder()
            .config(small())
            .interface(1)
            .transport(MemoryTransport::new())
            .build()
            .unwrap();
        let handle = mld.stop_handle();
        assert!(!handle.is_stopped());
        mld.stop();
        mld.stop();
        assert!(mld.is_stopped());
        assert!(handle.is_stopped());
        mld.wait_stopped();
    }
}

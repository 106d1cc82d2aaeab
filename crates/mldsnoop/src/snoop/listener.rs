// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Report receive loop and record application.
//!
//! # Architecture
//!
//! ```text
//! mio::poll(listen_poll) -> recvmsg (drain) -> PKTINFO ifindex -> slot
//!     -> ListenerReport::parse -> apply_record -> filter add/del + refresh job
//! ```
//!
//! The loop runs as a long-lived job on the snooper's queue and returns
//! within one poll interval after stop is raised.

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::Ipv6Addr;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use super::RawSocket;
use crate::config::BUFSIZE;
use crate::error::{Error, Result};
use crate::job::Job;
use crate::mld::{Counters, MldInner};
use crate::protocol::{AddressRecord, ListenerReport, ParseError, RecordType};
use crate::sys;

const RAW_TOKEN: Token = Token(0);

/// Effect of one address record on the filter.
#[derive(Debug, Clone)]
pub enum RecordAction {
    /// Group added (or already present) and its timer refresh scheduled.
    Add {
        group: Ipv6Addr,
        /// `true` if the group was absent and JOIN was published.
        joined: bool,
        /// Pending timer refresh; completes on a worker.
        refresh: Arc<Job>,
    },
    /// INCLUDE with an empty source list: the group left.
    Delete {
        group: Ipv6Addr,
        /// `true` if the group was present and PART was published.
        removed: bool,
    },
    /// INCLUDE naming only foreign sources.
    NoOp { group: Ipv6Addr },
    /// ALLOW, BLOCK and unknown record types.
    Ignored {
        group: Ipv6Addr,
        record_type: RecordType,
    },
}

impl RecordAction {
    pub fn group(&self) -> &Ipv6Addr {
        match self {
            Self::Add { group, .. }
            | Self::Delete { group, .. }
            | Self::NoOp { group }
            | Self::Ignored { group, .. } => group,
        }
    }
}

pub(crate) fn apply_record(inner: &Arc<MldInner>, slot: usize, record: &AddressRecord) -> RecordAction {
    Counters::bump(&inner.counters.records);
    let group = record.group;

    match record.record_type {
        RecordType::ModeIsInclude | RecordType::ChangeToIncludeMode => {
            if record.sources.is_empty() {
                let removed = inner.del(slot, &group);
                RecordAction::Delete { group, removed }
            } else if record.sources.iter().any(|src| inner.locals.is_local(src)) {
                add_with_refresh(inner, slot, group)
            } else {
                log::trace!("[snoop] {} INCLUDE lists no local source", group);
                RecordAction::NoOp { group }
            }
        }
        RecordType::ModeIsExclude | RecordType::ChangeToExcludeMode => {
            add_with_refresh(inner, slot, group)
        }
        record_type @ (RecordType::AllowNewSources
        | RecordType::BlockOldSources
        | RecordType::Unknown(_)) => {
            log::trace!("[snoop] {} ignoring {:?} record", group, record_type);
            RecordAction::Ignored { group, record_type }
        }
    }
}

fn add_with_refresh(inner: &Arc<MldInner>, slot: usize, group: Ipv6Addr) -> RecordAction {
    let joined = inner.join(slot, &group);
    let refresh = inner.schedule_refresh(slot, group);
    RecordAction::Add {
        group,
        joined,
        refresh,
    }
}

pub(crate) fn handle_report(
    inner: &Arc<MldInner>,
    slot: usize,
    report: &ListenerReport,
) -> Vec<RecordAction> {
    Counters::bump(&inner.counters.reports);
    report
        .records
        .iter()
        .map(|record| apply_record(inner, slot, record))
        .collect()
}

pub(crate) fn handle_packet(inner: &Arc<MldInner>, ifindex: u32, buf: &[u8]) -> Result<Vec<RecordAction>> {
    let slot = inner.slot(ifindex)?;
    Counters::bump(&inner.counters.packets);

    match ListenerReport::parse(buf) {
        Ok(report) => Ok(handle_report(inner, slot, &report)),
        Err(ParseError::NotAReport(kind)) => {
            log::trace!("[snoop] ignoring ICMPv6 type {}", kind);
            Ok(Vec::new())
        }
        Err(e) => {
            Counters::bump(&inner.counters.malformed);
            Err(e.into())
        }
    }
}

/// Run the listener on a worker. A fatal error raises the stop signal.
pub(crate) fn spawn_listener(inner: &Arc<MldInner>, socket: RawSocket) {
    let listener = Arc::clone(inner);
    inner.queue.push_new(move || {
        if let Err(e) = run_listener(&listener, socket) {
            log::error!("[snoop] listener failed: {}", e);
            listener.stop.stop();
        }
    });
}

fn run_listener(inner: &Arc<MldInner>, socket: RawSocket) -> Result<()> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(16);
    let fd = socket.as_raw_fd();
    poll.registry()
        .register(&mut SourceFd(&fd), RAW_TOKEN, Interest::READABLE)?;

    let mut buf = vec![0u8; BUFSIZE];
    log::debug!(
        "[snoop] listener started on fd={} thread={:?}",
        fd,
        std::thread::current().name()
    );

    while !inner.stop.is_stopped() {
        if let Err(e) = poll.poll(&mut events, Some(inner.config.listen_poll)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e.into());
        }

        for event in events.iter() {
            if event.token() != RAW_TOKEN {
                continue;
            }

            // Readiness is edge-triggered: drain until the socket is empty.
            loop {
                let rx = match socket.recv(&mut buf) {
                    Ok(rx) => rx,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::debug!("[snoop] recvmsg error: {}", e);
                        break;
                    }
                };

                let Some(ifindex) = rx.ifindex else {
                    log::error!("[snoop] datagram from {} carries no IPV6_PKTINFO", rx.src);
                    return Err(Error::MissingPacketInfo);
                };
                if inner.slot(ifindex).is_err() {
                    log::debug!(
                        "[snoop] dropping datagram from {} on untracked {} ({})",
                        rx.src,
                        sys::ifname(ifindex),
                        ifindex
                    );
                    continue;
                }

                if let Err(e) = handle_packet(inner, ifindex, &buf[..rx.len]) {
                    log::warn!(
                        "[snoop] dropping datagram from {} on {}: {}",
                        rx.src,
                        sys::ifname(ifindex),
                        e
                    );
                }
            }
        }
    }

    log::debug!("[snoop] listener stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MldConfig;
    use crate::snoop::StaticAddresses;
    use crate::transport::MemoryTransport;
    use crate::Mld;

    fn grp(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn mld(locals: StaticAddresses) -> Mld {
        Mld::builder()
            .config(MldConfig::default().with_bloom_size(4096).with_workers(2))
            .interface(3)
            .transport(MemoryTransport::new())
            .local_addresses(locals)
            .ticker(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_include_without_sources_deletes() {
        let mld = mld(StaticAddresses::default());
        let g = grp("ff3e::1");
        mld.filter_add(3, &g).unwrap();

        let rec = AddressRecord::new(RecordType::ChangeToIncludeMode, g, vec![]);
        match mld.apply_record(3, &rec).unwrap() {
            RecordAction::Delete { removed, .. } => assert!(removed),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!mld.filter_contains(3, &g).unwrap());
    }

    #[test]
    fn test_include_with_local_source_adds() {
        let me = grp("fe80::10");
        let mld = mld(StaticAddresses::new([me]));
        let g = grp("ff3e::2");

        let rec = AddressRecord::new(RecordType::ModeIsInclude, g, vec![grp("fe80::99"), me]);
        match mld.apply_record(3, &rec).unwrap() {
            RecordAction::Add { joined, refresh, .. } => {
                assert!(joined);
                refresh.wait();
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(mld.filter_contains(3, &g).unwrap());
        assert_eq!(mld.timer_get(3, &g).unwrap(), mld.config().timeout);
    }

    #[test]
    fn test_include_with_foreign_sources_is_noop() {
        let mld = mld(StaticAddresses::default());
        let g = grp("ff3e::3");
        let rec = AddressRecord::new(RecordType::ModeIsInclude, g, vec![grp("fe80::99")]);
        assert!(matches!(mld.apply_record(3, &rec).unwrap(), RecordAction::NoOp { .. }));
        assert!(!mld.filter_contains(3, &g).unwrap());
    }

    #[test]
    fn test_allow_and_block_are_ignored() {
        let mld = mld(StaticAddresses::default());
        let g = grp("ff3e::4");
        for t in [RecordType::AllowNewSources, RecordType::BlockOldSources] {
            let rec = AddressRecord::new(t, g, vec![]);
            assert!(matches!(
                mld.apply_record(3, &rec).unwrap(),
                RecordAction::Ignored { .. }
            ));
        }
        assert!(!mld.filter_contains(3, &g).unwrap());
    }

    #[test]
    fn test_packet_paths() {
        let mld = mld(StaticAddresses::default());
        let report = ListenerReport {
            records: vec![AddressRecord::new(
                RecordType::ModeIsExclude,
                grp("ff3e::5"),
                vec![],
            )],
        };
        let actions = mld.handle_packet(3, &report.to_bytes()).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].group(), &grp("ff3e::5"));

        // Other ICMPv6 types are skipped silently.
        assert!(mld.handle_packet(3, &[135, 0, 0, 0, 0, 0, 0, 0]).unwrap().is_empty());
        assert!(matches!(
            mld.handle_packet(3, &[143, 0, 0]),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            mld.handle_packet(4, &report.to_bytes()),
            Err(Error::InvalidInterface(4))
        ));

        let stats = mld.stats();
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.reports, 1);
        assert_eq!(stats.malformed, 1);
    }
}

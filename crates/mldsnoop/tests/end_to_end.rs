// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Report-to-expiry scenarios.
//!
//! Most tests feed encoded reports through [`Mld::handle_packet`] and drive
//! decay by hand. The raw-socket test needs CAP_NET_RAW.
//!
//! # Running
//!
//! ```bash
//! cargo test --test end_to_end
//!
//! # Including the raw socket test
//! sudo cargo test --test end_to_end -- --ignored
//! ```

use mldsnoop::{
    AddressRecord, Error, EventMask, ListenerReport, MemoryTransport, Mld, MldConfig,
    RecordAction, RecordType, StaticAddresses, WaitFlags,
};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn grp(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

fn report(records: Vec<AddressRecord>) -> Vec<u8> {
    ListenerReport { records }.to_bytes()
}

fn build(transport: &MemoryTransport, locals: StaticAddresses) -> Mld {
    Mld::builder()
        .config(MldConfig::default().with_bloom_size(1 << 18).with_workers(2))
        .interfaces([4, 6])
        .transport(transport.clone())
        .local_addresses(locals)
        .ticker(false)
        .build()
        .unwrap()
}

fn wait_refreshes(actions: &[RecordAction]) {
    for action in actions {
        if let RecordAction::Add { refresh, .. } = action {
            refresh.wait();
        }
    }
}

#[test]
fn test_exclude_report_lives_for_timeout_ticks() {
    let mld = build(&MemoryTransport::new(), StaticAddresses::default());
    let g = grp("ff3e::1234");

    let pkt = report(vec![AddressRecord::new(RecordType::ModeIsExclude, g, vec![])]);
    let actions = mld.handle_packet(4, &pkt).unwrap();
    assert!(matches!(actions[0], RecordAction::Add { joined: true, .. }));
    wait_refreshes(&actions);

    assert!(mld.filter_contains(4, &g).unwrap());
    assert!(!mld.filter_contains(6, &g).unwrap());
    assert_eq!(mld.timer_get(4, &g).unwrap(), 125);

    for _ in 0..124 {
        mld.timer_tick();
    }
    assert!(mld.filter_contains(4, &g).unwrap());

    for _ in 0..6 {
        mld.timer_tick();
    }
    assert!(!mld.filter_contains(4, &g).unwrap());
}

#[test]
fn test_repeated_reports_keep_group_alive() {
    let mld = build(&MemoryTransport::new(), StaticAddresses::default());
    let g = grp("ff3e::99");
    let pkt = report(vec![AddressRecord::new(RecordType::ChangeToExcludeMode, g, vec![])]);

    for _ in 0..5 {
        wait_refreshes(&mld.handle_packet(6, &pkt).unwrap());
        for _ in 0..100 {
            mld.timer_tick();
        }
        assert!(mld.filter_contains(6, &g).unwrap());
    }
    assert_eq!(mld.stats().joins, 1);
}

#[test]
fn test_mixed_report() {
    let me = grp("2001:db8::1");
    let mld = build(&MemoryTransport::new(), StaticAddresses::new([me]));
    let stale = grp("ff3e::10");
    mld.filter_add(4, &stale).unwrap();

    let pkt = report(vec![
        AddressRecord::new(RecordType::ChangeToIncludeMode, stale, vec![]),
        AddressRecord::new(RecordType::ModeIsInclude, grp("ff3e::11"), vec![me]),
        AddressRecord::new(RecordType::ModeIsInclude, grp("ff3e::12"), vec![grp("2001:db8::2")]),
        AddressRecord::new(RecordType::AllowNewSources, grp("ff3e::13"), vec![me]),
        AddressRecord::new(RecordType::BlockOldSources, grp("ff3e::14"), vec![]),
    ]);
    let actions = mld.handle_packet(4, &pkt).unwrap();
    wait_refreshes(&actions);

    assert!(matches!(actions[0], RecordAction::Delete { removed: true, .. }));
    assert!(matches!(actions[1], RecordAction::Add { .. }));
    assert!(matches!(actions[2], RecordAction::NoOp { .. }));
    assert!(matches!(actions[3], RecordAction::Ignored { .. }));
    assert!(matches!(actions[4], RecordAction::Ignored { .. }));

    assert!(!mld.filter_contains(4, &stale).unwrap());
    assert!(mld.filter_contains(4, &grp("ff3e::11")).unwrap());
    for g in ["ff3e::12", "ff3e::13", "ff3e::14"] {
        assert!(!mld.filter_contains(0, &grp(g)).unwrap());
    }
}

#[test]
fn test_truncated_report_changes_nothing() {
    let mld = build(&MemoryTransport::new(), StaticAddresses::default());
    let g = grp("ff3e::20");
    let mut pkt = report(vec![AddressRecord::new(
        RecordType::ModeIsExclude,
        g,
        vec![grp("fe80::1")],
    )]);
    pkt.truncate(pkt.len() - 4);

    assert!(matches!(mld.handle_packet(4, &pkt), Err(Error::Malformed(_))));
    assert!(!mld.filter_contains(4, &g).unwrap());
}

#[test]
fn test_report_wakes_waiter_and_watch() {
    let transport = MemoryTransport::new();
    let mld = Arc::new(build(&transport, StaticAddresses::default()));
    let g = grp("ff3e::30");
    let joins = Arc::new(AtomicUsize::new(0));

    let j = Arc::clone(&joins);
    let _watch = mld
        .watch(0, None, EventMask::JOIN, move |ev, _| {
            if ev.ifindex == 6 {
                j.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    let waiter = {
        let mld = Arc::clone(&mld);
        thread::spawn(move || mld.wait_timeout(6, &g, WaitFlags::NONE, Duration::from_secs(10)))
    };
    thread::sleep(Duration::from_millis(50));

    let pkt = report(vec![AddressRecord::new(RecordType::ModeIsExclude, g, vec![])]);
    mld.handle_packet(6, &pkt).unwrap();

    waiter.join().unwrap().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while joins.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(joins.load(Ordering::SeqCst), 1);
}

#[test]
#[ignore = "requires root privileges"]
fn test_raw_socket_snooper_starts_and_stops() {
    // SAFETY: geteuid has no preconditions
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("skipping: not root");
        return;
    }

    let mld = match Mld::builder()
        .config(MldConfig::default().with_bloom_size(1 << 16))
        .transport(MemoryTransport::new())
        .start()
    {
        Ok(mld) => mld,
        Err(Error::NoInterfaces) => {
            eprintln!("skipping: no multicast-capable interface");
            return;
        }
        Err(e) => panic!("start failed: {}", e),
    };
    assert!(!mld.interfaces().is_empty());

    thread::sleep(Duration::from_millis(200));
    let start = Instant::now();
    mld.stop();
    assert!(mld.is_stopped());
    assert!(start.elapsed() < Duration::from_secs(5));
}

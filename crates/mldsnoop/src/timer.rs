// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic membership decay.
//!
//! A ticker loop sleeps on an absolute deadline and pushes one decay job per
//! interval onto the snooper's queue. A decay pass walks every interface
//! filter in chunks of [`DECAY_CHUNK`] lanes, holding the filter's write
//! lock for one chunk at a time so report handling interleaves with a pass
//! over a large filter.
//!
//! ```text
//! ticker ──(every timer_interval)──▶ JobQueue ──▶ decay_all()
//!                                                  ├─ iface 0: lanes [0..4096) [4096..8192) ...
//!                                                  └─ iface 1: ...
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::job::Job;
use crate::mld::MldInner;

/// Lanes decayed per write-lock hold.
pub const DECAY_CHUNK: usize = 4096;

/// Decay every tracked filter once. Returns the number of expired slots.
///
/// Stops between chunks once the stop signal is raised. Only complete
/// passes count as ticks.
pub(crate) fn decay_all(inner: &MldInner) -> usize {
    let mut expired = 0;
    let mut complete = true;

    'slots: for slot in 0..inner.slot_count() {
        let lanes = inner.filter(slot).read().lanes();
        let mut start = 0;
        while start < lanes {
            if inner.stop.is_stopped() {
                complete = false;
                break 'slots;
            }
            let end = (start + DECAY_CHUNK).min(lanes);
            expired += inner.filter(slot).write().decay_lanes(start..end);
            start = end;
        }
    }

    if complete {
        inner.counters.ticks.fetch_add(1, Ordering::Relaxed);
    } else {
        log::debug!("[timer] decay pass interrupted by stop");
    }
    inner
        .counters
        .expired_slots
        .fetch_add(expired as u64, Ordering::Relaxed);
    if expired > 0 {
        log::trace!("[timer] {} slot(s) expired", expired);
    }
    expired
}

/// Deadline after `prev`. Re-anchors on `now` once more than one interval
/// behind.
fn next_deadline(prev: Instant, interval: Duration, now: Instant) -> Instant {
    let next = prev + interval;
    if now > next + interval {
        now + interval
    } else {
        next
    }
}

/// Start the ticker as a long-running job.
pub(crate) fn spawn_ticker(inner: &Arc<MldInner>) {
    let ticker = Arc::clone(inner);
    inner.queue.push_new(move || run_ticker(&ticker));
}

fn run_ticker(inner: &Arc<MldInner>) {
    let interval = inner.config.timer_interval;
    let mut pending: Option<Arc<Job>> = None;
    let mut next = Instant::now() + interval;
    log::debug!("[timer] ticker started, interval {:?}", interval);

    while !inner.stop.wait_until(next) {
        // One pass in flight at a time; a slow pass absorbs the tick.
        if pending.as_ref().map_or(true, |job| job.is_done()) {
            let decay = Arc::clone(inner);
            pending = Some(inner.queue.push_new(move || {
                decay_all(&decay);
            }));
        } else {
            log::debug!("[timer] previous decay still running, skipping tick");
        }

        let now = Instant::now();
        let following = next_deadline(next, interval, now);
        if following != next + interval {
            log::debug!("[timer] ticker fell behind by {:?}, resyncing", now - next);
        }
        next = following;
    }

    log::debug!("[timer] ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MldConfig;
    use crate::transport::MemoryTransport;
    use crate::Mld;
    use std::net::Ipv6Addr;
    use std::thread;

    fn grp(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_tick_expires_after_timeout() {
        // Spans several chunks.
        let mld = Mld::builder()
            .config(
                MldConfig::default()
                    .with_bloom_size(3 * super::DECAY_CHUNK * 16 + 5)
                    .with_timeout(3)
                    .with_workers(2),
            )
            .interfaces([1, 2])
            .transport(MemoryTransport::new())
            .ticker(false)
            .build()
            .unwrap();
        let g = grp("ff3e::77");
        mld.filter_add(2, &g).unwrap();
        mld.timer_refresh(2, &g).unwrap().wait();

        mld.timer_tick();
        mld.timer_tick();
        assert!(mld.filter_contains(2, &g).unwrap());
        assert_eq!(mld.timer_get(2, &g).unwrap(), 1);

        assert!(mld.timer_tick() >= 1);
        assert!(!mld.filter_contains(2, &g).unwrap());
        assert_eq!(mld.stats().ticks, 3);
    }

    #[test]
    fn test_tick_clears_groups_without_timer() {
        let mld = Mld::builder()
            .config(MldConfig::default().with_bloom_size(1024).with_workers(2))
            .interface(1)
            .transport(MemoryTransport::new())
            .ticker(false)
            .build()
            .unwrap();
        let g = grp("ff3e::78");
        mld.filter_add(1, &g).unwrap();
        mld.timer_tick();
        assert!(!mld.filter_contains(1, &g).unwrap());
    }

    #[test]
    fn test_ticker_decays_in_background() {
        let mld = Mld::builder()
            .config(
                MldConfig::default()
                    .with_bloom_size(1024)
                    .with_timeout(2)
                    .with_timer_interval(Duration::from_millis(10))
                    .with_workers(3),
            )
            .interface(1)
            .transport(MemoryTransport::new())
            .build()
            .unwrap();
        let g = grp("ff3e::79");
        mld.filter_add(1, &g).unwrap();
        mld.timer_set(1, &g, 2).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while mld.filter_contains(1, &g).unwrap() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!mld.filter_contains(1, &g).unwrap());
        assert!(mld.stats().ticks >= 1);
    }

    #[test]
    fn test_stop_ends_ticker_promptly() {
        let mld = Mld::builder()
            .config(
                MldConfig::default()
                    .with_bloom_size(1024)
                    .with_timer_interval(Duration::from_secs(30))
                    .with_workers(2),
            )
            .interface(1)
            .transport(MemoryTransport::new())
            .build()
            .unwrap();
        let start = Instant::now();
        mld.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stopped_pass_leaves_filters_untouched() {
        let mld = Mld::builder()
            .config(
                MldConfig::default()
                    .with_bloom_size(3 * DECAY_CHUNK * 16 + 5)
                    .with_workers(2),
            )
            .interfaces([1, 2])
            .transport(MemoryTransport::new())
            .ticker(false)
            .build()
            .unwrap();
        let groups: Vec<Ipv6Addr> = (1..=64)
            .map(|i| Ipv6Addr::new(0xff3e, 0, 0, 0, 0, 0, 0, i))
            .collect();
        // Zero timers: any pass that reached these slots would clear them.
        for g in &groups {
            mld.filter_add(1, g).unwrap();
            mld.filter_add(2, g).unwrap();
        }
        let inner = mld.inner();
        let beyond_first_chunk = groups.iter().any(|g| {
            inner.filter(0).read().indices(g).as_slice().iter().any(|&i| i >= DECAY_CHUNK * 16)
        });
        assert!(beyond_first_chunk);

        inner.stop.stop();
        assert_eq!(decay_all(inner), 0);

        for g in &groups {
            assert!(mld.filter_contains(1, g).unwrap());
            assert!(mld.filter_contains(2, g).unwrap());
        }
        let stats = mld.stats();
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.expired_slots, 0);
    }

    #[test]
    fn test_ticker_skips_tick_while_decay_pending() {
        let mld = Mld::builder()
            .config(
                MldConfig::default()
                    .with_bloom_size(1024)
                    .with_timer_interval(Duration::from_millis(5))
                    .with_workers(2),
            )
            .interface(1)
            .transport(MemoryTransport::new())
            .build()
            .unwrap();
        let inner = mld.inner();

        // The ticker holds one worker; park the other one.
        let (release, gate) = crossbeam::channel::bounded::<()>(0);
        let blocker = inner.queue.push_new(move || {
            let _ = gate.recv();
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while inner.queue.len() < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(inner.queue.len(), 1);
        let ticks = mld.stats().ticks;

        // Many intervals pass; the pending pass absorbs every tick.
        thread::sleep(Duration::from_millis(60));
        assert_eq!(inner.queue.len(), 1);
        assert_eq!(mld.stats().ticks, ticks);

        release.send(()).unwrap();
        blocker.wait();
        let deadline = Instant::now() + Duration::from_secs(5);
        while mld.stats().ticks == ticks && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(mld.stats().ticks > ticks);
    }

    #[test]
    fn test_next_deadline_resyncs_when_behind() {
        let interval = Duration::from_secs(1);
        let start = Instant::now();

        // On time, or less than one interval late: keep the cadence.
        assert_eq!(next_deadline(start, interval, start), start + interval);
        assert_eq!(
            next_deadline(start, interval, start + Duration::from_millis(1500)),
            start + interval
        );

        // More than one interval behind: re-anchor on now.
        let late = start + Duration::from_secs(5);
        assert_eq!(next_deadline(start, interval, late), late + interval);
    }
}

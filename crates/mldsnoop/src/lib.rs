// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # mldsnoop - MLDv2 snooping and listener-presence signalling
//!
//! Tracks which IPv6 multicast groups have listeners on which local
//! interfaces by snooping MLDv2 Listener Reports, and lets local processes
//! ask "is anyone listening to this group yet" or subscribe to join/part
//! events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mldsnoop::{Mld, MldConfig, Result, WaitFlags};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     // Needs CAP_NET_RAW for the raw ICMPv6 socket
//!     let mld = Mld::start(MldConfig::from_env())?;
//!
//!     let group = "ff3e::1234".parse().unwrap();
//!     mld.wait_timeout(0, &group, WaitFlags::NONE, Duration::from_secs(10))?;
//!     println!("{} has a listener", group);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! raw ICMPv6 socket ─▶ listener ─▶ ListenerReport::parse ─▶ MembershipFilter (per iface)
//!                                                             │  ▲
//!                      ticker ─▶ JobQueue ─▶ decay ───────────┘  │ refresh jobs
//!                                                             │
//!                                        join/part ─▶ notify ─▶ Transport ─▶ Watch / wait
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Mld`] | Snooper context: filters, workers, listener, ticker |
//! | [`MembershipFilter`] | Counted bloom filter with per-slot decay timers |
//! | [`JobQueue`] | FIFO worker pool driving decay, refresh and the listener |
//! | [`Watch`] | Background join/part subscription |
//! | [`Transport`] | Notification socket abstraction (UDP or in-memory) |

/// Tunables, protocol constants and environment overrides.
pub mod config;
/// Error type and `Result` alias.
pub mod error;
/// Bit vectors, hashing and the membership filter.
pub mod filter;
/// Worker pool and jobs.
pub mod job;
mod mld;
/// Join/part publication, channel derivation and watches.
pub mod notify;
/// MLDv2 report and notification wire formats.
pub mod protocol;
/// Stop signal shared by the background loops.
pub mod signal;
/// Raw socket, interface discovery and report handling.
pub mod snoop;
/// Interface name/index helpers.
pub mod sys;
mod timer;
/// Notification transports.
pub mod transport;
mod wait;

pub use config::MldConfig;
pub use error::{Error, Result};
pub use filter::{BitVector, BloomHasher, MembershipFilter};
pub use job::{Job, JobQueue, JobState, Semaphore};
pub use mld::{Mld, MldBuilder, MldStats};
pub use notify::{Watch, WatchEvent, WatchInfo};
pub use protocol::{AddressRecord, Event, EventMask, ListenerReport, Notification, RecordType};
pub use signal::{StopHandle, StopSignal};
pub use snoop::{LocalAddresses, RecordAction, StaticAddresses, SystemAddresses};
pub use timer::DECAY_CHUNK;
pub use transport::{Channel, MemoryTransport, Transport, UdpTransport};
pub use wait::WaitFlags;

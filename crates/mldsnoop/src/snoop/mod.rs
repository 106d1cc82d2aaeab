// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MLDv2 snooping: raw socket, interface discovery and report handling.

mod ifaddrs;
mod listener;
mod socket;

pub use ifaddrs::{multicast_interfaces, LocalAddresses, StaticAddresses, SystemAddresses};
pub use listener::RecordAction;
pub use socket::{RawSocket, Received};

pub(crate) use listener::{apply_record, handle_packet, handle_report, spawn_listener};

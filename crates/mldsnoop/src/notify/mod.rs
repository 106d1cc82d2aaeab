// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Join/part notifications over link-local multicast.
//!
//! Publishers ([`Mld`](crate::Mld) itself) send a 20-byte
//! [`Notification`](crate::protocol::Notification) to derived channels;
//! subscribers ([`Watch`], blocking waits) join those channels on a
//! [`Transport`](crate::transport::Transport) socket.

mod bus;
mod channel;
mod watch;

pub use bus::publish_channels;
pub use channel::{notification_channel, ANY_GROUP};
pub use watch::{Watch, WatchCallback, WatchEvent, WatchInfo};

pub(crate) use bus::open_subscriber;

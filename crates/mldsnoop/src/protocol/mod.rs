// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire formats: MLDv2 reports in, notifications out.

pub mod notification;
pub mod report;

pub use notification::{Event, EventMask, Notification, NOTIFICATION_LEN};
pub use report::{AddressRecord, ListenerReport, ParseError, RecordType};

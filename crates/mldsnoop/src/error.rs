// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the snooping engine.

use std::io;

use thiserror::Error;

use crate::protocol::ParseError;

/// Errors returned by [`Mld`](crate::Mld) and its components.
#[derive(Debug, Error)]
pub enum Error {
    /// The interface index is not tracked by this snooper.
    #[error("interface {0} is not tracked")]
    InvalidInterface(u32),

    /// Non-blocking wait and nobody is listening yet.
    #[error("no listener yet (would block)")]
    WouldBlock,

    /// Wait deadline expired before a listener appeared.
    #[error("timed out waiting for a listener")]
    TimedOut,

    /// The snooper was stopped while the caller was blocked.
    #[error("snooper stopped")]
    Stopped,

    /// Configuration rejected by [`MldConfig::validate`](crate::MldConfig::validate).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not join the MLDv2 routers group on any interface.
    #[error("no multicast-capable interface could be joined")]
    NoInterfaces,

    /// Kernel delivered a datagram without IPV6_PKTINFO.
    #[error("received packet without IPV6_PKTINFO ancillary data")]
    MissingPacketInfo,

    /// Listener report failed to parse.
    #[error("malformed report: {0}")]
    Malformed(#[from] ParseError),

    /// Socket or thread error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::InvalidInterface(7).to_string(),
            "interface 7 is not tracked"
        );
        assert!(Error::WouldBlock.to_string().contains("would block"));
    }

    #[test]
    fn test_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "raw").into();
        assert!(matches!(err, Error::Io(_)));
    }
}

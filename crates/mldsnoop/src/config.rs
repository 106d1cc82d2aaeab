// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Snooper configuration and protocol constants.
//!
//! # Defaults
//!
//! | Field | Default | Env |
//! |-------|---------|-----|
//! | `bloom_size` | 16 MiB | `MLD_BLOOM_SIZE` |
//! | `bloom_hashes` | 8 | `MLD_BLOOM_HASHES` |
//! | `timeout` | 125 s | `MLD_TIMEOUT` |
//! | `timer_interval` | 1 s | `MLD_TIMER_INTERVAL_MS` |
//! | `workers` | 3 | `MLD_WORKERS` |
//! | `event_port` | 4242 | `MLD_EVENT_PORT` |
//!
//! Each filter allocates two vectors of `bloom_size` bytes per tracked
//! interface, so the default costs 32 MiB per interface. Tests and
//! simulations should shrink it.

use std::net::Ipv6Addr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::MAX_HASHES;

/// Bytes per membership vector.
pub const BLOOM_SZ: usize = 16_777_216;

/// Hash indices per address.
pub const BLOOM_HASHES: usize = 8;

/// Seconds before an unrefreshed membership expires.
pub const MLD_TIMEOUT: u8 = 125;

/// Length of one decay tick.
pub const MLD_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// Port carrying join/part notifications.
pub const MLD_EVENT_SERV: u16 = 4242;

/// Worker pool size.
pub const DEFAULT_WORKERS: usize = 3;

/// Upper bound on tracked interfaces.
pub const IFACE_MAX: usize = 255;

/// Receive buffer for the raw socket.
pub const BUFSIZE: usize = 1500;

/// All MLDv2-capable routers (RFC 3810 5.2.14).
pub const MLD2_CAPABLE_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x16);

/// ICMPv6 type of a Version 2 Multicast Listener Report.
pub const MLD2_LISTEN_REPORT: u8 = 143;

/// Runtime configuration for an [`Mld`](crate::Mld) context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MldConfig {
    /// Bytes per membership vector.
    pub bloom_size: usize,
    /// Hash indices per address (1..=8).
    pub bloom_hashes: usize,
    /// Timer value written by a refresh, in ticks.
    pub timeout: u8,
    /// Decay tick period.
    pub timer_interval: Duration,
    /// Worker threads in the job queue.
    pub workers: usize,
    /// Notification port.
    pub event_port: u16,
    /// Raw socket poll bound.
    pub listen_poll: Duration,
    /// Wait/watch receive bound.
    pub wait_poll: Duration,
}

impl Default for MldConfig {
    fn default() -> Self {
        Self {
            bloom_size: BLOOM_SZ,
            bloom_hashes: BLOOM_HASHES,
            timeout: MLD_TIMEOUT,
            timer_interval: MLD_TIMER_INTERVAL,
            workers: DEFAULT_WORKERS,
            event_port: MLD_EVENT_SERV,
            listen_poll: Duration::from_secs(1),
            wait_poll: Duration::from_millis(100),
        }
    }
}

impl MldConfig {
    /// Set the vector size in bytes.
    #[must_use]
    pub fn with_bloom_size(mut self, bytes: usize) -> Self {
        self.bloom_size = bytes;
        self
    }

    /// Set the number of hash indices.
    #[must_use]
    pub fn with_bloom_hashes(mut self, k: usize) -> Self {
        self.bloom_hashes = k;
        self
    }

    /// Set the refresh timeout in ticks.
    #[must_use]
    pub fn with_timeout(mut self, ticks: u8) -> Self {
        self.timeout = ticks;
        self
    }

    /// Set the decay tick period.
    #[must_use]
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    /// Set the worker pool size.
    #[must_use]
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Set the notification port.
    #[must_use]
    pub fn with_event_port(mut self, port: u16) -> Self {
        self.event_port = port;
        self
    }

    /// Set the wait/watch receive bound.
    #[must_use]
    pub fn with_wait_poll(mut self, poll: Duration) -> Self {
        self.wait_poll = poll;
        self
    }

    /// Create from environment variables.
    ///
    /// Unset or unparsable variables keep their default. The result is not
    /// validated; call [`validate`](Self::validate) before use.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("MLD_BLOOM_SIZE") {
            config.bloom_size = v;
        }
        if let Some(v) = env_parse::<usize>("MLD_BLOOM_HASHES") {
            config.bloom_hashes = v;
        }
        if let Some(v) = env_parse::<u8>("MLD_TIMEOUT") {
            config.timeout = v;
        }
        if let Some(v) = env_parse::<u64>("MLD_TIMER_INTERVAL_MS") {
            config.timer_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("MLD_WORKERS") {
            config.workers = v;
        }
        if let Some(v) = env_parse::<u16>("MLD_EVENT_PORT") {
            config.event_port = v;
        }

        config
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bloom_size == 0 {
            return Err(Error::InvalidConfig("bloom_size must be nonzero".into()));
        }
        if self.bloom_size > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "bloom_size {} exceeds the 32-bit hash range",
                self.bloom_size
            )));
        }
        if self.bloom_hashes == 0 || self.bloom_hashes > MAX_HASHES {
            return Err(Error::InvalidConfig(format!(
                "bloom_hashes must be in 1..={}, got {}",
                MAX_HASHES, self.bloom_hashes
            )));
        }
        if self.timeout == 0 {
            return Err(Error::InvalidConfig("timeout must be nonzero".into()));
        }
        if self.timer_interval.is_zero() {
            return Err(Error::InvalidConfig("timer_interval must be nonzero".into()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be nonzero".into()));
        }
        if self.listen_poll.is_zero() || self.wait_poll.is_zero() {
            return Err(Error::InvalidConfig("poll bounds must be nonzero".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[config] ignoring unparsable {}={:?}", key, val);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let cfg = MldConfig::default();
        assert_eq!(cfg.bloom_size, 16_777_216);
        assert_eq!(cfg.bloom_hashes, 8);
        assert_eq!(cfg.timeout, 125);
        assert_eq!(cfg.timer_interval, Duration::from_secs(1));
        assert_eq!(cfg.event_port, 4242);
        assert_eq!(cfg.workers, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_hash_count() {
        assert!(MldConfig::default().with_bloom_hashes(0).validate().is_err());
        assert!(MldConfig::default().with_bloom_hashes(9).validate().is_err());
        assert!(MldConfig::default().with_bloom_hashes(1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(MldConfig::default().with_bloom_size(0).validate().is_err());
        assert!(MldConfig::default().with_timeout(0).validate().is_err());
        assert!(MldConfig::default().with_workers(0).validate().is_err());
        assert!(MldConfig::default()
            .with_timer_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_routers_group() {
        assert_eq!(MLD2_CAPABLE_ROUTERS, "ff02::16".parse::<Ipv6Addr>().unwrap());
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! mldctl - MLDv2 snooper CLI
//!
//! Snoop listener reports on local interfaces, wait for a group to gain a
//! listener, or watch join/part events. Needs CAP_NET_RAW.
//!
//! # Usage
//!
//! ```bash
//! # Log every join and part on all multicast interfaces
//! sudo mldctl snoop
//!
//! # Block until someone on eth0 listens to ff3e::1234 (exit 3 after 30s)
//! sudo mldctl wait --iface eth0 --timeout 30 ff3e::1234
//!
//! # Print joins for any group
//! sudo mldctl watch --events join
//!
//! # Membership check after collecting reports for 5s
//! sudo mldctl query --iface eth0 --settle 5 ff3e::1234
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mldsnoop::sys::{ifindex, ifname};
use mldsnoop::{Error, Event, EventMask, Mld, MldConfig, StopHandle, WaitFlags};
use std::net::Ipv6Addr;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mldctl")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MLDv2 snooper: wait for and watch IPv6 multicast listeners")]
#[command(long_about = None)]
struct Cli {
    /// Filter size in bytes per interface (overrides MLD_BLOOM_SIZE)
    #[arg(long, global = true)]
    bloom_size: Option<usize>,

    /// Membership lifetime in timer ticks (overrides MLD_TIMEOUT)
    #[arg(long, global = true)]
    expiry: Option<u8>,

    /// Worker threads (overrides MLD_WORKERS)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Verbose mode (show internal logs)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snoop and log every join and part until Ctrl+C
    Snoop {
        /// Interface name or index (repeatable; default: all multicast-capable)
        #[arg(long, value_parser = parse_iface)]
        iface: Vec<u32>,

        /// Do not age memberships out
        #[arg(long)]
        no_ticker: bool,
    },

    /// Wait until GROUP has a listener
    Wait {
        /// Interface name or index (0 = any)
        #[arg(long, value_parser = parse_iface, default_value = "0")]
        iface: u32,

        /// Fail immediately (exit 2) if nobody listens yet
        #[arg(long)]
        dont_wait: bool,

        /// Give up after this many seconds (exit 3)
        #[arg(long)]
        timeout: Option<u64>,

        group: Ipv6Addr,
    },

    /// Print join/part notifications until Ctrl+C
    Watch {
        /// Interface name or index (0 = any)
        #[arg(long, value_parser = parse_iface, default_value = "0")]
        iface: u32,

        /// Events to subscribe to
        #[arg(long, value_enum, default_value = "all")]
        events: EventsArg,

        /// Group to watch (default: every group)
        group: Option<Ipv6Addr>,
    },

    /// Report whether GROUP has a listener after a settle delay
    Query {
        /// Interface name or index (0 = any)
        #[arg(long, value_parser = parse_iface, default_value = "0")]
        iface: u32,

        /// Seconds to collect reports before answering
        #[arg(long, default_value = "3")]
        settle: u64,

        group: Ipv6Addr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EventsArg {
    Join,
    Part,
    All,
}

impl From<EventsArg> for EventMask {
    fn from(arg: EventsArg) -> Self {
        match arg {
            EventsArg::Join => EventMask::JOIN,
            EventsArg::Part => EventMask::PART,
            EventsArg::All => EventMask::ALL,
        }
    }
}

/// Exit status when a non-blocking wait finds no listener.
const EXIT_WOULD_BLOCK: u8 = 2;
/// Exit status when a wait deadline expires.
const EXIT_TIMED_OUT: u8 = 3;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("mldctl=debug,mldsnoop=debug")
    } else {
        EnvFilter::new("mldctl=info,mldsnoop=warn")
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let config = build_config(&cli)?;

    match cli.command {
        Command::Snoop { iface, no_ticker } => cmd_snoop(config, &iface, !no_ticker),
        Command::Wait {
            iface,
            dont_wait,
            timeout,
            group,
        } => cmd_wait(config, iface, group, dont_wait, timeout.map(Duration::from_secs)),
        Command::Watch {
            iface,
            events,
            group,
        } => cmd_watch(config, iface, group, events.into()),
        Command::Query {
            iface,
            settle,
            group,
        } => cmd_query(config, iface, group, Duration::from_secs(settle)),
    }
}

fn build_config(cli: &Cli) -> Result<MldConfig> {
    let mut config = MldConfig::from_env();
    if let Some(size) = cli.bloom_size {
        config = config.with_bloom_size(size);
    }
    if let Some(ticks) = cli.expiry {
        config = config.with_timeout(ticks);
    }
    if let Some(n) = cli.workers {
        config = config.with_workers(n);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Accept an interface name or a numeric index.
fn parse_iface(s: &str) -> std::result::Result<u32, String> {
    if let Ok(idx) = s.parse::<u32>() {
        return Ok(idx);
    }
    ifindex(s).ok_or_else(|| format!("unknown interface '{}'", s))
}

fn start(config: MldConfig, ifaces: &[u32], ticker: bool) -> Result<Mld> {
    let mld = Mld::builder()
        .config(config)
        .interfaces(ifaces.iter().copied().filter(|&i| i != 0))
        .ticker(ticker)
        .start()
        .context("Failed to start snooper (CAP_NET_RAW required)")?;

    ctrlc_handler(mld.stop_handle());
    let names: Vec<String> = mld.interfaces().iter().map(|&i| ifname(i)).collect();
    tracing::info!(interfaces = ?names, "Snooping");
    Ok(mld)
}

fn cmd_snoop(config: MldConfig, ifaces: &[u32], ticker: bool) -> Result<ExitCode> {
    let mld = start(config, ifaces, ticker)?;

    let mut watches = Vec::new();
    for event in [Event::Join, Event::Part] {
        let watch = mld
            .watch(0, None, event.mask(), move |ev, _| {
                tracing::info!(
                    iface = %ifname(ev.ifindex),
                    group = %ev.group,
                    "{}",
                    event
                );
            })
            .with_context(|| format!("Failed to subscribe to {} events", event))?;
        watches.push(watch);
    }

    mld.wait_stopped();
    drop(watches);

    let stats = mld.stats();
    tracing::info!(
        packets = stats.packets,
        reports = stats.reports,
        malformed = stats.malformed,
        joins = stats.joins,
        parts = stats.parts,
        "Snooper shutdown complete"
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_wait(
    config: MldConfig,
    iface: u32,
    group: Ipv6Addr,
    dont_wait: bool,
    timeout: Option<Duration>,
) -> Result<ExitCode> {
    let mld = start(config, &[iface], true)?;
    let flags = if dont_wait {
        WaitFlags::DONTWAIT
    } else {
        WaitFlags::NONE
    };

    let result = match timeout {
        Some(timeout) => mld.wait_timeout(iface, &group, flags, timeout),
        None => mld.wait(iface, &group, flags),
    };

    match result {
        Ok(()) => {
            println!("{} has a listener", group);
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::WouldBlock) => {
            println!("{} has no listener yet", group);
            Ok(ExitCode::from(EXIT_WOULD_BLOCK))
        }
        Err(Error::TimedOut) => {
            println!("{} still has no listener", group);
            Ok(ExitCode::from(EXIT_TIMED_OUT))
        }
        Err(Error::Stopped) => {
            tracing::info!("Interrupted");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Wait failed"),
    }
}

fn cmd_watch(
    config: MldConfig,
    iface: u32,
    group: Option<Ipv6Addr>,
    events: EventMask,
) -> Result<ExitCode> {
    let mld = start(config, &[iface], true)?;

    let watch = mld
        .watch(iface, group, events, |ev, info| {
            let kind = ev.event.map_or_else(|| "EVENT".to_string(), |e| e.to_string());
            println!("{} {} on {} (channel {})", kind, ev.group, ifname(ev.ifindex), info.channel);
        })
        .context("Failed to subscribe")?;

    mld.wait_stopped();
    watch.cancel();
    Ok(ExitCode::SUCCESS)
}

fn cmd_query(config: MldConfig, iface: u32, group: Ipv6Addr, settle: Duration) -> Result<ExitCode> {
    if !group.is_multicast() {
        bail!("{} is not a multicast address", group);
    }
    let mld = start(config, &[iface], true)?;

    // Interruptible settle delay.
    let stop = mld.stop_handle();
    let deadline = std::time::Instant::now() + settle;
    while std::time::Instant::now() < deadline && !stop.is_stopped() {
        std::thread::sleep(Duration::from_millis(50));
    }

    let present = mld
        .filter_contains(iface, &group)
        .context("Membership query failed")?;
    println!("{} {}", group, if present { "present" } else { "absent" });
    Ok(if present {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}

//! This crate exposes the internal functionality of the `rustsweep` ping
//! sweeper.
//!
//! rustsweep probes every host of a `/24`-style range (`PREFIX.1` to
//! `PREFIX.254`) with a bounded number of probes in flight, and sorts the
//! hosts into a reachable and an unreachable set.
//!
//! ## Architecture Overview
//!
//! The sweep is driven by [`Scanner`](crate::scanner::Scanner), which owns one
//! session: the two result sets, the cancellation flag and the lifecycle
//! `Idle -> Running -> {Completed, Cancelled}`. The flow is:
//!
//! 1. **Enumeration**: [`SweepStrategy`](crate::sweep_strategy::SweepStrategy)
//!    yields every host suffix once, serially or in a random order
//! 2. **Bounded fan-out**: [`WorkerPool`](crate::scanner::WorkerPool) admits a
//!    new probe only when one of its `concurrency` slots frees up
//! 3. **Probing**: a [`ReachabilityProbe`](crate::scanner::ReachabilityProbe),
//!    by default [`PingProbe`](crate::scanner::PingProbe), checks one host
//!    under a strict deadline
//! 4. **Collection**: outcomes land in a
//!    [`ResultSink`](crate::scanner::ResultSink) safe for concurrent writers
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use rustsweep::address::Prefix;
//! use rustsweep::scanner::{PingProbe, ScanConfig, Scanner};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig {
//!         concurrency_limit: 32,
//!         probe_timeout: Duration::from_millis(500),
//!         ..ScanConfig::new("192.168.1".parse::<Prefix>()?)
//!     };
//!     let scanner = Scanner::new(config, PingProbe::new())?;
//!
//!     // Stop admitting probes on Ctrl-C; results so far are kept.
//!     let cancel = scanner.cancel_handle();
//!     tokio::spawn(async move {
//!         if tokio::signal::ctrl_c().await.is_ok() {
//!             cancel.cancel();
//!         }
//!     });
//!
//!     scanner.start().await?;
//!     for host in scanner.snapshot().reachable {
//!         println!("{host}");
//!     }
//!     println!("{}", scanner.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! - A host that does not answer, or answers too late, is a normal
//!   unreachable outcome
//! - Invalid configuration is rejected by `Scanner::new` before anything runs
//! - A probe program that cannot run is logged and its host counted as
//!   unreachable, unless it keeps failing, in which case the sweep stops with
//!   [`ScanError::ProbeUnavailable`](crate::scanner::ScanError::ProbeUnavailable)
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod scanner;

pub mod sweep_strategy;

pub mod address;

pub mod report;

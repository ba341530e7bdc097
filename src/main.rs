#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::if_not_else, clippy::non_ascii_literal)]

use colored::Colorize;
use log::debug;
use rustsweep::input::{Config, Opts};
use rustsweep::report::write_results;
use rustsweep::scanner::{PingProbe, ScanState, Scanner};
use rustsweep::{detail, output, warning};
use std::process::ExitCode;

/// Exit status of a sweep stopped by an interrupt, as a shell reports SIGINT.
const EXIT_CANCELLED: u8 = 130;

/// Faster ping sweeps with Rust.
#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let mut opts: Opts = Opts::read();
    let config = match Config::read(opts.config_path.clone()) {
        Ok(config) => config,
        Err(e) => {
            warning!(format!("{e:#}\nAborting sweep."));
            return ExitCode::FAILURE;
        }
    };
    opts.merge(&config);

    debug!("Main() `opts` arguments are {:?}", opts);

    let scan_config = match opts.scan_config() {
        Ok(scan_config) => scan_config,
        Err(e) => {
            warning!(format!("{e}. Aborting sweep."));
            return ExitCode::FAILURE;
        }
    };

    #[cfg(unix)]
    warn_on_low_ulimit(&opts);

    let scanner = match Scanner::new(scan_config, PingProbe::new()) {
        Ok(scanner) => scanner,
        Err(e) => {
            warning!(format!("{e}. Aborting sweep."));
            return ExitCode::FAILURE;
        }
    };

    let cancel = scanner.cancel_handle();
    let (greppable, accessible) = (opts.greppable, opts.accessible);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warning!(
                "Interrupted, waiting for running probes to stop.",
                greppable,
                accessible
            );
            cancel.cancel();
        }
    });

    detail!(
        format!(
            "Sweeping {}.1-254 with up to {} probes in flight.",
            scanner.config().prefix,
            scanner.config().concurrency_limit
        ),
        opts.greppable,
        opts.accessible
    );

    let result = scanner.start().await;

    let mut snapshot = scanner.snapshot();
    snapshot.reachable.sort_unstable();
    for host in &snapshot.reachable {
        if opts.greppable {
            println!("{host}");
        } else if opts.accessible {
            output!(format!("Reachable {host}"), opts.greppable, opts.accessible);
        } else {
            output!(
                format!("Reachable {}", host.to_string().green()),
                opts.greppable,
                opts.accessible
            );
        }
    }

    if let Err(e) = write_results(&snapshot, &opts.reachable_out, &opts.unreachable_out) {
        warning!(format!("{e:#}"));
    } else {
        detail!(
            format!(
                "Results written to {} and {}.",
                opts.reachable_out.display(),
                opts.unreachable_out.display()
            ),
            opts.greppable,
            opts.accessible
        );
    }

    detail!(scanner.summary(), opts.greppable, opts.accessible);

    match result {
        Ok(ScanState::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_CANCELLED),
        Err(e) => {
            warning!(format!("{e}"));
            ExitCode::FAILURE
        }
    }
}

/// Raises the open file limit if asked to, and warns when the limit looks
/// too low for the requested concurrency: every probe in flight holds a
/// child process and its pipes.
#[cfg(unix)]
fn warn_on_low_ulimit(opts: &Opts) {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    let Ok((soft, _)) = Resource::NOFILE.get() else {
        return;
    };
    let needed = (opts.concurrency as u64).saturating_mul(4);
    if needed > soft {
        warning!(
            format!(
                "File limit ({soft}) is low for {} probes in flight; consider --ulimit {needed} or a lower --concurrency.",
                opts.concurrency
            ),
            opts.greppable,
            opts.accessible
        );
    }
}

//! The reachability check run against each host.
use super::sink::Reachability;
use crate::address::Address;
use futures::future::{BoxFuture, FutureExt};
use log::debug;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Failures of the probe primitive itself, as opposed to a host that did
/// not answer (which is a normal [`Reachability::Unreachable`]).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not run '{program}': {source}")]
    Unavailable {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' cannot probe hosts: {reason}")]
    Environment { program: String, reason: String },
}

/// Tests whether one address is alive.
///
/// Implementations send up to `count` echo requests, waiting `timeout` for
/// each, and must report an unanswered host as `Ok(Unreachable)`. An `Err`
/// means the probe could not run at all.
pub trait ReachabilityProbe: Send + Sync {
    fn probe(
        &self,
        address: Address,
        count: u32,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Reachability, ProbeError>>;
}

impl<T> ReachabilityProbe for Arc<T>
where
    T: ReachabilityProbe + ?Sized,
{
    fn probe(
        &self,
        address: Address,
        count: u32,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Reachability, ProbeError>> {
        (**self).probe(address, count, timeout)
    }
}

/// Shortest pause between echo requests that `ping` accepts from an
/// unprivileged user.
pub const MIN_PACKET_INTERVAL: Duration = Duration::from_millis(200);

/// Pause between consecutive echo requests of one probe.
///
/// `ping` waits this long before sending the next request, so a probe of
/// `count` requests to a live host lasts `count - 1` intervals plus one
/// round trip.
#[cfg(target_os = "windows")]
pub fn packet_interval(timeout: Duration) -> Duration {
    // not configurable, Windows paces requests about a second apart
    timeout.max(Duration::from_secs(1))
}

/// Pause between consecutive echo requests of one probe.
///
/// `ping` waits this long before sending the next request, so a probe of
/// `count` requests to a live host lasts `count - 1` intervals plus one
/// round trip.
#[cfg(not(target_os = "windows"))]
pub fn packet_interval(timeout: Duration) -> Duration {
    timeout.max(MIN_PACKET_INTERVAL)
}

/// Probes hosts with the system `ping` program.
///
/// The child is killed when the probe future is dropped, so a sweep that
/// abandons a probe (deadline or cancellation) leaves no `ping` behind.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::with_program("ping")
    }
}

impl PingProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `program` instead of `ping` from `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn ping(
        &self,
        address: Address,
        count: u32,
        timeout: Duration,
    ) -> Result<Reachability, ProbeError> {
        let output = Command::new(&self.program)
            .args(ping_args(address, count, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Unavailable {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(Reachability::Reachable);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(reason) = environment_failure(&stderr) {
            return Err(ProbeError::Environment {
                program: self.program.clone(),
                reason,
            });
        }

        debug!("{} did not answer ({})", address, output.status);
        Ok(Reachability::Unreachable)
    }
}

impl ReachabilityProbe for PingProbe {
    fn probe(
        &self,
        address: Address,
        count: u32,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Reachability, ProbeError>> {
        self.ping(address, count, timeout).boxed()
    }
}

#[cfg(target_os = "windows")]
fn ping_args(address: Address, count: u32, timeout: Duration) -> Vec<String> {
    vec![
        "-n".to_owned(),
        count.to_string(),
        "-w".to_owned(),
        timeout.as_millis().max(1).to_string(),
        address.to_string(),
    ]
}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
fn ping_args(address: Address, count: u32, timeout: Duration) -> Vec<String> {
    let mut args = vec!["-q".to_owned(), "-c".to_owned(), count.to_string()];
    if count > 1 {
        args.push("-i".to_owned());
        args.push(interval_secs(timeout));
    }
    args.push("-W".to_owned());
    args.push(timeout.as_millis().max(1).to_string());
    args.push(address.to_string());
    args
}

// iputils and busybox take whole seconds for -W
#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
fn ping_args(address: Address, count: u32, timeout: Duration) -> Vec<String> {
    let seconds = timeout.as_millis().div_ceil(1000).max(1);
    let mut args = vec!["-q".to_owned(), "-c".to_owned(), count.to_string()];
    if count > 1 {
        args.push("-i".to_owned());
        args.push(interval_secs(timeout));
    }
    args.push("-W".to_owned());
    args.push(seconds.to_string());
    args.push(address.to_string());
    args
}

/// The `-i` value for `ping`, in fractional seconds.
#[cfg(not(target_os = "windows"))]
fn interval_secs(timeout: Duration) -> String {
    format!("{:.3}", packet_interval(timeout).as_secs_f64())
}

/// Picks out stderr lines that mean `ping` cannot work on this machine at
/// all, rather than that one host is down.
fn environment_failure(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| {
            let line = line.to_ascii_lowercase();
            line.contains("operation not permitted") || line.contains("permission denied")
        })
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Prefix;

    #[test]
    fn permission_errors_are_environment_failures() {
        let stderr = "ping: socket: Operation not permitted\n";
        assert_eq!(
            environment_failure(stderr).as_deref(),
            Some("ping: socket: Operation not permitted")
        );
        assert!(environment_failure("ping: icmp open socket: Permission denied").is_some());
    }

    #[test]
    fn unreachable_host_output_is_not_an_environment_failure() {
        assert!(environment_failure("").is_none());
        assert!(environment_failure("connect: Network is unreachable").is_none());
        assert!(
            environment_failure("From 10.0.0.1 icmp_seq=1 Destination Host Unreachable").is_none()
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_args_round_timeout_up_to_seconds() {
        let address = Prefix::new(10, 0, 0).host(5).unwrap();
        let args = ping_args(address, 2, Duration::from_millis(1_500));
        assert_eq!(args, ["-q", "-c", "2", "-i", "1.500", "-W", "2", "10.0.0.5"]);

        let args = ping_args(address, 1, Duration::from_millis(200));
        assert_eq!(args, ["-q", "-c", "1", "-W", "1", "10.0.0.5"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_args_pace_requests_by_timeout() {
        let address = Prefix::new(10, 0, 0).host(5).unwrap();
        let args = ping_args(address, 3, Duration::from_millis(500));
        assert_eq!(args, ["-q", "-c", "3", "-i", "0.500", "-W", "1", "10.0.0.5"]);

        // unprivileged ping refuses shorter intervals
        let args = ping_args(address, 3, Duration::from_millis(50));
        assert_eq!(args, ["-q", "-c", "3", "-i", "0.200", "-W", "1", "10.0.0.5"]);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn interval_never_drops_below_minimum() {
        assert_eq!(packet_interval(Duration::from_millis(10)), MIN_PACKET_INTERVAL);
        assert_eq!(
            packet_interval(Duration::from_millis(750)),
            Duration::from_millis(750)
        );
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let probe = PingProbe::with_program("rustsweep-no-such-ping-binary");
        let address = Prefix::new(127, 0, 0).host(1).unwrap();

        let result = probe.probe(address, 1, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProbeError::Unavailable { .. })));
    }
}

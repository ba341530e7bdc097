//! Core functionality for actual sweeping behaviour.
//!
//! A [`Scanner`] owns one sweep session: it walks the host range of its
//! prefix, hands each host to a [`WorkerPool`] bounded by the configured
//! concurrency, classifies every probe through a [`ReachabilityProbe`] and
//! records the outcome in a [`ResultSink`].
use crate::address::{Address, Prefix, HOST_COUNT};
use crate::input::ScanOrder;
use crate::sweep_strategy::SweepStrategy;
use log::{debug, error, info, warn};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time;

mod cancel;
mod pool;
mod probe;
mod sink;

pub use cancel::CancelToken;
pub use pool::{PoolReport, WorkerPool};
pub use probe::{packet_interval, PingProbe, ProbeError, ReachabilityProbe, MIN_PACKET_INTERVAL};
pub use sink::{ProbeOutcome, Reachability, ResultSink, ResultSnapshot};

/// Consecutive environment-level probe failures after which the sweep gives
/// up instead of classifying the rest of the range as unreachable.
pub const SYSTEMIC_FAILURE_THRESHOLD: usize = 3;

/// Extra time a probe gets past its packets' own timeouts to cover starting
/// the probe program.
///
/// The per-probe bound is intentionally looser than
/// `probe_count * probe_timeout`: a probe is abandoned only once its
/// requests, the pauses between them and this slack have all run out.
pub const PROBE_DEADLINE_SLACK: Duration = Duration::from_millis(250);

/// Invalid sweep configuration. Reported before any probe is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no prefix to sweep was given")]
    MissingPrefix,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("probe count must be at least 1")]
    ZeroProbeCount,
    #[error("probe timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("this sweep was already started and is {state}")]
    AlreadyStarted { state: ScanState },
    #[error("the probe failed {consecutive} times in a row, giving up: {source}")]
    ProbeUnavailable {
        consecutive: usize,
        #[source]
        source: ProbeError,
    },
}

/// The immutable configuration of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub prefix: Prefix,
    pub concurrency_limit: usize,
    pub probe_count: u32,
    pub probe_timeout: Duration,
    /// How long running probes may keep going after cancellation.
    pub grace_period: Duration,
    pub order: ScanOrder,
}

impl ScanConfig {
    /// A configuration with the command line defaults.
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            concurrency_limit: 64,
            probe_count: 1,
            probe_timeout: Duration::from_secs(1),
            grace_period: Duration::from_secs(2),
            order: ScanOrder::Serial,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.probe_count == 0 {
            return Err(ConfigError::ZeroProbeCount);
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Wall time after which a probe is abandoned and its host counted as
    /// unreachable: every request but the last is followed by the pause
    /// before the next, the last by its full timeout, plus
    /// [`PROBE_DEADLINE_SLACK`].
    pub fn probe_deadline(&self) -> Duration {
        let pauses = self.probe_count.saturating_sub(1);
        packet_interval(self.probe_timeout).saturating_mul(pauses)
            + self.probe_timeout
            + PROBE_DEADLINE_SLACK
    }
}

/// Lifecycle of a sweep: `Idle -> Running -> {Completed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Cancelled)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Running => "running",
            ScanState::Completed => "completed",
            ScanState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Counts and timing of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub reachable: usize,
    pub unreachable: usize,
    pub elapsed: Duration,
    pub state: ScanState,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reachable, {} unreachable in {:.2}s ({})",
            self.reachable,
            self.unreachable,
            self.elapsed.as_secs_f64(),
            self.state
        )
    }
}

#[derive(Debug)]
struct Progress {
    state: ScanState,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// State of one sweep: the result sets, the cancellation flag and the
/// lifecycle. Every [`Scanner`] builds its own, so sessions never share
/// results.
#[derive(Debug)]
struct ScanSession {
    sink: ResultSink,
    cancel: CancelToken,
    progress: Mutex<Progress>,
}

impl ScanSession {
    fn new() -> Self {
        Self {
            sink: ResultSink::new(),
            cancel: CancelToken::new(),
            progress: Mutex::new(Progress {
                state: ScanState::Idle,
                started: None,
                elapsed: None,
            }),
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks environment-level probe failures across concurrent probes.
#[derive(Debug, Default)]
struct ProbeHealth {
    consecutive: AtomicUsize,
    tripped: Mutex<Option<(usize, ProbeError)>>,
}

impl ProbeHealth {
    fn succeeded(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    fn failed(&self, address: Address, err: ProbeError, cancel: &CancelToken) {
        let consecutive = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        if consecutive < SYSTEMIC_FAILURE_THRESHOLD {
            warn!("Probe of {} failed, counting it as unreachable: {}", address, err);
            return;
        }

        let mut tripped = self.tripped.lock().unwrap_or_else(PoisonError::into_inner);
        if tripped.is_none() {
            error!(
                "Probe failed {} times in a row, stopping the sweep: {}",
                consecutive, err
            );
            *tripped = Some((consecutive, err));
            cancel.cancel();
        }
    }

    fn take_failure(&self) -> Option<(usize, ProbeError)> {
        self.tripped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// The sweep controller.
///
/// ```rust,no_run
/// # use rustsweep::address::Prefix;
/// # use rustsweep::scanner::{PingProbe, ScanConfig, Scanner};
/// # async fn sweep() -> Result<(), rustsweep::scanner::ScanError> {
/// let config = ScanConfig::new(Prefix::new(192, 168, 1));
/// let scanner = Scanner::new(config, PingProbe::new())?;
///
/// let state = scanner.start().await?;
/// println!("{}: {}", state, scanner.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scanner<P> {
    config: ScanConfig,
    probe: Arc<P>,
    session: ScanSession,
}

impl<P> Scanner<P>
where
    P: ReachabilityProbe + 'static,
{
    /// Validates `config` and prepares an idle session.
    pub fn new(config: ScanConfig, probe: P) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            config,
            probe: Arc::new(probe),
            session: ScanSession::new(),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.session.progress().state
    }

    /// A handle that cancels this sweep, e.g. from a signal handler task.
    pub fn cancel_handle(&self) -> CancelToken {
        self.session.cancel.clone()
    }

    /// Stops admitting new probes. Running probes get the grace period to
    /// finish and are aborted after it; [`start`](Scanner::start) then
    /// returns [`ScanState::Cancelled`].
    pub fn cancel(&self) {
        self.session.cancel.cancel();
    }

    /// The results recorded so far.
    pub fn snapshot(&self) -> ResultSnapshot {
        self.session.sink.snapshot()
    }

    pub fn summary(&self) -> Summary {
        let snapshot = self.snapshot();
        let progress = self.session.progress();
        let elapsed = match (progress.elapsed, progress.started) {
            (Some(elapsed), _) => elapsed,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        };

        Summary {
            reachable: snapshot.reachable.len(),
            unreachable: snapshot.unreachable.len(),
            elapsed,
            state: progress.state,
        }
    }

    /// Runs the sweep to its end and returns the terminal state.
    ///
    /// A session runs once; starting it again fails with
    /// [`ScanError::AlreadyStarted`].
    pub async fn start(&self) -> Result<ScanState, ScanError> {
        {
            let mut progress = self.session.progress();
            if progress.state != ScanState::Idle {
                return Err(ScanError::AlreadyStarted {
                    state: progress.state,
                });
            }
            progress.state = ScanState::Running;
            progress.started = Some(Instant::now());
        }
        self.session.sink.clear();

        let limit =
            NonZeroUsize::new(self.config.concurrency_limit).ok_or(ConfigError::ZeroConcurrency)?;
        let prefix = self.config.prefix;
        info!(
            "Sweeping {}.1-254: {} in flight, {} probe(s) of {:?}, {:?} order",
            prefix, limit, self.config.probe_count, self.config.probe_timeout, self.config.order
        );

        let pool = WorkerPool::new(
            limit,
            self.session.cancel.clone(),
            self.config.grace_period,
        );
        let health = Arc::new(ProbeHealth::default());
        let addresses = SweepStrategy::pick(self.config.order)
            .suffixes()
            .filter_map(|suffix| prefix.host(suffix));

        let work = |address: Address| {
            let probe = Arc::clone(&self.probe);
            let health = Arc::clone(&health);
            let cancel = self.session.cancel.clone();
            let settings = ProbeSettings::from(&self.config);
            async move { classify(&*probe, address, settings, &health, &cancel).await }
        };
        let sink = &self.session.sink;
        let report = pool
            .run(addresses, work, |outcome| sink.record(outcome))
            .await;

        let state = if !report.cancelled && sink.len() == HOST_COUNT {
            ScanState::Completed
        } else {
            ScanState::Cancelled
        };
        {
            let mut progress = self.session.progress();
            progress.state = state;
            progress.elapsed = progress.started.map(|started| started.elapsed());
        }
        debug!("Sweep of {} ended: {}", prefix, self.summary());

        if let Some((consecutive, source)) = health.take_failure() {
            return Err(ScanError::ProbeUnavailable {
                consecutive,
                source,
            });
        }
        Ok(state)
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeSettings {
    count: u32,
    timeout: Duration,
    deadline: Duration,
}

impl From<&ScanConfig> for ProbeSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            count: config.probe_count,
            timeout: config.probe_timeout,
            deadline: config.probe_deadline(),
        }
    }
}

/// Probes one address and turns every per-host failure into an outcome.
async fn classify<P>(
    probe: &P,
    address: Address,
    settings: ProbeSettings,
    health: &ProbeHealth,
    cancel: &CancelToken,
) -> ProbeOutcome
where
    P: ReachabilityProbe + ?Sized,
{
    let attempt = probe.probe(address, settings.count, settings.timeout);
    match time::timeout(settings.deadline, attempt).await {
        Ok(Ok(Reachability::Reachable)) => {
            health.succeeded();
            ProbeOutcome::reachable(address)
        }
        Ok(Ok(Reachability::Unreachable)) => {
            health.succeeded();
            ProbeOutcome::unreachable(address)
        }
        Ok(Err(e)) => {
            health.failed(address, e, cancel);
            ProbeOutcome::unreachable(address)
        }
        Err(_) => {
            debug!("{} gave no answer within {:?}", address, settings.deadline);
            health.succeeded();
            ProbeOutcome::unreachable(address)
        }
    }
}

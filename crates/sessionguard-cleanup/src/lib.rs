//! Periodic cleanup sweep for SessionGuard.
//!
//! The admission path keeps the three session structures consistent as long
//! as the host reports every termination and every workflow runs to
//! completion. The [`CleanupScheduler`] heals what slips through:
//!
//! 1. grace marks older than `window + safety_margin`
//! 2. registry records whose connection is gone (probed through the host)
//! 3. grace marks for identities that are connected again and past the window
//! 4. eviction guard marks held far longer than any admission can take
//!
//! Every removal is conditional on the entry it observed, so a sweep can run
//! at the same time as any number of admissions.
//!
//! # Integration
//!
//! The scheduler can be driven by hand inside an existing `select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* ... */ }
//!         _ = scheduler.wait_for_sweep() => {
//!             let report = scheduler.sweep();
//!         }
//!     }
//! }
//! ```
//!
//! or spawned on its own with [`CleanupScheduler::run`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sessionguard_session::{
    ClockSource, EvictionGuard, GraceWindowCache, GuardConfig, SessionHost, SessionRegistry,
};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Reports and metrics
// ---------------------------------------------------------------------------

/// What a single sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Grace marks past `window + safety_margin`.
    pub grace_expired: usize,
    /// Registry records whose connection the host reported gone.
    pub sessions_reconciled: usize,
    /// Grace marks dropped because the identity is connected again.
    pub grace_resolved: usize,
    /// Eviction guard marks cleared by the safety net.
    pub guards_cleared: usize,
    /// Liveness probes that returned an error. Those records were kept.
    pub probe_failures: usize,
}

impl SweepReport {
    /// Total entries removed across all structures.
    pub fn removed(&self) -> usize {
        self.grace_expired + self.sessions_reconciled + self.grace_resolved + self.guards_cleared
    }
}

/// Running totals across every sweep the scheduler has performed.
#[derive(Debug, Clone, Default)]
pub struct SweepMetrics {
    pub total_sweeps: u64,
    pub grace_expired: u64,
    pub sessions_reconciled: u64,
    pub grace_resolved: u64,
    pub guards_cleared: u64,
    pub probe_failures: u64,
    /// Wall time of the most recent sweep.
    pub last_sweep_time: Duration,
    /// Longest sweep observed.
    pub max_sweep_time: Duration,
}

impl SweepMetrics {
    fn record(&mut self, report: &SweepReport, elapsed: Duration) {
        self.total_sweeps += 1;
        self.grace_expired += report.grace_expired as u64;
        self.sessions_reconciled += report.sessions_reconciled as u64;
        self.grace_resolved += report.grace_resolved as u64;
        self.guards_cleared += report.guards_cleared as u64;
        self.probe_failures += report.probe_failures as u64;
        self.last_sweep_time = elapsed;
        if elapsed > self.max_sweep_time {
            self.max_sweep_time = elapsed;
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A zero period would sweep in a busy loop.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Runs the cleanup sweep on a fixed period.
///
/// The period comes from [`GuardConfig::cleanup_period`] and follows config
/// reloads. The first sweep is delayed by a random jitter of up to
/// `initial_jitter_ms` so several engines started together don't sweep in
/// lockstep.
pub struct CleanupScheduler<H: SessionHost> {
    host: Arc<H>,
    registry: Arc<SessionRegistry>,
    grace: Arc<GraceWindowCache>,
    guard: Arc<EvictionGuard>,
    clock: Arc<dyn ClockSource>,
    config: watch::Receiver<Arc<GuardConfig>>,
    period: Duration,
    next_sweep: Instant,
    sweep_count: u64,
    metrics: SweepMetrics,
}

impl<H: SessionHost> CleanupScheduler<H> {
    /// Creates a scheduler. The first sweep is due one period (plus jitter)
    /// from now.
    pub fn new(
        host: Arc<H>,
        registry: Arc<SessionRegistry>,
        grace: Arc<GraceWindowCache>,
        guard: Arc<EvictionGuard>,
        clock: Arc<dyn ClockSource>,
        mut config: watch::Receiver<Arc<GuardConfig>>,
    ) -> Self {
        let current = Arc::clone(&config.borrow_and_update());
        let period = current.cleanup_period().max(MIN_PERIOD);

        let jitter_ms = match current.initial_jitter_ms {
            0 => 0,
            max => rand::rng().random_range(0..max),
        };
        let jitter = Duration::from_millis(jitter_ms);

        debug!(
            period_secs = period.as_secs(),
            jitter_ms,
            "cleanup scheduler created"
        );

        Self {
            host,
            registry,
            grace,
            guard,
            clock,
            config,
            period,
            next_sweep: Instant::now() + period + jitter,
            sweep_count: 0,
            metrics: SweepMetrics::default(),
        }
    }

    /// Waits until the next sweep is due and schedules the one after it.
    /// Returns the sweep number (starting at 1).
    ///
    pub async fn wait_for_sweep(&mut self) -> u64 {
        time::sleep_until(self.next_sweep).await;

        // Schedule from now, not from the missed deadline: a late wake-up
        // never produces a burst of back-to-back sweeps.
        self.next_sweep = Instant::now() + self.period;
        self.sweep_count += 1;
        self.sweep_count
    }

    /// Runs one sweep over all three structures.
    pub fn sweep(&mut self) -> SweepReport {
        let started = Instant::now();
        let config = Arc::clone(&self.config.borrow());
        let now = self.clock.now();
        let window = config.grace_window();

        let grace_expired = self
            .grace
            .sweep_expired(now, window, config.safety_margin());

        let mut probe_failures = 0;
        let host = &self.host;
        let sessions_reconciled = self.registry.reconcile(|identity| {
            match host.is_live(identity) {
                Ok(live) => live,
                Err(error) => {
                    warn!(%identity, %error, "liveness probe failed, keeping session");
                    probe_failures += 1;
                    true
                }
            }
        });

        let registry = &self.registry;
        let grace_resolved =
            self.grace
                .retain_unresolved(now, window, |identity| registry.is_active(identity));

        let guards_cleared = if config.force_clear_guards {
            self.guard.force_clear_all()
        } else {
            self.guard.clear_older_than(config.guard_ceiling())
        };

        let report = SweepReport {
            grace_expired,
            sessions_reconciled,
            grace_resolved,
            guards_cleared,
            probe_failures,
        };

        let elapsed = started.elapsed();
        self.metrics.record(&report, elapsed);

        if config.logging.enabled && (config.logging.verbose || report.removed() > 0) {
            info!(
                sweep = self.sweep_count,
                grace_expired,
                sessions_reconciled,
                grace_resolved,
                guards_cleared,
                probe_failures,
                active_sessions = self.registry.len(),
                grace_entries = self.grace.len(),
                "cleanup sweep finished"
            );
        }

        report
    }

    /// Sweeps on schedule until `shutdown` resolves.
    ///
    /// Picks up `cleanup_period_secs` changes as soon as a new config is
    /// published; the next sweep is rescheduled one new period from the
    /// moment of the change.
    pub async fn run<F>(mut self, shutdown: F) -> SweepMetrics
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut changes = self.config.clone();
        let mut watching = true;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!(sweeps = self.sweep_count, "cleanup scheduler stopping");
                    break;
                }
                changed = changes.changed(), if watching => {
                    if changed.is_err() {
                        // Publisher gone: keep the last config forever.
                        watching = false;
                        continue;
                    }
                    let period = changes.borrow_and_update().cleanup_period();
                    self.set_period(period);
                }
                _ = self.wait_for_sweep() => {
                    self.sweep();
                }
            }
        }

        self.metrics
    }

    /// Switches to a new sweep period. The next sweep is rescheduled one new
    /// period from now; setting the current period again changes nothing.
    pub fn set_period(&mut self, period: Duration) {
        let period = period.max(MIN_PERIOD);
        if period != self.period {
            info!(
                old_secs = self.period.as_secs(),
                new_secs = period.as_secs(),
                "cleanup period changed"
            );
            self.period = period;
            self.next_sweep = Instant::now() + period;
        }
    }

    /// Number of sweeps that have come due.
    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    /// The period currently in effect.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// When the next sweep is due.
    pub fn next_sweep(&self) -> Instant {
        self.next_sweep
    }

    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }
}

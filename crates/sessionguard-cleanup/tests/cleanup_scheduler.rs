//! Integration tests for the cleanup scheduler.
//!
//! Every test runs on a paused Tokio clock. `TokioClock` follows it, so the
//! timestamps the stores compare move together with `sleep`/`advance`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sessionguard_cleanup::CleanupScheduler;
use sessionguard_protocol::Identity;
use sessionguard_session::{
    ClockSource, EvictionGuard, GraceWindowCache, GuardConfig, HostError, SessionHost,
    SessionRegistry, TokioClock,
};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

/// Answers liveness probes from a set of connected identities.
#[derive(Default)]
struct ProbeHost {
    live: Mutex<HashSet<Identity>>,
    broken: Mutex<HashSet<Identity>>,
}

impl ProbeHost {
    fn connect(&self, identity: Identity) {
        self.live.lock().unwrap().insert(identity);
    }

    fn break_probe(&self, identity: Identity) {
        self.broken.lock().unwrap().insert(identity);
    }
}

impl SessionHost for ProbeHost {
    async fn evict(&self, identity: Identity, _message: &str) -> Result<(), HostError> {
        self.live.lock().unwrap().remove(&identity);
        Ok(())
    }

    fn is_live(&self, identity: &Identity) -> Result<bool, HostError> {
        if self.broken.lock().unwrap().contains(identity) {
            return Err(HostError::Failed("probe timed out".into()));
        }
        Ok(self.live.lock().unwrap().contains(identity))
    }
}

struct Fixture {
    scheduler: CleanupScheduler<ProbeHost>,
    host: Arc<ProbeHost>,
    registry: Arc<SessionRegistry>,
    grace: Arc<GraceWindowCache>,
    guard: Arc<EvictionGuard>,
    clock: Arc<TokioClock>,
    config_tx: watch::Sender<Arc<GuardConfig>>,
}

fn fixture_with(config: GuardConfig) -> Fixture {
    let clock = Arc::new(TokioClock);
    let host = Arc::new(ProbeHost::default());
    let registry = Arc::new(SessionRegistry::new(clock.clone()));
    let grace = Arc::new(GraceWindowCache::new());
    let guard = Arc::new(EvictionGuard::new(clock.clone()));
    let (config_tx, config_rx) = watch::channel(Arc::new(config));
    let scheduler = CleanupScheduler::new(
        Arc::clone(&host),
        Arc::clone(&registry),
        Arc::clone(&grace),
        Arc::clone(&guard),
        clock.clone(),
        config_rx,
    );
    Fixture {
        scheduler,
        host,
        registry,
        grace,
        guard,
        clock,
        config_tx,
    }
}

/// Default config without first-sweep jitter, so timings are exact.
fn no_jitter() -> GuardConfig {
    GuardConfig {
        initial_jitter_ms: 0,
        ..GuardConfig::default()
    }
}

fn fixture() -> Fixture {
    fixture_with(no_jitter())
}

fn id(n: u128) -> Identity {
    Identity::from_u128(n)
}

// =========================================================================
// Scheduling
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_new_scheduler_initial_state() {
    let f = fixture();
    assert_eq!(f.scheduler.sweep_count(), 0);
    assert_eq!(f.scheduler.period(), Duration::from_secs(60));
    assert_eq!(f.scheduler.metrics().total_sweeps, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_sweep_fires_every_period() {
    let mut f = fixture();
    let start = Instant::now();

    assert_eq!(f.scheduler.wait_for_sweep().await, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(60));

    assert_eq!(f.scheduler.wait_for_sweep().await, 2);
    assert_eq!(start.elapsed(), Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_first_sweep_jitter_stays_within_bound() {
    let config = GuardConfig {
        initial_jitter_ms: 500,
        ..GuardConfig::default()
    };
    let mut f = fixture_with(config);
    let start = Instant::now();

    f.scheduler.wait_for_sweep().await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed < Duration::from_millis(60_500));
}

#[tokio::test(start_paused = true)]
async fn test_set_period_zero_clamps_to_one_second() {
    let mut f = fixture();
    f.scheduler.set_period(Duration::ZERO);
    assert_eq!(f.scheduler.period(), Duration::from_secs(1));
}

// =========================================================================
// Sweep contents
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_sweep_grace_boundary_is_exact() {
    // window 2s + margin 1s: a mark aged exactly 3s stays, 3s + 1ms goes.
    let mut f = fixture();
    f.grace.mark_evicted(id(1), f.clock.now());

    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(f.scheduler.sweep().grace_expired, 0);
    assert_eq!(f.grace.len(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(f.scheduler.sweep().grace_expired, 1);
    assert!(f.grace.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_reconciles_dead_sessions() {
    let mut f = fixture();
    for n in 1..=3 {
        f.registry.register(id(n), format!("player{n}"));
    }
    f.host.connect(id(1));
    f.host.connect(id(3));

    let report = f.scheduler.sweep();

    assert_eq!(report.sessions_reconciled, 1);
    assert!(f.registry.is_active(&id(1)));
    assert!(!f.registry.is_active(&id(2)));
    assert!(f.registry.is_active(&id(3)));
}

#[tokio::test(start_paused = true)]
async fn test_sweep_probe_failure_keeps_session() {
    let mut f = fixture();
    f.registry.register(id(1), "flaky");
    f.host.break_probe(id(1));

    let report = f.scheduler.sweep();

    assert_eq!(report.sessions_reconciled, 0);
    assert_eq!(report.probe_failures, 1);
    assert!(f.registry.is_active(&id(1)));
    assert_eq!(f.scheduler.metrics().probe_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_resolves_grace_for_reconnected_identity() {
    let mut f = fixture();
    f.grace.mark_evicted(id(1), f.clock.now());
    f.grace.mark_evicted(id(2), f.clock.now());
    f.registry.register(id(1), "back");
    f.host.connect(id(1));

    // Past the window, inside the safety margin.
    tokio::time::advance(Duration::from_millis(2_500)).await;
    let report = f.scheduler.sweep();

    assert_eq!(report.grace_expired, 0);
    assert_eq!(report.grace_resolved, 1);
    assert!(f.grace.mark(&id(1)).is_none());
    assert!(f.grace.mark(&id(2)).is_some(), "not connected: left for expiry");
}

#[tokio::test(start_paused = true)]
async fn test_sweep_guard_safety_net_uses_ceiling() {
    let mut f = fixture();
    assert!(f.guard.try_acquire(id(1)));
    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(f.guard.try_acquire(id(2)));

    assert_eq!(f.scheduler.sweep().guards_cleared, 0);

    tokio::time::advance(Duration::from_secs(11)).await;
    let report = f.scheduler.sweep();

    assert_eq!(report.guards_cleared, 1);
    assert!(!f.guard.is_held(&id(1)));
    assert!(f.guard.is_held(&id(2)), "younger mark survives");
}

#[tokio::test(start_paused = true)]
async fn test_sweep_force_clear_guards_clears_every_mark() {
    let config = GuardConfig {
        force_clear_guards: true,
        ..no_jitter()
    };
    let mut f = fixture_with(config);
    assert!(f.guard.try_acquire(id(1)));

    assert_eq!(f.scheduler.sweep().guards_cleared, 1);
    assert!(f.guard.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_updates_metrics() {
    let mut f = fixture();
    f.registry.register(id(1), "gone");
    f.scheduler.sweep();
    f.scheduler.sweep();

    let m = f.scheduler.metrics();
    assert_eq!(m.total_sweeps, 2);
    assert_eq!(m.sessions_reconciled, 1);
}

// =========================================================================
// Run loop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_sweeps_until_shutdown() {
    let f = fixture();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(f.scheduler.run(async move {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_secs(210)).await;
    stop_tx.send(()).unwrap();
    let metrics = task.await.unwrap();

    assert_eq!(metrics.total_sweeps, 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_follows_reloaded_period() {
    let f = fixture();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(f.scheduler.run(async move {
        let _ = stop_rx.await;
    }));

    f.config_tx.send_replace(Arc::new(GuardConfig {
        cleanup_period_secs: 5,
        ..no_jitter()
    }));
    tokio::time::sleep(Duration::from_secs(12)).await;
    stop_tx.send(()).unwrap();
    let metrics = task.await.unwrap();

    assert_eq!(metrics.total_sweeps, 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_survives_dropped_config_publisher() {
    let f = fixture();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    drop(f.config_tx);
    let task = tokio::spawn(f.scheduler.run(async move {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_secs(61)).await;
    stop_tx.send(()).unwrap();

    assert_eq!(task.await.unwrap().total_sweeps, 1);
}

//! `SessionGuard` builder and service.
//!
//! This is the entry point a host talks to. It owns the three session
//! structures, the admission coordinator, and the background cleanup task,
//! and translates host lifecycle events into calls on them:
//!
//! | host event | call |
//! |---|---|
//! | connection attempt | [`SessionGuard::on_connection_attempt`] |
//! | session established | [`SessionGuard::on_session_established`] |
//! | connection terminated | [`SessionGuard::on_connection_terminated`] |

use std::sync::{Arc, Mutex, PoisonError};

use sessionguard_admission::{AdmissionCoordinator, AdmissionMetrics};
use sessionguard_cleanup::{CleanupScheduler, SweepMetrics};
use sessionguard_protocol::{AdmissionDecision, ConnectionAttempt, Identity};
use sessionguard_session::{
    ClockSource, EvictionGuard, GraceWindowCache, GuardConfig, SessionHost, SessionRegistry,
    TokioClock,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admin::StatusReport;
use crate::config::{self, ConfigError, ConfigSource};
use crate::SessionGuardError;

/// Builder for a [`SessionGuard`].
///
/// # Example
///
/// ```rust,ignore
/// use sessionguard::prelude::*;
///
/// let guard = SessionGuard::builder(my_host)
///     .source(JsonFileSource::new("sessionguard.json"))
///     .build()?;
/// guard.start()?;
/// ```
pub struct SessionGuardBuilder<H: SessionHost> {
    host: Arc<H>,
    config: GuardConfig,
    source: Option<Box<dyn ConfigSource>>,
    clock: Arc<dyn ClockSource>,
}

impl<H: SessionHost> SessionGuardBuilder<H> {
    /// Creates a builder with default configuration and the Tokio clock.
    pub fn new(host: H) -> Self {
        Self {
            host: Arc::new(host),
            config: GuardConfig::default(),
            source: None,
            clock: Arc::new(TokioClock),
        }
    }

    /// Uses `config` as-is. Ignored when a [`source`](Self::source) is set.
    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads configuration from `source` at build time and on every reload.
    pub fn source(mut self, source: impl ConfigSource) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Replaces the clock. Tests use this to control time.
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the service. Doesn't start the cleanup task; call
    /// [`SessionGuard::start`] for that.
    pub fn build(self) -> Result<SessionGuard<H>, SessionGuardError> {
        let config = match &self.source {
            Some(source) => {
                let loaded = source.load()?;
                info!(source = %source.describe(), "loaded configuration");
                loaded
            }
            None => {
                config::check(&self.config)?;
                self.config
            }
        }
        .validated();

        info!(
            grace_window_secs = config.grace_window_secs,
            admission_deadline_ms = config.admission_deadline_ms,
            logging_enabled = config.logging.enabled,
            "SessionGuard configured"
        );

        let registry = Arc::new(SessionRegistry::new(Arc::clone(&self.clock)));
        let grace = Arc::new(GraceWindowCache::new());
        let guard = Arc::new(EvictionGuard::new(Arc::clone(&self.clock)));
        let (config_tx, config_rx) = watch::channel(Arc::new(config));

        let coordinator = Arc::new(AdmissionCoordinator::new(
            Arc::clone(&self.host),
            Arc::clone(&registry),
            Arc::clone(&grace),
            Arc::clone(&guard),
            Arc::clone(&self.clock),
            config_rx,
        ));

        Ok(SessionGuard {
            host: self.host,
            registry,
            grace,
            guard,
            clock: self.clock,
            coordinator,
            config_tx,
            source: self.source,
            cleanup: Mutex::new(None),
        })
    }
}

/// The background sweep while it runs.
struct CleanupTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<SweepMetrics>,
}

/// Duplicate-session admission control for one host.
///
/// All methods take `&self`; share the service behind an `Arc`.
pub struct SessionGuard<H: SessionHost> {
    host: Arc<H>,
    registry: Arc<SessionRegistry>,
    grace: Arc<GraceWindowCache>,
    guard: Arc<EvictionGuard>,
    clock: Arc<dyn ClockSource>,
    coordinator: Arc<AdmissionCoordinator<H>>,
    config_tx: watch::Sender<Arc<GuardConfig>>,
    source: Option<Box<dyn ConfigSource>>,
    cleanup: Mutex<Option<CleanupTask>>,
}

impl<H: SessionHost> SessionGuard<H> {
    /// Creates a builder.
    pub fn builder(host: H) -> SessionGuardBuilder<H> {
        SessionGuardBuilder::new(host)
    }

    // -----------------------------------------------------------------
    // Host events
    // -----------------------------------------------------------------

    /// Decides whether a connection attempt may proceed.
    ///
    /// Resolves within the configured admission deadline. An admitted
    /// identity is already registered when this returns.
    pub async fn on_connection_attempt(&self, attempt: &ConnectionAttempt) -> AdmissionDecision {
        self.coordinator.admit(attempt).await
    }

    /// Like [`on_connection_attempt`](Self::on_connection_attempt), for
    /// hosts that hand identities over as strings.
    pub async fn on_raw_connection_attempt(
        &self,
        identity: &str,
        label: &str,
    ) -> Result<AdmissionDecision, SessionGuardError> {
        let attempt = ConnectionAttempt::parse(identity, label)?;
        Ok(self.coordinator.admit(&attempt).await)
    }

    /// Decides an attempt on its own task; the decision arrives on the
    /// returned channel.
    pub fn submit_attempt(&self, attempt: ConnectionAttempt) -> oneshot::Receiver<AdmissionDecision> {
        self.coordinator.submit(attempt)
    }

    /// Records that `identity` finished logging in.
    ///
    /// Admission already registers admitted identities; hosts that create
    /// sessions some other way (or admitted before the engine started)
    /// report them here.
    pub fn on_session_established(&self, identity: Identity, label: impl Into<String>) {
        let label = label.into();
        if self.config().logging.verbose {
            debug!(%identity, label = %label, "session established");
        }
        self.registry.register(identity, label);
    }

    /// Handles a terminated connection. Returns whether a record was
    /// removed.
    ///
    /// Only acts when `remove_on_quit` is on; otherwise the sweep removes
    /// the record once the host reports it gone. Removal is deferred while
    /// `identity` is being evicted. Inside its grace window the connection
    /// that closed may be the evicted one, so the host is asked whether a
    /// successor is still connected before the record is dropped.
    pub fn on_connection_terminated(&self, identity: &Identity) -> bool {
        let config = self.config();
        if !config.remove_on_quit {
            return false;
        }

        if self.guard.is_held(identity) {
            debug!(%identity, "termination during eviction, leaving record for the sweep");
            return false;
        }

        let now = self.clock.now();
        if self.grace.is_within_grace(identity, now, config.grace_window()) {
            match self.host.is_live(identity) {
                Ok(false) => {}
                Ok(true) => {
                    debug!(%identity, "evicted connection closed, successor still connected");
                    return false;
                }
                Err(error) => {
                    warn!(%identity, %error, "liveness probe failed, leaving record for the sweep");
                    return false;
                }
            }
        }

        let removed = self.registry.unregister(identity);
        if removed && config.logging.verbose {
            info!(%identity, "session removed on disconnect");
        }
        removed
    }

    // -----------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<GuardConfig> {
        Arc::clone(&self.config_tx.borrow())
    }

    /// Reloads from the configured source and publishes the result.
    ///
    /// On error the running configuration is left unchanged.
    pub fn reload_config(&self) -> Result<Arc<GuardConfig>, SessionGuardError> {
        let source = self.source.as_deref().ok_or(ConfigError::NoSource)?;
        let config = source.load()?;
        info!(source = %source.describe(), "configuration reloaded");
        Ok(self.publish(config))
    }

    /// Replaces the configuration with `config` directly.
    pub fn update_config(&self, config: GuardConfig) -> Result<Arc<GuardConfig>, SessionGuardError> {
        config::check(&config)?;
        Ok(self.publish(config))
    }

    fn publish(&self, config: GuardConfig) -> Arc<GuardConfig> {
        let config = Arc::new(config.validated());
        self.config_tx.send_replace(Arc::clone(&config));
        config
    }

    /// Forgets every recorded eviction. Returns how many were dropped.
    pub fn clear_grace_cache(&self) -> usize {
        let cleared = self.grace.clear_all();
        info!(cleared, "grace cache cleared");
        cleared
    }

    /// Current counts and settings.
    pub fn status(&self) -> StatusReport {
        let config = self.config();
        let metrics = self.admission_metrics();
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            active_sessions: self.registry.len(),
            grace_entries: self.grace.len(),
            evictions_in_progress: self.guard.len(),
            grace_window_secs: config.grace_window_secs,
            check_label: config.check_label,
            logging_enabled: config.logging.enabled,
            cleanup_running: self.is_running(),
            admitted: metrics.admitted(),
            denied: metrics.denied(),
        }
    }

    /// Decision counts since the service was built.
    pub fn admission_metrics(&self) -> AdmissionMetrics {
        self.coordinator.metrics()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn grace_cache(&self) -> &GraceWindowCache {
        &self.grace
    }

    pub fn eviction_guard(&self) -> &EvictionGuard {
        &self.guard
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Spawns the cleanup task. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), SessionGuardError> {
        let mut cleanup = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner);
        if cleanup.is_some() {
            return Err(SessionGuardError::AlreadyRunning);
        }

        let scheduler = CleanupScheduler::new(
            Arc::clone(&self.host),
            Arc::clone(&self.registry),
            Arc::clone(&self.grace),
            Arc::clone(&self.guard),
            Arc::clone(&self.clock),
            self.config_tx.subscribe(),
        );
        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(async move {
            let _ = stop_rx.await;
        }));

        *cleanup = Some(CleanupTask { stop, handle });
        info!("SessionGuard started");
        Ok(())
    }

    /// Whether the cleanup task is running.
    pub fn is_running(&self) -> bool {
        self.cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stops the cleanup task and drops all session state.
    ///
    /// Returns the sweep totals if the task was running. Evictions already
    /// in flight finish on their own; their results land in an empty cache
    /// and expire normally.
    pub async fn shutdown(&self) -> Option<SweepMetrics> {
        let task = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let metrics = match task {
            Some(CleanupTask { stop, handle }) => {
                let _ = stop.send(());
                match handle.await {
                    Ok(metrics) => Some(metrics),
                    Err(error) => {
                        warn!(%error, "cleanup task ended abnormally");
                        None
                    }
                }
            }
            None => None,
        };

        let sessions = self.registry.clear();
        let grace = self.grace.clear_all();
        let guards = self.guard.force_clear_all();
        info!(sessions, grace, guards, "SessionGuard shut down");
        metrics
    }
}

//! The admission coordinator: one state machine per connection attempt.
//!
//! The coordinator holds handles to the three shared stores and the host,
//! and walks each attempt through duplicate check → grace check → guard →
//! eviction. The order matters:
//!
//! - The grace check runs *before* the guard so a client reconnecting right
//!   after its own eviction isn't kicked again, and so a second duplicate
//!   pass doesn't start an eviction against a session that is already gone.
//! - The guard is keyed on the identity being evicted, so at most one
//!   eviction per holder is ever in flight.
//!
//! # Deadlines
//!
//! Each attempt resolves by its deadline. The eviction itself runs as a
//! separate task; if the deadline passes first the attempt is denied but
//! the task keeps going. When it later succeeds it still writes the grace
//! mark, so the client's next attempt gets in on the grace path.

use std::sync::Arc;
use std::time::Duration;

use sessionguard_protocol::{
    AdmissionDecision, AdmitPath, ConnectionAttempt, DenyReason, Identity,
};
use sessionguard_session::{
    ClockSource, EvictionGuard, GraceWindowCache, GuardConfig, HostError,
    SessionHost, SessionRegistry,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::AdmissionMetrics;
use crate::metrics::DecisionCounters;

/// Decides admit/deny for connection attempts.
///
/// Cheap to share: wrap it in an `Arc` and call [`admit`](Self::admit) from
/// as many tasks as there are attempts.
pub struct AdmissionCoordinator<H: SessionHost> {
    host: Arc<H>,
    registry: Arc<SessionRegistry>,
    grace: Arc<GraceWindowCache>,
    guard: Arc<EvictionGuard>,
    clock: Arc<dyn ClockSource>,
    /// Current configuration. Read once per attempt, so a reload never
    /// changes the rules halfway through a decision.
    config: watch::Receiver<Arc<GuardConfig>>,
    counters: DecisionCounters,
}

impl<H: SessionHost> AdmissionCoordinator<H> {
    /// Creates a coordinator over the given stores.
    pub fn new(
        host: Arc<H>,
        registry: Arc<SessionRegistry>,
        grace: Arc<GraceWindowCache>,
        guard: Arc<EvictionGuard>,
        clock: Arc<dyn ClockSource>,
        config: watch::Receiver<Arc<GuardConfig>>,
    ) -> Self {
        Self {
            host,
            registry,
            grace,
            guard,
            clock,
            config,
            counters: DecisionCounters::default(),
        }
    }

    /// Decides an attempt using the configured admission deadline.
    pub async fn admit(&self, attempt: &ConnectionAttempt) -> AdmissionDecision {
        let deadline = Instant::now() + self.current_config().admission_deadline();
        self.admit_until(attempt, deadline).await
    }

    /// Decides an attempt, resolving no later than `deadline`.
    ///
    /// Never returns an error: every failure inside the workflow becomes a
    /// [`AdmissionDecision::Deny`] with the configured message.
    pub async fn admit_until(
        &self,
        attempt: &ConnectionAttempt,
        deadline: Instant,
    ) -> AdmissionDecision {
        let config = self.current_config();
        let decision = self.decide(attempt, deadline, &config).await;
        self.counters.record(&decision);
        decision
    }

    /// Spawns the decision as its own task and returns a channel that
    /// receives it.
    ///
    /// For hosts whose event thread must not await: hand over the attempt,
    /// poll or await the receiver wherever is convenient. If the receiver is
    /// dropped the decision is still made (and any admit still registers).
    pub fn submit(
        self: &Arc<Self>,
        attempt: ConnectionAttempt,
    ) -> oneshot::Receiver<AdmissionDecision> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let decision = this.admit(&attempt).await;
            let _ = reply_tx.send(decision);
        });
        reply_rx
    }

    /// Counts of decisions made so far.
    pub fn metrics(&self) -> AdmissionMetrics {
        self.counters.snapshot()
    }

    fn current_config(&self) -> Arc<GuardConfig> {
        self.config.borrow().clone()
    }

    async fn decide(
        &self,
        attempt: &ConnectionAttempt,
        deadline: Instant,
        config: &GuardConfig,
    ) -> AdmissionDecision {
        let identity = attempt.identity;
        let label = attempt.label.as_str();
        let log = config.logging;

        if log.log_duplicate_detection {
            info!(%identity, label, "pre-admission duplicate check");
        }

        // --- CheckDuplicate ---
        let Some(holder) = self.find_holder(attempt, config) else {
            self.registry.register(identity, label);
            if log.enabled && log.verbose {
                info!(%identity, label, "admitted (no duplicate session)");
            }
            return AdmissionDecision::admit(AdmitPath::Fresh);
        };

        if log.enabled {
            info!(%identity, %holder, label, "duplicate session detected");
        }

        // --- CheckGrace ---
        let now = self.clock.now();
        let window = config.grace_window();
        if log.debug_mode {
            let since_eviction = self
                .grace
                .mark(&identity)
                .map(|mark| now.saturating_duration_since(mark.evicted_at));
            debug!(
                %identity,
                since_eviction_ms = ?since_eviction.map(millis),
                window_ms = millis(window),
                "grace window check"
            );
        }
        if self.grace.is_within_grace(&identity, now, window) {
            self.registry.register(identity, label);
            self.grace.clear(&identity);
            if log.log_reconnections {
                info!(%identity, label, "allowing reconnection within grace window");
            }
            return AdmissionDecision::admit(AdmitPath::GraceReconnect);
        }

        if Instant::now() >= deadline {
            warn!(%identity, "admission deadline passed before eviction could start");
            return deny(config, DenyReason::Timeout);
        }

        // --- AcquireGuard ---
        let Some(_token) = self.guard.acquire(holder) else {
            if log.enabled {
                info!(%identity, %holder, "eviction already in progress — denying");
            }
            return deny(config, DenyReason::AlreadyInProgress);
        };

        // The holder may have left between the duplicate check and now.
        let Some(holder_record) = self.registry.get(&holder) else {
            warn!(
                %identity,
                %holder,
                "guard acquired but holder has no session record — admitting without eviction"
            );
            self.registry.register(identity, label);
            return AdmissionDecision::admit(AdmitPath::Fresh);
        };

        // --- Evicting ---
        let started = Instant::now();
        let eviction = self.spawn_eviction(
            holder,
            identity,
            config.eviction_message.clone(),
            log.log_kick_events,
        );

        match tokio::time::timeout_at(deadline, eviction).await {
            Ok(Ok(Ok(()))) => {
                if holder != identity {
                    self.registry.unregister_if(&holder, holder_record.seq);
                }
                self.registry.register(identity, label);
                if log.log_kick_events {
                    info!(
                        %identity,
                        %holder,
                        elapsed_ms = millis(started.elapsed()),
                        "previous session evicted, new connection admitted"
                    );
                }
                AdmissionDecision::admit(AdmitPath::AfterEviction)
            }
            Ok(Ok(Err(error))) => {
                warn!(%identity, %holder, %error, "eviction failed — denying");
                deny(config, DenyReason::EvictionFailed)
            }
            Ok(Err(join_error)) => {
                warn!(%identity, %holder, error = %join_error, "eviction task aborted — denying");
                deny(config, DenyReason::Internal)
            }
            Err(_) => {
                warn!(
                    %identity,
                    %holder,
                    waited_ms = millis(started.elapsed()),
                    "timed out waiting for eviction — denying"
                );
                deny(config, DenyReason::Timeout)
            }
        }
        // `_token` drops here on every path, releasing the guard.
    }

    /// Finds the identity whose session this attempt duplicates, if any.
    fn find_holder(
        &self,
        attempt: &ConnectionAttempt,
        config: &GuardConfig,
    ) -> Option<Identity> {
        if self.registry.is_active(&attempt.identity) {
            return Some(attempt.identity);
        }
        if config.check_label {
            return self
                .registry
                .holder_by_label(&attempt.label)
                .filter(|holder| *holder != attempt.identity);
        }
        None
    }

    /// Starts evicting `holder` on its own task.
    ///
    /// The task records the grace mark for `identity` itself, so a success
    /// that lands after the attempt already timed out is not lost.
    fn spawn_eviction(
        &self,
        holder: Identity,
        identity: Identity,
        message: String,
        log_kicks: bool,
    ) -> JoinHandle<Result<(), HostError>> {
        let host = Arc::clone(&self.host);
        let grace = Arc::clone(&self.grace);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let result = host.evict(holder, &message).await;
            if result.is_ok() {
                grace.mark_evicted(identity, clock.now());
                if log_kicks {
                    info!(%identity, %holder, "recorded eviction in grace cache");
                }
            }
            result
        })
    }
}

fn deny(config: &GuardConfig, reason: DenyReason) -> AdmissionDecision {
    AdmissionDecision::deny(reason, config.messages.for_reason(reason))
}

/// Milliseconds for log fields, saturating instead of truncating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates_instead_of_truncating() {
        assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}

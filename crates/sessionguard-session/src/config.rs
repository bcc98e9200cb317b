//! Tunables for the engine.
//!
//! One [`GuardConfig`] value describes everything an operator can change at
//! runtime: timings, policy toggles, the messages denied clients see, and
//! which informational log lines are emitted. Every field has a default, so
//! a config file only needs to mention what it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessionguard_protocol::DenyReason;
use tracing::warn;

// ---------------------------------------------------------------------------
// GuardConfig
// ---------------------------------------------------------------------------

/// Full engine configuration.
///
/// `#[serde(default)]` fills any field missing from the source with the
/// value from [`Default`], so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// How long after an eviction a reconnection by the same identity is
    /// treated as legitimate. Default: 2 seconds.
    pub grace_window_secs: u64,

    /// Extra time a grace mark is kept past the window before the sweep
    /// drops it. Default: 1000 ms.
    pub safety_margin_ms: u64,

    /// Period of the cleanup sweep. Default: 60 seconds.
    pub cleanup_period_secs: u64,

    /// Random delay (0..this) added before the first sweep so several
    /// engines started together don't sweep in lockstep. Default: 250 ms.
    pub initial_jitter_ms: u64,

    /// Hard bound on a single admission decision. Default: 3000 ms.
    pub admission_deadline_ms: u64,

    /// Also treat a different identity with the same display label as a
    /// duplicate. Default: off.
    pub check_label: bool,

    /// Unregister a session as soon as the host reports its connection
    /// terminated, instead of waiting for the sweep. Default: off.
    pub remove_on_quit: bool,

    /// Eviction guard marks held longer than this are cleared by the sweep.
    /// Default: 30 seconds.
    pub guard_ceiling_secs: u64,

    /// Clear every eviction guard mark on each sweep, regardless of age.
    /// Default: off. Turning this on can let a second eviction start while
    /// a slow one is still running.
    pub force_clear_guards: bool,

    /// Client-facing denial messages.
    pub messages: DenyMessages,

    /// Shown to the connection that gets evicted. Read from the config in
    /// effect when the eviction starts and handed to
    /// [`SessionHost::evict`](crate::SessionHost::evict).
    pub eviction_message: String,

    /// Informational log toggles.
    pub logging: LoggingConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            grace_window_secs: 2,
            safety_margin_ms: 1_000,
            cleanup_period_secs: 60,
            initial_jitter_ms: 250,
            admission_deadline_ms: 3_000,
            check_label: false,
            remove_on_quit: false,
            guard_ceiling_secs: 30,
            force_clear_guards: false,
            messages: DenyMessages::default(),
            eviction_message: "You were disconnected because you logged in from another location."
                .into(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Shortest admission deadline accepted.
    pub const MIN_DEADLINE_MS: u64 = 50;
    /// Longest admission deadline accepted.
    pub const MAX_DEADLINE_MS: u64 = 30_000;

    /// Clamp and fix out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - `admission_deadline_ms` clamped to
    ///   [`MIN_DEADLINE_MS`](Self::MIN_DEADLINE_MS)..=[`MAX_DEADLINE_MS`](Self::MAX_DEADLINE_MS).
    /// - `cleanup_period_secs` at least 1.
    /// - `guard_ceiling_secs` strictly longer than the admission deadline, so
    ///   the safety net never clears a mark a live attempt is still using.
    /// - `initial_jitter_ms` no longer than one cleanup period.
    pub fn validated(mut self) -> Self {
        let deadline = self
            .admission_deadline_ms
            .clamp(Self::MIN_DEADLINE_MS, Self::MAX_DEADLINE_MS);
        if deadline != self.admission_deadline_ms {
            warn!(
                requested = self.admission_deadline_ms,
                clamped = deadline,
                "admission_deadline_ms out of range — clamping"
            );
            self.admission_deadline_ms = deadline;
        }

        if self.cleanup_period_secs == 0 {
            warn!("cleanup_period_secs is 0 — using 1");
            self.cleanup_period_secs = 1;
        }

        let min_ceiling = self.admission_deadline_ms.div_ceil(1_000) + 1;
        if self.guard_ceiling_secs < min_ceiling {
            warn!(
                requested = self.guard_ceiling_secs,
                raised = min_ceiling,
                "guard_ceiling_secs must exceed the admission deadline — raising"
            );
            self.guard_ceiling_secs = min_ceiling;
        }

        let period_ms = self.cleanup_period_secs.saturating_mul(1_000);
        if self.initial_jitter_ms > period_ms {
            self.initial_jitter_ms = period_ms;
        }
        self
    }

    /// The grace window as a `Duration`.
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }

    /// The safety margin as a `Duration`.
    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    /// The cleanup period as a `Duration`.
    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_period_secs)
    }

    /// The admission deadline as a `Duration`.
    pub fn admission_deadline(&self) -> Duration {
        Duration::from_millis(self.admission_deadline_ms)
    }

    /// The guard safety-net ceiling as a `Duration`.
    pub fn guard_ceiling(&self) -> Duration {
        Duration::from_secs(self.guard_ceiling_secs)
    }
}

// ---------------------------------------------------------------------------
// DenyMessages
// ---------------------------------------------------------------------------

/// What a denied client is told, per denial reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenyMessages {
    /// The eviction didn't finish before the deadline.
    pub timeout: String,
    /// The previous holder could not be evicted.
    pub conflict: String,
    /// Another login for the same identity is being processed.
    pub in_progress: String,
    /// Anything else.
    pub error: String,
}

impl Default for DenyMessages {
    fn default() -> Self {
        Self {
            timeout: "Connection timeout. Please try again.".into(),
            conflict: "Unable to resolve session conflict. Please try again.".into(),
            in_progress: "A login for this account is already in progress. Please try again."
                .into(),
            error: "Internal error checking session.".into(),
        }
    }
}

impl DenyMessages {
    /// The configured message for `reason`.
    pub fn for_reason(&self, reason: DenyReason) -> &str {
        match reason {
            DenyReason::Timeout => &self.timeout,
            DenyReason::EvictionFailed => &self.conflict,
            DenyReason::AlreadyInProgress => &self.in_progress,
            DenyReason::Internal => &self.error,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

/// Toggles for informational log events.
///
/// Warnings (timeouts, failed evictions, inconsistencies) are always
/// emitted; these only gate the chattier `info` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Master switch for admission and lifecycle events.
    pub enabled: bool,
    /// Per-sweep summaries and fresh admissions.
    pub verbose: bool,
    /// Evictions and grace marks.
    pub log_kick_events: bool,
    /// Grace-window reconnections.
    pub log_reconnections: bool,
    /// Every pre-admission duplicate check.
    pub log_duplicate_detection: bool,
    /// Grace-window arithmetic for each check.
    pub debug_mode: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose: false,
            log_kick_events: true,
            log_reconnections: true,
            log_duplicate_detection: false,
            debug_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_values() {
        let cfg = GuardConfig::default();
        assert_eq!(cfg.grace_window(), Duration::from_secs(2));
        assert_eq!(cfg.safety_margin(), Duration::from_secs(1));
        assert_eq!(cfg.cleanup_period(), Duration::from_secs(60));
        assert_eq!(cfg.admission_deadline(), Duration::from_millis(3000));
        assert!(!cfg.check_label);
        assert!(!cfg.remove_on_quit);
        assert!(!cfg.force_clear_guards);
        assert!(cfg.logging.enabled);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let cfg: GuardConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, GuardConfig::default());
    }

    #[test]
    fn test_partial_json_overrides_only_named_fields() {
        let cfg: GuardConfig = serde_json::from_str(
            r#"{ "grace_window_secs": 5, "logging": { "verbose": true } }"#,
        )
        .unwrap();
        assert_eq!(cfg.grace_window_secs, 5);
        assert!(cfg.logging.verbose);
        assert!(cfg.logging.enabled, "unnamed nested fields keep defaults");
        assert_eq!(cfg.admission_deadline_ms, 3_000);
    }

    #[test]
    fn test_validated_clamps_deadline() {
        let cfg = GuardConfig {
            admission_deadline_ms: 5,
            ..GuardConfig::default()
        }
        .validated();
        assert_eq!(cfg.admission_deadline_ms, GuardConfig::MIN_DEADLINE_MS);

        let cfg = GuardConfig {
            admission_deadline_ms: 120_000,
            ..GuardConfig::default()
        }
        .validated();
        assert_eq!(cfg.admission_deadline_ms, GuardConfig::MAX_DEADLINE_MS);
    }

    #[test]
    fn test_validated_raises_guard_ceiling_above_deadline() {
        let cfg = GuardConfig {
            admission_deadline_ms: 3_000,
            guard_ceiling_secs: 1,
            ..GuardConfig::default()
        }
        .validated();
        assert_eq!(cfg.guard_ceiling_secs, 4);
    }

    #[test]
    fn test_validated_zero_period_becomes_one() {
        let cfg = GuardConfig {
            cleanup_period_secs: 0,
            ..GuardConfig::default()
        }
        .validated();
        assert_eq!(cfg.cleanup_period_secs, 1);
        assert!(cfg.initial_jitter_ms <= 1_000);
    }

    #[test]
    fn test_messages_for_reason() {
        let msgs = DenyMessages::default();
        assert_eq!(msgs.for_reason(DenyReason::Timeout), msgs.timeout);
        assert_eq!(msgs.for_reason(DenyReason::EvictionFailed), msgs.conflict);
        assert_eq!(msgs.for_reason(DenyReason::AlreadyInProgress), msgs.in_progress);
        assert_eq!(msgs.for_reason(DenyReason::Internal), msgs.error);
    }
}

//! Decision counters.

use std::sync::atomic::{AtomicU64, Ordering};

use sessionguard_protocol::{AdmissionDecision, AdmitPath, DenyReason};

/// Running totals of admission outcomes, by path and reason.
///
/// Counters are relaxed atomics: they are reported, never used to decide
/// anything.
#[derive(Debug, Default)]
pub(crate) struct DecisionCounters {
    fresh: AtomicU64,
    grace: AtomicU64,
    after_eviction: AtomicU64,
    timeout: AtomicU64,
    eviction_failed: AtomicU64,
    in_progress: AtomicU64,
    internal: AtomicU64,
}

impl DecisionCounters {
    pub(crate) fn record(&self, decision: &AdmissionDecision) {
        let counter = match decision {
            AdmissionDecision::Admit { path } => match path {
                AdmitPath::Fresh => &self.fresh,
                AdmitPath::GraceReconnect => &self.grace,
                AdmitPath::AfterEviction => &self.after_eviction,
            },
            AdmissionDecision::Deny { reason, .. } => match reason {
                DenyReason::Timeout => &self.timeout,
                DenyReason::EvictionFailed => &self.eviction_failed,
                DenyReason::AlreadyInProgress => &self.in_progress,
                DenyReason::Internal => &self.internal,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AdmissionMetrics {
        AdmissionMetrics {
            admitted_fresh: self.fresh.load(Ordering::Relaxed),
            admitted_grace: self.grace.load(Ordering::Relaxed),
            admitted_after_eviction: self.after_eviction.load(Ordering::Relaxed),
            denied_timeout: self.timeout.load(Ordering::Relaxed),
            denied_eviction_failed: self.eviction_failed.load(Ordering::Relaxed),
            denied_in_progress: self.in_progress.load(Ordering::Relaxed),
            denied_internal: self.internal.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionMetrics {
    pub admitted_fresh: u64,
    pub admitted_grace: u64,
    pub admitted_after_eviction: u64,
    pub denied_timeout: u64,
    pub denied_eviction_failed: u64,
    pub denied_in_progress: u64,
    pub denied_internal: u64,
}

impl AdmissionMetrics {
    /// Total admitted attempts.
    pub fn admitted(&self) -> u64 {
        self.admitted_fresh + self.admitted_grace + self.admitted_after_eviction
    }

    /// Total denied attempts.
    pub fn denied(&self) -> u64 {
        self.denied_timeout
            + self.denied_eviction_failed
            + self.denied_in_progress
            + self.denied_internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_by_path_and_reason() {
        let counters = DecisionCounters::default();
        counters.record(&AdmissionDecision::admit(AdmitPath::Fresh));
        counters.record(&AdmissionDecision::admit(AdmitPath::Fresh));
        counters.record(&AdmissionDecision::admit(AdmitPath::AfterEviction));
        counters.record(&AdmissionDecision::deny(DenyReason::Timeout, "t"));

        let m = counters.snapshot();
        assert_eq!(m.admitted_fresh, 2);
        assert_eq!(m.admitted_after_eviction, 1);
        assert_eq!(m.denied_timeout, 1);
        assert_eq!(m.admitted(), 3);
        assert_eq!(m.denied(), 1);
    }
}

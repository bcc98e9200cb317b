//! The grace-window cache: who was evicted recently.
//!
//! When the engine evicts an identity's old session to admit a new one,
//! it writes a mark here. A reconnection by the same identity inside the
//! grace window is then treated as legitimate (the tail end of the same
//! eviction) instead of as a fresh duplicate that would trigger another
//! eviction.
//!
//! Queries never delete. Expired marks stay in the map until the cleanup
//! sweep removes them, so a reader can't race a writer into deleting a mark
//! that was just refreshed.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sessionguard_protocol::Identity;

use crate::EvictionMark;

/// Identity → instant of the most recent eviction.
#[derive(Default)]
pub struct GraceWindowCache {
    marks: DashMap<Identity, Instant>,
}

impl GraceWindowCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `identity` was evicted at `now`, replacing any older
    /// mark.
    pub fn mark_evicted(&self, identity: Identity, now: Instant) {
        self.marks.insert(identity, now);
    }

    /// Returns `true` iff a mark exists and `now - evicted_at < window`.
    ///
    /// Does not remove anything, even when the mark has expired.
    pub fn is_within_grace(
        &self,
        identity: &Identity,
        now: Instant,
        window: Duration,
    ) -> bool {
        self.marks
            .get(identity)
            .is_some_and(|evicted_at| now.saturating_duration_since(*evicted_at) < window)
    }

    /// The current mark for `identity`, if any.
    pub fn mark(&self, identity: &Identity) -> Option<EvictionMark> {
        self.marks.get(identity).map(|entry| EvictionMark {
            identity: *entry.key(),
            evicted_at: *entry.value(),
        })
    }

    /// Removes the mark for `identity`. Returns `true` if one existed.
    pub fn clear(&self, identity: &Identity) -> bool {
        self.marks.remove(identity).is_some()
    }

    /// Drops every mark. Returns how many there were.
    pub fn clear_all(&self) -> usize {
        let mut removed = 0;
        self.marks.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    /// Removes every mark older than `window + safety_margin`.
    /// Returns how many were removed.
    ///
    /// A mark aged exactly `window + safety_margin` is kept; only strictly
    /// older ones go.
    pub fn sweep_expired(
        &self,
        now: Instant,
        window: Duration,
        safety_margin: Duration,
    ) -> usize {
        let limit = window.saturating_add(safety_margin);
        let mut removed = 0;
        self.marks.retain(|_, evicted_at| {
            let keep = now.saturating_duration_since(*evicted_at) <= limit;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Removes marks that are no longer grace-eligible (`age >= window`)
    /// for identities `is_active` reports as connected.
    ///
    /// Once the window has passed, a mark for a connected identity can only
    /// ever answer "no", so there is no reason to keep the identity in both
    /// the registry and this cache until the safety margin runs out.
    pub fn retain_unresolved<F>(&self, now: Instant, window: Duration, mut is_active: F) -> usize
    where
        F: FnMut(&Identity) -> bool,
    {
        let mut removed = 0;
        self.marks.retain(|identity, evicted_at| {
            let elapsed = now.saturating_duration_since(*evicted_at) >= window;
            let keep = !(elapsed && is_active(identity));
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of marks currently stored (expired or not).
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Returns `true` if no marks are stored.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(2);
    const MARGIN: Duration = Duration::from_secs(1);

    fn id(n: u128) -> Identity {
        Identity::from_u128(n)
    }

    #[test]
    fn test_is_within_grace_unknown_identity_returns_false() {
        let cache = GraceWindowCache::new();
        assert!(!cache.is_within_grace(&id(1), Instant::now(), WINDOW));
    }

    #[test]
    fn test_is_within_grace_inside_window_returns_true() {
        let cache = GraceWindowCache::new();
        let t0 = Instant::now();
        cache.mark_evicted(id(1), t0);

        assert!(cache.is_within_grace(&id(1), t0, WINDOW));
        assert!(cache.is_within_grace(&id(1), t0 + Duration::from_millis(1999), WINDOW));
    }

    #[test]
    fn test_is_within_grace_at_window_boundary_returns_false() {
        let cache = GraceWindowCache::new();
        let t0 = Instant::now();
        cache.mark_evicted(id(1), t0);

        assert!(!cache.is_within_grace(&id(1), t0 + WINDOW, WINDOW));
    }

    #[test]
    fn test_is_within_grace_expired_does_not_delete() {
        let cache = GraceWindowCache::new();
        let t0 = Instant::now();
        cache.mark_evicted(id(1), t0);

        assert!(!cache.is_within_grace(&id(1), t0 + Duration::from_secs(10), WINDOW));
        assert_eq!(cache.len(), 1, "queries never delete");
    }

    #[test]
    fn test_mark_evicted_overwrites_timestamp() {
        let cache = GraceWindowCache::new();
        let t0 = Instant::now();
        cache.mark_evicted(id(1), t0);
        cache.mark_evicted(id(1), t0 + Duration::from_secs(5));

        assert_eq!(
            cache.mark(&id(1)).unwrap().evicted_at,
            t0 + Duration::from_secs(5)
        );
        assert!(cache.is_within_grace(&id(1), t0 + Duration::from_secs(6), WINDOW));
    }

    #[test]
    fn test_clear_removes_mark() {
        let cache = GraceWindowCache::new();
        cache.mark_evicted(id(1), Instant::now());

        assert!(cache.clear(&id(1)));
        assert!(!cache.clear(&id(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_all_returns_count() {
        let cache = GraceWindowCache::new();
        let now = Instant::now();
        cache.mark_evicted(id(1), now);
        cache.mark_evicted(id(2), now);

        assert_eq!(cache.clear_all(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_expired_removes_exactly_older_than_limit() {
        let cache = GraceWindowCache::new();
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(10);

        // Ages: 10s (old), 3s + 1ms (just past), 3s (exactly at limit), 1s.
        cache.mark_evicted(id(1), t0);
        cache.mark_evicted(id(2), now - Duration::from_millis(3001));
        cache.mark_evicted(id(3), now - Duration::from_secs(3));
        cache.mark_evicted(id(4), now - Duration::from_secs(1));

        let removed = cache.sweep_expired(now, WINDOW, MARGIN);

        assert_eq!(removed, 2);
        assert!(cache.mark(&id(1)).is_none());
        assert!(cache.mark(&id(2)).is_none());
        assert!(cache.mark(&id(3)).is_some(), "age == limit is kept");
        assert!(cache.mark(&id(4)).is_some());
    }

    #[test]
    fn test_retain_unresolved_only_drops_elapsed_active_marks() {
        let cache = GraceWindowCache::new();
        let t0 = Instant::now();
        let now = t0 + Duration::from_millis(2500);

        cache.mark_evicted(id(1), t0); // elapsed, active → dropped
        cache.mark_evicted(id(2), t0); // elapsed, not active → kept
        cache.mark_evicted(id(3), now); // fresh, active → kept

        let removed = cache.retain_unresolved(now, WINDOW, |i| *i != id(2));

        assert_eq!(removed, 1);
        assert!(cache.mark(&id(1)).is_none());
        assert!(cache.mark(&id(2)).is_some());
        assert!(cache.mark(&id(3)).is_some());
    }
}

//! The eviction guard: at most one eviction workflow per identity.
//!
//! Before the admission coordinator asks the host to evict an identity's
//! current holder, it must win the guard for that identity. A second
//! attempt arriving while the first is still evicting loses the race and is
//! denied, which is what stops two clients fighting over one account from
//! kicking each other in a loop.
//!
//! The preferred way in is [`EvictionGuard::acquire`], which hands back a
//! [`GuardToken`]. Dropping the token releases the mark, so every exit path
//! (success, failure, timeout, early return, panic unwinding) lets go.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sessionguard_protocol::Identity;

use crate::{ClockSource, TokioClock};

#[derive(Debug, Clone, Copy)]
struct GuardMark {
    generation: u64,
    acquired_at: std::time::Instant,
}

/// Per-identity mutual exclusion for eviction workflows.
pub struct EvictionGuard {
    marks: DashMap<Identity, GuardMark>,
    next_generation: AtomicU64,
    clock: Arc<dyn ClockSource>,
}

impl EvictionGuard {
    /// Creates an empty guard set timestamped by `clock`.
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            marks: DashMap::new(),
            next_generation: AtomicU64::new(1),
            clock,
        }
    }

    /// Atomic test-and-set. Returns the new mark's generation if this
    /// caller now holds the identity, `None` if someone else does.
    fn insert_mark(&self, identity: Identity) -> Option<u64> {
        match self.marks.entry(identity) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                slot.insert(GuardMark {
                    generation,
                    acquired_at: self.clock.now(),
                });
                Some(generation)
            }
        }
    }

    /// Tries to take exclusive eviction rights for `identity`.
    ///
    /// Returns `false` if another workflow already holds them; the caller
    /// must then treat the duplicate as already being handled and never
    /// evict a second time. A `true` result must be paired with
    /// [`release`](Self::release) on every exit path; prefer
    /// [`acquire`](Self::acquire), which does that automatically.
    pub fn try_acquire(&self, identity: Identity) -> bool {
        self.insert_mark(identity).is_some()
    }

    /// Scoped form of [`try_acquire`](Self::try_acquire).
    ///
    /// The returned token releases the mark when dropped. It only removes
    /// the mark it created: if the safety net cleared it and another
    /// workflow has since taken the identity, dropping the stale token
    /// leaves the newer mark alone.
    pub fn acquire(&self, identity: Identity) -> Option<GuardToken<'_>> {
        self.insert_mark(identity).map(|generation| GuardToken {
            guard: self,
            identity,
            generation,
        })
    }

    /// Releases `identity`. Idempotent; returns `true` if a mark was removed.
    pub fn release(&self, identity: &Identity) -> bool {
        self.marks.remove(identity).is_some()
    }

    /// Returns `true` if an eviction workflow currently holds `identity`.
    pub fn is_held(&self, identity: &Identity) -> bool {
        self.marks.contains_key(identity)
    }

    /// Clears every mark. Returns how many were cleared.
    ///
    /// Only a safety net: a correct workflow always releases its own mark.
    /// Clearing a mark held by a slow but live workflow lets a second
    /// eviction start for the same identity, so the cleanup sweep uses
    /// [`clear_older_than`](Self::clear_older_than) unless configured
    /// otherwise.
    pub fn force_clear_all(&self) -> usize {
        let mut cleared = 0;
        self.marks.retain(|_, _| {
            cleared += 1;
            false
        });
        if cleared > 0 {
            tracing::warn!(cleared, "force-cleared all eviction guard marks");
        }
        cleared
    }

    /// Clears marks held for longer than `ceiling`. Returns how many.
    pub fn clear_older_than(&self, ceiling: Duration) -> usize {
        let now = self.clock.now();
        let mut cleared = 0;
        self.marks.retain(|identity, mark| {
            let held_for = now.saturating_duration_since(mark.acquired_at);
            if held_for > ceiling {
                tracing::warn!(
                    %identity,
                    held_ms = u64::try_from(held_for.as_millis()).unwrap_or(u64::MAX),
                    "clearing stuck eviction guard mark"
                );
                cleared += 1;
                false
            } else {
                true
            }
        });
        cleared
    }

    /// Number of identities currently being evicted.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Returns `true` if no eviction is in progress.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

impl Default for EvictionGuard {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}

/// Exclusive eviction rights for one identity, released on drop.
#[must_use = "dropping the token releases the guard immediately"]
pub struct GuardToken<'a> {
    guard: &'a EvictionGuard,
    identity: Identity,
    generation: u64,
}

impl GuardToken<'_> {
    /// The identity this token holds.
    pub fn identity(&self) -> Identity {
        self.identity
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.guard
            .marks
            .remove_if(&self.identity, |_, mark| mark.generation == generation);
    }
}

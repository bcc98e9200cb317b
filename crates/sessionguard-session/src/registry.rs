//! The session registry: who is connected right now.
//!
//! This is the source of truth for "is this identity currently connected".
//! It is written by the admission coordinator (and by the host's
//! "session established" notification) and pruned by the cleanup sweep.
//!
//! # Concurrency note
//!
//! Unlike a single-owner `HashMap` behind a mutex, the registry is a
//! sharded `DashMap`: operations on unrelated identities touch different
//! shards and never wait on each other. `register` is a plain insert, so
//! two concurrent registrations for the same identity resolve as
//! last-write-wins. That race is accepted; the eviction guard and grace
//! check upstream keep it rare.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use sessionguard_protocol::Identity;

use crate::{ClockSource, SessionRecord, TokioClock};

/// Identity → active session metadata.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ [active] ──→ unregister()            (host reports quit)
///                    │    ──→ reconcile()             (cleanup finds it dead)
///                    │    ──→ register() again        (superseded)
/// ```
pub struct SessionRegistry {
    /// At most one record per identity: the map key enforces it.
    sessions: DashMap<Identity, SessionRecord>,

    /// Source of [`SessionRecord::seq`].
    next_seq: AtomicU64,

    clock: Arc<dyn ClockSource>,
}

impl SessionRegistry {
    /// Creates an empty registry stamping records with `clock`.
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            sessions: DashMap::new(),
            next_seq: AtomicU64::new(1),
            clock,
        }
    }

    /// Inserts or overwrites the record for `identity`.
    ///
    /// Unconditional: a previous record for the same identity is silently
    /// replaced and returned. Making sure the previous owner was evicted
    /// first is the admission coordinator's job, not the registry's.
    pub fn register(
        &self,
        identity: Identity,
        label: impl Into<String>,
    ) -> Option<SessionRecord> {
        let record = SessionRecord {
            identity,
            label: label.into(),
            admitted_at: self.clock.now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let previous = self.sessions.insert(identity, record);
        tracing::debug!(
            %identity,
            replaced = previous.is_some(),
            "session registered"
        );
        previous
    }

    /// Removes the record for `identity`. Returns `true` if one existed.
    pub fn unregister(&self, identity: &Identity) -> bool {
        let removed = self.sessions.remove(identity).is_some();
        if removed {
            tracing::debug!(%identity, "session unregistered");
        }
        removed
    }

    /// Removes the record for `identity` only if it is still the write
    /// identified by `seq`. Returns `true` if it was removed.
    ///
    /// This is the atomic "compare and delete" used whenever the caller
    /// decided to remove a record based on something it observed earlier.
    pub fn unregister_if(&self, identity: &Identity, seq: u64) -> bool {
        self.sessions
            .remove_if(identity, |_, record| record.seq == seq)
            .is_some()
    }

    /// Returns `true` if `identity` has an active record.
    pub fn is_active(&self, identity: &Identity) -> bool {
        self.sessions.contains_key(identity)
    }

    /// A copy of the record for `identity`, if any.
    pub fn get(&self, identity: &Identity) -> Option<SessionRecord> {
        self.sessions.get(identity).map(|entry| entry.value().clone())
    }

    /// Finds an active identity whose label matches `label`, ignoring
    /// ASCII case.
    ///
    /// Used by the label-matching duplicate policy. Linear in the number of
    /// sessions; labels are not indexed because the policy is off by
    /// default and lookups only happen for identities that are not active.
    pub fn holder_by_label(&self, label: &str) -> Option<Identity> {
        self.sessions
            .iter()
            .find(|entry| entry.value().label.eq_ignore_ascii_case(label))
            .map(|entry| *entry.key())
    }

    /// Removes every record whose connection `is_live` reports as gone.
    /// Returns how many were removed.
    ///
    /// The probe runs against a snapshot, never while a shard lock is held,
    /// so a probe that calls back into the registry cannot deadlock. Each
    /// removal is conditional on the record still being the one that was
    /// probed: an identity that re-registered while the sweep was running
    /// keeps its new record.
    pub fn reconcile<F>(&self, mut is_live: F) -> usize
    where
        F: FnMut(&Identity) -> bool,
    {
        let observed: Vec<(Identity, u64)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().seq))
            .collect();

        let mut removed = 0;
        for (identity, seq) in observed {
            if is_live(&identity) {
                continue;
            }
            if self.unregister_if(&identity, seq) {
                tracing::debug!(%identity, "removed session with dead connection");
                removed += 1;
            }
        }
        removed
    }

    /// Copies of every record, in no particular order.
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drops every record. Returns how many there were.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no active sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}

//! Record types stored by the session layer.
//!
//! - [`SessionRecord`] — "this identity is connected, under this label,
//!   since then"
//! - [`EvictionMark`] — "this identity was force-disconnected at this
//!   instant"

use std::time::Instant;

use sessionguard_protocol::Identity;

/// Metadata for one active session.
///
/// Created when an attempt completes admission (and refreshed when the
/// host reports the session fully established). Owned exclusively by the
/// [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Who this session belongs to.
    pub identity: Identity,

    /// The display label the client presented.
    pub label: String,

    /// When the record was written.
    pub admitted_at: Instant,

    /// Registry-wide write sequence number.
    ///
    /// Every `register` stamps a fresh value. Conditional removals compare
    /// it to decide whether the record they inspected is still the one in
    /// the map; timestamps alone can collide when two writes land on the
    /// same instant.
    pub seq: u64,
}

/// A recent eviction, as reported by
/// [`GraceWindowCache::mark`](crate::GraceWindowCache::mark).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionMark {
    pub identity: Identity,
    pub evicted_at: Instant,
}

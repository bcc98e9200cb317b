//! Session state for SessionGuard.
//!
//! This crate owns the three shared structures the admission engine works
//! against, plus the seams it needs to talk to the outside world:
//!
//! 1. **Who is connected** — [`SessionRegistry`]
//! 2. **Who was evicted recently** — [`GraceWindowCache`]
//! 3. **Who is being evicted right now** — [`EvictionGuard`]
//! 4. **The host** — the [`SessionHost`] trait (evict a holder, probe liveness)
//! 5. **Time** — the [`ClockSource`] trait
//! 6. **Tunables** — [`GuardConfig`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Admission / Cleanup (above)  ← read and mutate these structures
//!     ↕
//! Session Layer (this crate)   ← concurrent maps, one per concern
//!     ↕
//! Protocol Layer (below)       ← provides Identity
//! ```
//!
//! Every structure is an independent concurrent map (`DashMap`), so
//! unrelated identities never contend on a shared lock. Invariants that
//! span structures are kept by the order in which the admission
//! coordinator touches them, not by a lock over all three.

#![allow(async_fn_in_trait)]

mod clock;
mod config;
mod error;
mod grace;
mod guard;
mod host;
mod registry;
mod session;

pub use clock::{ClockSource, ManualClock, TokioClock};
pub use config::{DenyMessages, GuardConfig, LoggingConfig};
pub use error::HostError;
pub use grace::GraceWindowCache;
pub use guard::{EvictionGuard, GuardToken};
pub use host::SessionHost;
pub use registry::SessionRegistry;
pub use session::{EvictionMark, SessionRecord};

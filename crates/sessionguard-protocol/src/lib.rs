//! Shared vocabulary for SessionGuard.
//!
//! This crate defines the types every other layer speaks in:
//!
//! - **Identity** ([`Identity`]) — the stable key naming a logical user.
//! - **Attempts** ([`ConnectionAttempt`]) — what the host hands us when a
//!   client tries to connect.
//! - **Decisions** ([`AdmissionDecision`], [`AdmitPath`], [`DenyReason`]) —
//!   what we hand back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong parsing identities.
//!
//! # Architecture
//!
//! ```text
//! Host (connections) → Protocol (attempt / decision) → Admission → Session stores
//! ```
//!
//! Nothing here knows about maps, clocks, or tasks. It only describes the
//! data that crosses the boundary between the host and the engine.

mod error;
mod types;

pub use error::ProtocolError;
pub use types::{
    AdmissionDecision, AdmitPath, ConnectionAttempt, DenyReason, Identity,
};

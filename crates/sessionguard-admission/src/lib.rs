//! Admission decisions for SessionGuard.
//!
//! Every connection attempt the host reports goes through the
//! [`AdmissionCoordinator`], which decides within a bounded deadline
//! whether the attempt may proceed:
//!
//! ```text
//! Start → CheckDuplicate ─┬─ no duplicate ──────────────────────────→ Admit (Fresh)
//!                         └─ CheckGrace ─┬─ evicted recently ────────→ Admit (GraceReconnect)
//!                                        └─ AcquireGuard ─┬─ busy ───→ Deny (AlreadyInProgress)
//!                                                         └─ Evicting ─┬─ ok ────→ Admit (AfterEviction)
//!                                                                      ├─ failed → Deny (EvictionFailed)
//!                                                                      └─ late ──→ Deny (Timeout)
//! ```
//!
//! Failures never escape as errors: an attempt always ends in an
//! [`AdmissionDecision`](sessionguard_protocol::AdmissionDecision).

mod coordinator;
mod metrics;

pub use coordinator::AdmissionCoordinator;
pub use metrics::AdmissionMetrics;

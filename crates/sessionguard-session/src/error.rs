//! Error types for the session layer.

use sessionguard_protocol::Identity;

/// Errors a [`SessionHost`](crate::SessionHost) reports back to the engine.
///
/// The engine never lets these escape an admission attempt: every variant
/// turns into a denial (for evictions) or a skipped entry (for liveness
/// probes).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// There is no connection for this identity any more.
    /// Evicting a holder that already left is a failure, not a panic.
    #[error("no live connection for {0}")]
    NotConnected(Identity),

    /// The host refused to run the eviction (for example the owning
    /// execution context would not schedule it).
    #[error("host rejected eviction of {identity}: {reason}")]
    Rejected { identity: Identity, reason: String },

    /// Anything else that went wrong inside the host.
    #[error("host failure: {0}")]
    Failed(String),
}

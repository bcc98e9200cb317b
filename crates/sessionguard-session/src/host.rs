//! The capabilities SessionGuard needs from the server hosting it.
//!
//! SessionGuard doesn't own any connections. The host (a game server, a
//! proxy, anything with logged-in clients) does. The engine only needs two
//! things from it, expressed by the [`SessionHost`] trait:
//!
//! - **evict** — disconnect whoever currently holds an identity, telling
//!   them why
//! - **is_live** — tell whether an identity still has a live connection
//!
//! Implement this trait once for your server; use a fake in tests.

use std::future::Future;

use sessionguard_protocol::Identity;

use crate::HostError;

/// The host-side capabilities the admission engine and cleanup sweep call.
///
/// # Trait bounds
///
/// - `Send + Sync` → the host is shared across every admission task.
/// - `'static` → evictions are spawned as their own tasks and may outlive
///   the attempt that started them.
///
/// # Example
///
/// ```rust
/// use sessionguard_protocol::Identity;
/// use sessionguard_session::{HostError, SessionHost};
///
/// /// A host with nobody connected. Every eviction fails.
/// struct EmptyHost;
///
/// impl SessionHost for EmptyHost {
///     async fn evict(&self, identity: Identity, _message: &str) -> Result<(), HostError> {
///         Err(HostError::NotConnected(identity))
///     }
///
///     fn is_live(&self, _identity: &Identity) -> Result<bool, HostError> {
///         Ok(false)
///     }
/// }
/// ```
pub trait SessionHost: Send + Sync + 'static {
    /// Disconnects the current holder of `identity`, showing it `message`.
    ///
    /// `message` is the `eviction_message` of the configuration in effect
    /// when the eviction started, so a reload reaches the next kick.
    ///
    /// Must run the disconnect on whatever execution context owns that
    /// connection, and must report `Err` (not panic) when there is nothing
    /// to disconnect. Resolves once the holder is gone or the attempt
    /// failed; the engine bounds how long it waits.
    fn evict(
        &self,
        identity: Identity,
        message: &str,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Returns whether `identity` still has a live connection.
    ///
    /// Used by the cleanup sweep to heal registry entries whose
    /// termination notification was missed. An `Err` keeps the entry.
    fn is_live(&self, identity: &Identity) -> Result<bool, HostError>;
}

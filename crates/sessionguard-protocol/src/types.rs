//! Core types that cross the host ↔ engine boundary.
//!
//! The host (the server that owns the sockets) describes a connection
//! attempt with a [`ConnectionAttempt`]; the engine answers with an
//! [`AdmissionDecision`]. Everything in this module is plain data: cheap
//! to clone, serializable, and free of any locking or timing concerns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A stable, unique key naming a logical user.
///
/// This is a newtype over a 128-bit [`Uuid`]. Wrapping it means an
/// `Identity` can't be confused with any other UUID floating around the
/// host (connection ids, world ids, ...), and signatures like
/// `fn evict(identity: Identity)` say what they mean.
///
/// The identity is assumed to be verified already: the engine never
/// authenticates it, it only uses it as a map key.
///
/// `#[serde(transparent)]` serializes it as the bare hyphenated string,
/// so an identity looks like `"6f1c0f7e-..."` in JSON rather than
/// `{ "0": "6f1c0f7e-..." }`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(pub Uuid);

impl Identity {
    /// Wraps an existing UUID.
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Builds an identity from a raw 128-bit value.
    ///
    /// Handy in tests, where `Identity::from_u128(1)` reads better than a
    /// full UUID literal.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Generates a fresh random (v4) identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identity {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self).map_err(|source| {
            ProtocolError::InvalidIdentity {
                input: s.to_string(),
                source,
            }
        })
    }
}

impl From<Uuid> for Identity {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ---------------------------------------------------------------------------
// ConnectionAttempt
// ---------------------------------------------------------------------------

/// A new connection attempt as reported by the host.
///
/// The label is the human-readable name the client presented (a player
/// name, a device name). It is informational unless the label-matching
/// policy is turned on, in which case two different identities sharing a
/// label are also treated as duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttempt {
    pub identity: Identity,
    pub label: String,
}

impl ConnectionAttempt {
    /// Creates an attempt from already-typed parts.
    pub fn new(identity: Identity, label: impl Into<String>) -> Self {
        Self {
            identity,
            label: label.into(),
        }
    }

    /// Parses an attempt from the raw strings a host typically has on hand.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidIdentity`] if `identity` is not a UUID
    /// - [`ProtocolError::EmptyLabel`] if `label` is blank
    pub fn parse(identity: &str, label: &str) -> Result<Self, ProtocolError> {
        let identity = identity.parse()?;
        let label = label.trim();
        if label.is_empty() {
            return Err(ProtocolError::EmptyLabel);
        }
        Ok(Self::new(identity, label))
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Which branch of the admission state machine admitted an attempt.
///
/// Hosts normally don't care (an admit is an admit), but logs, metrics and
/// tests do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitPath {
    /// No active session existed for the identity.
    Fresh,
    /// A session existed, but the identity was evicted recently enough that
    /// this is treated as a legitimate reconnection.
    GraceReconnect,
    /// The previous holder was evicted to make room for this attempt.
    AfterEviction,
}

/// Why an attempt was denied.
///
/// Each reason maps to its own configurable message so operators can tell
/// an eviction storm apart from a genuinely stuck holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The eviction could not be awaited before the admission deadline.
    Timeout,
    /// The host reported that the previous holder could not be evicted.
    EvictionFailed,
    /// Another attempt for the same identity is already evicting.
    AlreadyInProgress,
    /// The eviction workflow itself broke (for example the eviction task
    /// panicked).
    Internal,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::EvictionFailed => write!(f, "conflict unresolved"),
            Self::AlreadyInProgress => write!(f, "eviction already in progress"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// The final answer for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionDecision {
    /// Let the connection proceed.
    Admit { path: AdmitPath },
    /// Refuse the connection, showing `message` to the client.
    Deny { reason: DenyReason, message: String },
}

impl AdmissionDecision {
    /// Shorthand for an admit decision.
    pub fn admit(path: AdmitPath) -> Self {
        Self::Admit { path }
    }

    /// Shorthand for a deny decision.
    pub fn deny(reason: DenyReason, message: impl Into<String>) -> Self {
        Self::Deny {
            reason,
            message: message.into(),
        }
    }

    /// Returns `true` if the attempt may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }

    /// The admit path, or `None` for a denial.
    pub fn admit_path(&self) -> Option<AdmitPath> {
        match self {
            Self::Admit { path } => Some(*path),
            Self::Deny { .. } => None,
        }
    }

    /// The deny reason, or `None` for an admit.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Admit { .. } => None,
            Self::Deny { reason, .. } => Some(*reason),
        }
    }

    /// The client-facing denial message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Admit { .. } => None,
            Self::Deny { message, .. } => Some(message),
        }
    }
}

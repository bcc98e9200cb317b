//! Unified error type for SessionGuard.

use sessionguard_protocol::ProtocolError;

use crate::admin::AdminError;
use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Admission itself never fails with an error (every attempt ends in a
/// decision); these are the failures of the surfaces around it: loading
/// configuration, parsing host-provided identities, administration, and
/// starting the background sweep.
#[derive(Debug, thiserror::Error)]
pub enum SessionGuardError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Host-provided data didn't parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An administration command couldn't be carried out.
    #[error(transparent)]
    Admin(#[from] AdminError),

    /// [`SessionGuard::start`](crate::SessionGuard::start) was called while
    /// the cleanup task is already running.
    #[error("cleanup task is already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::NoSource;
        let guard_err: SessionGuardError = err.into();
        assert!(matches!(guard_err, SessionGuardError::Config(_)));
        assert!(guard_err.to_string().contains("no configuration source"));
    }

    #[test]
    fn test_from_protocol_error() {
        let guard_err: SessionGuardError = ProtocolError::EmptyLabel.into();
        assert!(matches!(guard_err, SessionGuardError::Protocol(_)));
    }

    #[test]
    fn test_from_admin_error() {
        let err = AdminError::UnknownCommand("kick".into());
        let guard_err: SessionGuardError = err.into();
        assert!(matches!(guard_err, SessionGuardError::Admin(_)));
        assert!(guard_err.to_string().contains("kick"));
    }
}

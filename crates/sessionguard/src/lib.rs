//! # SessionGuard
//!
//! Duplicate-session admission control for connection-oriented servers.
//!
//! When a client connects under an identity that already has a live session,
//! SessionGuard evicts the old session and admits the new one, or denies the
//! new one with a reason, always within a bounded deadline. A short grace
//! window lets a client reconnect right after its own eviction without being
//! kicked again, and a periodic sweep heals state the host never reported.
//!
//! The host implements [`SessionHost`](prelude::SessionHost) (evict a
//! holder, probe liveness) and forwards its lifecycle events to a
//! [`SessionGuard`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sessionguard::prelude::*;
//!
//! // Implement SessionHost for your server, then:
//! // let guard = SessionGuard::builder(my_host)
//! //     .source(JsonFileSource::new("sessionguard.json"))
//! //     .build()?;
//! // guard.start()?;
//! // let decision = guard.on_connection_attempt(&attempt).await;
//! ```

mod admin;
mod config;
mod error;
pub mod logging;
mod service;

pub use admin::{complete, AdminCommand, AdminError, AdminResponse, StatusReport, SUBCOMMANDS};
pub use config::{ConfigError, ConfigSource, JsonFileSource, StaticSource};
pub use error::SessionGuardError;
pub use service::{SessionGuard, SessionGuardBuilder};

pub mod prelude {
    pub use crate::{
        AdminCommand, AdminResponse, ConfigSource, JsonFileSource, SessionGuard,
        SessionGuardBuilder, SessionGuardError, StaticSource, StatusReport,
    };
    pub use sessionguard_admission::AdmissionMetrics;
    pub use sessionguard_cleanup::{SweepMetrics, SweepReport};
    pub use sessionguard_protocol::{
        AdmissionDecision, AdmitPath, ConnectionAttempt, DenyReason, Identity,
    };
    pub use sessionguard_session::{
        ClockSource, GuardConfig, HostError, LoggingConfig, ManualClock, SessionHost, TokioClock,
    };
}

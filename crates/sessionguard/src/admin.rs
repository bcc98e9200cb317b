//! Operator commands: `reload`, `status`, `clearcache`.
//!
//! Commands arrive as text from whatever console the host exposes. Parse
//! them with [`AdminCommand::from_str`](std::str::FromStr) (strict) or hand
//! the raw line to [`SessionGuard::execute_line`], which shows the help for
//! anything it doesn't recognize.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sessionguard_session::SessionHost;

use crate::SessionGuard;

/// Subcommands offered for tab completion, in display order.
pub const SUBCOMMANDS: [&str; 3] = ["reload", "status", "clearcache"];

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
}

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Reload configuration from the service's source.
    Reload,
    /// Show counts and settings.
    Status,
    /// Forget every recorded eviction.
    ClearCache,
    /// List the commands.
    Help,
}

impl FromStr for AdminCommand {
    type Err = AdminError;

    /// Parses the first word, case-insensitively. An empty line is `Help`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(word) = s.split_whitespace().next() else {
            return Ok(Self::Help);
        };
        match word.to_ascii_lowercase().as_str() {
            "reload" => Ok(Self::Reload),
            "status" => Ok(Self::Status),
            "clearcache" => Ok(Self::ClearCache),
            "help" => Ok(Self::Help),
            _ => Err(AdminError::UnknownCommand(word.to_string())),
        }
    }
}

/// Subcommands starting with `prefix` (case-insensitive).
pub fn complete(prefix: &str) -> Vec<&'static str> {
    let prefix = prefix.to_ascii_lowercase();
    SUBCOMMANDS
        .into_iter()
        .filter(|cmd| cmd.starts_with(&prefix))
        .collect()
}

/// The lines an operator sees after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResponse {
    pub success: bool,
    pub lines: Vec<String>,
}

impl AdminResponse {
    fn ok(lines: Vec<String>) -> Self {
        Self {
            success: true,
            lines,
        }
    }

    fn failed(line: String) -> Self {
        Self {
            success: false,
            lines: vec![line],
        }
    }
}

impl fmt::Display for AdminResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// Counts and settings reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub active_sessions: usize,
    pub grace_entries: usize,
    pub evictions_in_progress: usize,
    pub grace_window_secs: u64,
    pub check_label: bool,
    pub logging_enabled: bool,
    pub cleanup_running: bool,
    pub admitted: u64,
    pub denied: u64,
}

impl StatusReport {
    /// Renders the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn lines(&self) -> Vec<String> {
        let on_off = |b: bool| if b { "on" } else { "off" };
        vec![
            "=== SessionGuard Status ===".to_string(),
            format!("Grace window: {} seconds", self.grace_window_secs),
            format!("Active sessions: {}", self.active_sessions),
            format!("Recent evictions cached: {}", self.grace_entries),
            format!("Evictions in progress: {}", self.evictions_in_progress),
            format!("Label matching: {}", on_off(self.check_label)),
            format!("Logging enabled: {}", self.logging_enabled),
            format!("Cleanup task: {}", if self.cleanup_running { "running" } else { "stopped" }),
            format!("Decisions: {} admitted, {} denied", self.admitted, self.denied),
        ]
    }
}

fn help_lines() -> Vec<String> {
    vec![
        format!("=== SessionGuard v{} ===", env!("CARGO_PKG_VERSION")),
        "reload     - Reload configuration".to_string(),
        "status     - Show engine status".to_string(),
        "clearcache - Clear the recent evictions cache".to_string(),
    ]
}

impl<H: SessionHost> SessionGuard<H> {
    /// Runs an operator command.
    pub fn execute(&self, command: AdminCommand) -> AdminResponse {
        match command {
            AdminCommand::Reload => match self.reload_config() {
                Ok(_) => AdminResponse::ok(vec!["SessionGuard configuration reloaded!".to_string()]),
                Err(error) => AdminResponse::failed(format!("Reload failed: {error}")),
            },
            AdminCommand::Status => AdminResponse::ok(self.status().lines()),
            AdminCommand::ClearCache => {
                let cleared = self.clear_grace_cache();
                AdminResponse::ok(vec![format!(
                    "Recent evictions cache cleared ({cleared} entries)."
                )])
            }
            AdminCommand::Help => AdminResponse::ok(help_lines()),
        }
    }

    /// Parses and runs a raw command line. Unknown commands show the help.
    pub fn execute_line(&self, line: &str) -> AdminResponse {
        let command = line.parse().unwrap_or(AdminCommand::Help);
        self.execute(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands_case_insensitive() {
        assert_eq!("reload".parse::<AdminCommand>().unwrap(), AdminCommand::Reload);
        assert_eq!("STATUS".parse::<AdminCommand>().unwrap(), AdminCommand::Status);
        assert_eq!(
            "  ClearCache extra ".parse::<AdminCommand>().unwrap(),
            AdminCommand::ClearCache
        );
    }

    #[test]
    fn test_parse_empty_is_help() {
        assert_eq!("".parse::<AdminCommand>().unwrap(), AdminCommand::Help);
        assert_eq!("   ".parse::<AdminCommand>().unwrap(), AdminCommand::Help);
    }

    #[test]
    fn test_parse_unknown_returns_error() {
        let err = "kick".parse::<AdminCommand>().unwrap_err();
        assert!(matches!(err, AdminError::UnknownCommand(ref w) if w == "kick"));
    }

    #[test]
    fn test_complete_filters_by_prefix() {
        assert_eq!(complete(""), vec!["reload", "status", "clearcache"]);
        assert_eq!(complete("re"), vec!["reload"]);
        assert_eq!(complete("C"), vec!["clearcache"]);
        assert!(complete("x").is_empty());
    }

    #[test]
    fn test_status_report_to_json_has_counts() {
        let report = StatusReport {
            version: "0.1.0",
            active_sessions: 3,
            grace_entries: 1,
            evictions_in_progress: 0,
            grace_window_secs: 2,
            check_label: false,
            logging_enabled: true,
            cleanup_running: true,
            admitted: 10,
            denied: 2,
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["active_sessions"], 3);
        assert_eq!(json["grace_window_secs"], 2);
        assert_eq!(json["denied"], 2);
    }
}

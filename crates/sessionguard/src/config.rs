//! Where configuration comes from.
//!
//! A [`ConfigSource`] produces a fresh [`GuardConfig`] each time it is
//! asked. The service loads from it once when built and again on every
//! reload, then publishes the result to the running components.

use std::fs;
use std::path::{Path, PathBuf};

use sessionguard_session::GuardConfig;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file couldn't be read.
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file isn't valid JSON for a [`GuardConfig`].
    #[error("failed to parse config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value parsed but can't be used.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A reload was requested but the service was built without a source.
    #[error("no configuration source to reload from")]
    NoSource,
}

/// Produces configuration on demand.
///
/// Implementations should return a complete config; numeric ranges are
/// clamped afterwards with [`GuardConfig::validated`], so only values that
/// can't be repaired need to be rejected here.
pub trait ConfigSource: Send + Sync + 'static {
    fn load(&self) -> Result<GuardConfig, ConfigError>;

    /// Human-readable origin, used in log lines.
    fn describe(&self) -> String;
}

/// Reads a JSON file on every load.
///
/// Missing fields take their defaults, so the file may be as small as `{}`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonFileSource {
    fn load(&self) -> Result<GuardConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config: GuardConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: self.path.clone(),
                source,
            })?;
        check(&config)?;
        Ok(config)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A fixed value. Useful for tests and for hosts that build their config
/// in code.
#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub GuardConfig);

impl ConfigSource for StaticSource {
    fn load(&self) -> Result<GuardConfig, ConfigError> {
        check(&self.0)?;
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Rejects values `validated()` can't sensibly repair.
///
/// Denied clients are shown these messages verbatim; an empty one would
/// disconnect them with no explanation.
pub(crate) fn check(config: &GuardConfig) -> Result<(), ConfigError> {
    let messages = [
        ("messages.timeout", &config.messages.timeout),
        ("messages.conflict", &config.messages.conflict),
        ("messages.in_progress", &config.messages.in_progress),
        ("messages.error", &config.messages.error),
    ];
    for (field, message) in messages {
        if message.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field,
                reason: "message must not be empty".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sessionguard-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_json_file_source_partial_file_fills_defaults() {
        let path = temp_path("partial.json");
        fs::write(&path, r#"{ "grace_window_secs": 5, "check_label": true }"#).unwrap();

        let config = JsonFileSource::new(&path).load().unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.grace_window_secs, 5);
        assert!(config.check_label);
        assert_eq!(config.admission_deadline_ms, 3_000);
    }

    #[test]
    fn test_json_file_source_missing_file_returns_io_error() {
        let err = JsonFileSource::new(temp_path("does-not-exist.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_json_file_source_bad_json_returns_json_error() {
        let path = temp_path("bad.json");
        fs::write(&path, "{ grace_window_secs: ").unwrap();

        let err = JsonFileSource::new(&path).load().unwrap_err();
        fs::remove_file(&path).unwrap();

        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_static_source_empty_message_is_invalid() {
        let mut config = GuardConfig::default();
        config.messages.timeout = "   ".into();

        let err = StaticSource(config).load().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "messages.timeout", .. }
        ));
    }

    #[test]
    fn test_static_source_returns_its_value() {
        let config = GuardConfig {
            remove_on_quit: true,
            ..GuardConfig::default()
        };
        assert_eq!(StaticSource(config.clone()).load().unwrap(), config);
    }
}

//! Provider-level wait settings
//!
//! Settings are read from a JSON file and override the timings of every
//! phase profile:
//!
//! ```json
//! {"delay_seconds": 10, "min_timeout_seconds": 10, "poll_interval_seconds": 30, "wait_time_minutes": 60}
//! ```
//!
//! All fields are optional. A resource's own `wait_time_minutes` attribute
//! wins over the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use converge_core::poll::PollSpec;
use converge_core::resource::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource attribute overriding the wait timeout, in minutes
pub const WAIT_TIME_ATTRIBUTE: &str = "wait_time_minutes";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid wait settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },
}

impl ConfigError {
    pub fn invalid_attribute(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitSettings {
    /// Wait before the first status check
    pub delay_seconds: Option<u64>,
    /// Minimum time between status checks
    pub min_timeout_seconds: Option<u64>,
    /// Fixed time between status checks
    pub poll_interval_seconds: Option<u64>,
    /// Total time to wait for a phase
    pub wait_time_minutes: Option<u64>,
}

impl WaitSettings {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Apply these settings on top of a spec built from a profile
    pub fn apply(&self, mut spec: PollSpec) -> PollSpec {
        if let Some(secs) = self.delay_seconds {
            spec = spec.with_delay(Duration::from_secs(secs));
        }
        if let Some(secs) = self.min_timeout_seconds {
            spec = spec.with_min_poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.poll_interval_seconds {
            spec = spec.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(minutes) = self.wait_time_minutes {
            spec = spec.with_timeout(Duration::from_secs(minutes.saturating_mul(60)));
        }
        spec
    }
}

/// Read the `wait_time_minutes` attribute of a resource, if set
pub fn wait_time_from_attributes(
    attributes: &HashMap<String, Value>,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = attributes.get(WAIT_TIME_ATTRIBUTE) else {
        return Ok(None);
    };
    match value.as_int() {
        Some(minutes) if minutes > 0 => (minutes as u64)
            .checked_mul(60)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| {
                ConfigError::invalid_attribute(
                    WAIT_TIME_ATTRIBUTE,
                    format!("{} minutes is too long", minutes),
                )
            }),
        Some(minutes) => Err(ConfigError::invalid_attribute(
            WAIT_TIME_ATTRIBUTE,
            format!("must be positive, got {}", minutes),
        )),
        None => Err(ConfigError::invalid_attribute(
            WAIT_TIME_ATTRIBUTE,
            "must be an integer number of minutes",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spec() -> PollSpec {
        PollSpec::new(["pending"], ["available"], Duration::from_secs(600))
    }

    #[test]
    fn empty_settings_change_nothing() {
        let settings = WaitSettings::from_json("{}").unwrap();
        assert_eq!(settings, WaitSettings::default());
        assert_eq!(settings.apply(spec()), spec());
    }

    #[test]
    fn settings_override_timings() {
        let settings = WaitSettings::from_json(
            r#"{"delay_seconds": 5, "min_timeout_seconds": 2, "poll_interval_seconds": 30, "wait_time_minutes": 60}"#,
        )
        .unwrap();

        let spec = settings.apply(spec());
        assert_eq!(spec.delay, Duration::from_secs(5));
        assert_eq!(spec.min_poll_interval, Duration::from_secs(2));
        assert_eq!(
            spec.interval,
            converge_core::poll::PollInterval::Fixed(Duration::from_secs(30))
        );
        assert_eq!(spec.timeout, Duration::from_secs(3600));
    }

    #[test]
    fn huge_wait_time_saturates() {
        let settings = WaitSettings {
            wait_time_minutes: Some(u64::MAX),
            ..WaitSettings::default()
        };
        assert_eq!(settings.apply(spec()).timeout, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn huge_wait_time_attribute_is_rejected() {
        let mut attributes = HashMap::new();
        attributes.insert(WAIT_TIME_ATTRIBUTE.to_string(), Value::Int(i64::MAX));

        let err = wait_time_from_attributes(&attributes).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAttribute { .. }));
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = WaitSettings::from_json(r#"{"delay": 5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"wait_time_minutes": 90}}"#).unwrap();

        let settings = WaitSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.wait_time_minutes, Some(90));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WaitSettings::from_file(&dir.path().join("wait.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("wait.json"));
    }

    #[test]
    fn wait_time_attribute() {
        let mut attributes = HashMap::new();
        assert_eq!(wait_time_from_attributes(&attributes).unwrap(), None);

        attributes.insert(WAIT_TIME_ATTRIBUTE.to_string(), Value::Int(90));
        assert_eq!(
            wait_time_from_attributes(&attributes).unwrap(),
            Some(Duration::from_secs(90 * 60))
        );

        attributes.insert(WAIT_TIME_ATTRIBUTE.to_string(), Value::Int(0));
        assert!(wait_time_from_attributes(&attributes).is_err());

        attributes.insert(
            WAIT_TIME_ATTRIBUTE.to_string(),
            Value::String("90".to_string()),
        );
        let err = wait_time_from_attributes(&attributes).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid attribute 'wait_time_minutes': must be an integer number of minutes"
        );
    }
}

use crate::error::{RelayError, Result};
use crate::logs::{FileSinkFactory, Rotation, DEFAULT_CAPACITY, DEFAULT_TAIL_QUEUE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Relay configuration: history size, sink destination and rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Number of recent lines kept for replay
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Path of the durable log file (empty disables the sink)
    #[serde(default)]
    pub destination: String,

    /// Rotation policy for the log file
    #[serde(default)]
    pub rotation: Rotation,

    /// Prefix each persisted record with a timestamp
    #[serde(default)]
    pub timestamps: bool,

    /// Queue depth for channel-backed tail subscribers
    #[serde(default = "default_tail_queue")]
    pub tail_queue: usize,
}

// Default value functions for serde
fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_tail_queue() -> usize {
    DEFAULT_TAIL_QUEUE
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            destination: String::new(),
            rotation: Rotation::default(),
            timestamps: false,
            tail_queue: default_tail_queue(),
        }
    }
}

impl RelayConfig {
    /// Load a relay configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::ConfigError(format!("Failed to read config file: {}", e)))?;

        // Determine format based on file extension
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(RelayError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML configuration
    pub fn parse_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| RelayError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    /// Parse JSON configuration
    pub fn parse_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| RelayError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(RelayError::ConfigValidationError(
                "capacity must be at least 1".to_string(),
            ));
        }

        if self.tail_queue == 0 {
            return Err(RelayError::ConfigValidationError(
                "tail_queue must be at least 1".to_string(),
            ));
        }

        if let Rotation::Size { max_bytes: 0 } = self.rotation {
            return Err(RelayError::ConfigValidationError(
                "rotation max_bytes must be at least 1".to_string(),
            ));
        }

        if self.rotation != Rotation::Never && self.destination.is_empty() {
            return Err(RelayError::MissingConfigField("destination".to_string()));
        }

        Ok(())
    }

    /// Sink factory matching the rotation and timestamp settings
    pub fn sink_factory(&self) -> FileSinkFactory {
        FileSinkFactory {
            rotation: self.rotation,
            timestamps: self.timestamps,
        }
    }

    /// Expand `$VAR` and `${VAR}` in the destination path
    fn expand_env_vars(&mut self) {
        self.destination = expand_env_in_string(&self.destination);
    }
}

/// Expand environment variables in a string; unknown variables are left as written
fn expand_env_in_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => result.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();

        assert_eq!(config.capacity, 100);
        assert_eq!(config.destination, "");
        assert_eq!(config.rotation, Rotation::Never);
        assert!(!config.timestamps);
        assert_eq!(config.tail_queue, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = RelayConfig {
            capacity: 0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(RelayError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_rotation_size() {
        let config = RelayConfig {
            destination: "/tmp/app.log".to_string(),
            rotation: Rotation::Size { max_bytes: 0 },
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(RelayError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rotation_without_destination() {
        let config = RelayConfig {
            rotation: Rotation::Daily,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(RelayError::MissingConfigField(_))
        ));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("LOGRELAY_TEST_DIR", "/var/log");
        std::env::set_var("LOGRELAY_TEST_NAME", "web");

        assert_eq!(
            expand_env_in_string("$LOGRELAY_TEST_DIR/${LOGRELAY_TEST_NAME}.log"),
            "/var/log/web.log"
        );
        assert_eq!(
            expand_env_in_string("$LOGRELAY_TEST_MISSING/app.log"),
            "$LOGRELAY_TEST_MISSING/app.log"
        );
        assert_eq!(expand_env_in_string("cost: $5 ${"), "cost: $5 ${");
    }

    #[test]
    fn test_parse_toml() {
        let toml_content = r#"
            capacity = 50
            destination = "/tmp/app.log"
            timestamps = true

            [rotation]
            kind = "size"
            max_bytes = 1048576
        "#;

        let config = RelayConfig::parse_toml(toml_content).unwrap();
        assert_eq!(config.capacity, 50);
        assert_eq!(config.destination, "/tmp/app.log");
        assert!(config.timestamps);
        assert_eq!(config.rotation, Rotation::Size { max_bytes: 1048576 });
        assert_eq!(config.tail_queue, 1024);
    }

    #[test]
    fn test_parse_json() {
        let json_content = r#"{
            "destination": "/tmp/app.log",
            "rotation": { "kind": "daily" }
        }"#;

        let config = RelayConfig::parse_json(json_content).unwrap();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.rotation, Rotation::Daily);
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relay.yaml");
        fs::write(&path, "capacity: 10").unwrap();

        assert!(matches!(
            RelayConfig::from_file(&path),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relay.toml");
        fs::write(&path, "capacity = \"lots\"").unwrap();

        assert!(matches!(
            RelayConfig::from_file(&path),
            Err(RelayError::InvalidConfig(_))
        ));
    }
}

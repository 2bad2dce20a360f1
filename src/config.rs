//! Property run configuration
//!
//! [`PropertyConfig`] is the configuration surface accepted from a CLI or a
//! config file. Every field is optional when deserializing and falls back to
//! its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_NUM_TESTS: u32 = 100;
pub const DEFAULT_MAX_SIZE: u32 = 100;
pub const DEFAULT_MAX_SHRINK_ATTEMPTS: u32 = 1000;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_tests must be greater than zero")]
    ZeroTests,

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not read configuration: {0}")]
    Io(#[from] io::Error),
}

/// Configuration for one property run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConfig {
    /// Number of generated cases to run before declaring a pass
    pub num_tests: u32,

    /// Bound on numeric magnitude and collection length
    pub max_size: u32,

    /// Seed for the random source; derived at run start when absent
    pub seed: Option<u64>,

    /// Whether to search for a smaller counterexample after a failure
    pub shrink_enabled: bool,

    /// Total candidate evaluations allowed across one shrink session
    #[serde(alias = "max_shrinking_attempts")]
    pub max_shrink_attempts: u32,

    /// Derive the seed from the run label instead of the clock when no seed is given
    pub derandomize: bool,
}

impl Default for PropertyConfig {
    fn default() -> Self {
        Self {
            num_tests: DEFAULT_NUM_TESTS,
            max_size: DEFAULT_MAX_SIZE,
            seed: None,
            shrink_enabled: true,
            max_shrink_attempts: DEFAULT_MAX_SHRINK_ATTEMPTS,
            derandomize: false,
        }
    }
}

impl PropertyConfig {
    pub fn with_num_tests(mut self, num_tests: u32) -> Self {
        self.num_tests = num_tests;
        self
    }

    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_shrinking(mut self, enabled: bool) -> Self {
        self.shrink_enabled = enabled;
        self
    }

    pub fn with_max_shrink_attempts(mut self, attempts: u32) -> Self {
        self.max_shrink_attempts = attempts;
        self
    }

    pub fn with_derandomize(mut self, derandomize: bool) -> Self {
        self.derandomize = derandomize;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_tests == 0 {
            return Err(ConfigError::ZeroTests);
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PropertyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PropertyConfig::default();
        assert_eq!(config.num_tests, 100);
        assert_eq!(config.max_size, 100);
        assert_eq!(config.seed, None);
        assert!(config.shrink_enabled);
        assert_eq!(config.max_shrink_attempts, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PropertyConfig::from_json_str(r#"{"num_tests": 20, "seed": 42}"#).unwrap();
        assert_eq!(config.num_tests, 20);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_shrinking_attempts_alias() {
        let config = PropertyConfig::from_json_str(r#"{"max_shrinking_attempts": 7}"#).unwrap();
        assert_eq!(config.max_shrink_attempts, 7);
    }

    #[test]
    fn test_zero_tests_rejected() {
        let err = PropertyConfig::from_json_str(r#"{"num_tests": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTests));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = PropertyConfig::from_json_str("{num_tests: }").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_size": 5, "shrink_enabled": false}}"#).unwrap();
        let config = PropertyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_size, 5);
        assert!(!config.shrink_enabled);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PropertyConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

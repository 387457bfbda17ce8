use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TEMPLATE_FOLDER_KEY: &str = "TEMPLATE_FOLDER";
pub const RESULT_FOLDER_KEY: &str = "RESULT_FOLDER";
pub const BUCKET_KEY: &str = "BUCKET";
pub const WRITE_POLICY_KEY: &str = "WRITE_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{key} has unsupported value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// What to do when the target path is already occupied.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    #[default]
    Overwrite,
    FailIfExists,
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "fail-if-exists" | "fail_if_exists" => Ok(Self::FailIfExists),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub template_folder: String,
    pub result_folder: String,
    pub bucket: String,
    pub write_policy: WritePolicy,
}

impl Configuration {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. Blank values are
    /// treated as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let template_folder =
            read(TEMPLATE_FOLDER_KEY).ok_or(ConfigError::Missing(TEMPLATE_FOLDER_KEY))?;
        let bucket = read(BUCKET_KEY).ok_or(ConfigError::Missing(BUCKET_KEY))?;
        let result_folder = read(RESULT_FOLDER_KEY).unwrap_or_else(|| template_folder.clone());
        let write_policy = match read(WRITE_POLICY_KEY) {
            Some(value) => value.parse().map_err(|value| ConfigError::Invalid {
                key: WRITE_POLICY_KEY,
                value,
            })?,
            None => WritePolicy::default(),
        };

        Ok(Self {
            template_folder,
            result_folder,
            bucket,
            write_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn result_folder_defaults_to_template_folder() {
        let config = Configuration::from_lookup(lookup_from(&[
            ("TEMPLATE_FOLDER", "templates/"),
            ("BUCKET", "docs"),
        ]))
        .expect("config should load");

        assert_eq!(config.result_folder, "templates/");
        assert_eq!(config.write_policy, WritePolicy::Overwrite);
    }

    #[test]
    fn missing_template_folder_is_reported_first() {
        let error = Configuration::from_lookup(lookup_from(&[])).expect_err("should fail");
        assert_eq!(error, ConfigError::Missing(TEMPLATE_FOLDER_KEY));
    }

    #[test]
    fn blank_bucket_counts_as_missing() {
        let error = Configuration::from_lookup(lookup_from(&[
            ("TEMPLATE_FOLDER", "templates/"),
            ("BUCKET", "  "),
        ]))
        .expect_err("should fail");
        assert_eq!(error, ConfigError::Missing(BUCKET_KEY));
    }

    #[test]
    fn parses_write_policy_and_rejects_unknown_values() {
        let config = Configuration::from_lookup(lookup_from(&[
            ("TEMPLATE_FOLDER", "templates/"),
            ("RESULT_FOLDER", "out/"),
            ("BUCKET", "docs"),
            ("WRITE_POLICY", "fail-if-exists"),
        ]))
        .expect("config should load");
        assert_eq!(config.result_folder, "out/");
        assert_eq!(config.write_policy, WritePolicy::FailIfExists);

        let error = Configuration::from_lookup(lookup_from(&[
            ("TEMPLATE_FOLDER", "templates/"),
            ("BUCKET", "docs"),
            ("WRITE_POLICY", "version"),
        ]))
        .expect_err("unknown policy should fail");
        assert!(matches!(error, ConfigError::Invalid { key: WRITE_POLICY_KEY, .. }));
    }
}

//! Application configuration and deploy-time context.
//!
//! The configuration file mirrors the shape of the struct; every field is
//! optional. Context values passed on the command line override the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ASSET_DIR, DEFAULT_OUTPUT_DIR, ENV_CONTEXT_KEY, PRODUCTION_ENV,
};
use crate::error::{Result, StackError};
use crate::types::Environment;

/// Root configuration for a synthesis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deploy-time context key-value pairs (e.g. `env = prod`).
    pub context: BTreeMap<String, String>,
    /// Directory the cloud assembly is written to.
    pub output_dir: PathBuf,
    /// Directory holding the container image build instructions.
    pub asset_dir: PathBuf,
    /// Target account and region, if pinned.
    pub environment: Environment,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            context: BTreeMap::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            environment: Environment::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file.
    ///
    /// A missing file is not an error and yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| StackError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            context_keys = config.context.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Sets (or overrides) a context value.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.context.insert(key.into(), value.into());
        self
    }

    /// Looks up a context value.
    #[must_use]
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// True iff the `env` context value is exactly `prod`.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.context(ENV_CONTEXT_KEY) == Some(PRODUCTION_ENV)
    }
}

/// Parses a `key=value` context argument.
///
/// Only the first `=` separates key from value, so values may contain `=`.
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is empty.
pub fn parse_context_pair(input: &str) -> Result<(String, String)> {
    let (key, value) = input.split_once('=').ok_or_else(|| StackError::Config {
        message: format!("context must be key=value, got \"{input}\""),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(StackError::Config {
            message: format!("context key is empty in \"{input}\""),
        });
    }
    Ok((key.to_string(), value.trim().to_string()))
}

//! Optional defaults file.
//!
//! Operators who clone functions regularly can keep their usual region,
//! profile and wait settings in a `lambda-cloner.json` file in the working
//! directory (or point `--config` at one). Command-line flags always win.
//!
//! # lambda-cloner.json Format
//!
//! ```json
//! {
//!   "region": "eu-west-1",
//!   "profile": "ops",
//!   "endpoint_url": "http://localhost:4566",
//!   "work_dir": "/var/tmp/lambda-clones",
//!   "wait_interval_secs": 5,
//!   "wait_max_attempts": 60,
//!   "copy_tags": true
//! }
//! ```
//!
//! Every field is optional.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "lambda-cloner.json";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClonerConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub wait_interval_secs: Option<u64>,
    pub wait_max_attempts: Option<u32>,
    pub copy_tags: Option<bool>,
}

impl ClonerConfig {
    /// Load `lambda-cloner.json` from the current directory.
    ///
    /// A missing file yields the empty config; a malformed one is an error.
    pub fn load_default() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if !path.exists() {
            debug!("No {} found in the current directory", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }
        Self::load_from_path(path)
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ClonerConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "region": "eu-west-1", "wait_max_attempts": 10, "copy_tags": false }}"#
        )
        .unwrap();

        let config = ClonerConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.wait_max_attempts, Some(10));
        assert_eq!(config.copy_tags, Some(false));
        assert!(config.profile.is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "regoin": "eu-west-1" }}"#).unwrap();
        assert!(ClonerConfig::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(ClonerConfig::load_from_path("/nonexistent/lambda-cloner.json").is_err());
    }
}

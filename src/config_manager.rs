//! NVR Camera Config Sync Tool
//! Config Manager module for the ONVIF server YAML document
//!
//! This module provides functionality for:
//! 1. Loading the device configuration into a generic YAML value so that
//!    unrecognized keys and nesting survive a read-modify-write cycle
//! 2. Saving the updated document atomically (write to temp, then rename)

use log::info;
use serde_yaml::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Custom error types for configuration document operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {path}")] FileNotFound {
        path: String,
    },

    #[error("Config file is not a YAML mapping: {path}")] NotAMapping {
        path: String,
    },

    #[error("Could not persist config file: {message}")] PersistFailed {
        message: String,
    },

    #[error("YAML error: {0}")] Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),
}

/// Configuration document reader/writer
///
/// The document is held as a raw `serde_yaml::Value` rather than a typed
/// struct. The ONVIF server config carries keys this tool knows nothing
/// about, and they must round-trip untouched; mappings keep insertion
/// order, so existing entries serialize back in the order they were read.
pub struct ConfigManager {
    // No specific state needed for this handler
}

impl ConfigManager {
    /// Initialize Config Manager module
    pub fn new() -> Self {
        Self {}
    }

    /// Load the configuration document from disk
    ///
    /// The root of the document must be a mapping; anything else (a bare
    /// scalar, a list, an empty file) is a fatal error since there is no
    /// sensible place to attach device entries.
    pub fn load<P: AsRef<Path>>(&self, file_path: P) -> Result<Value, ConfigError> {
        let path_str = file_path.as_ref().to_string_lossy().to_string();

        if !file_path.as_ref().exists() {
            return Err(ConfigError::FileNotFound { path: path_str });
        }

        let contents = fs::read_to_string(&file_path)?;
        let document: Value = serde_yaml::from_str(&contents)?;

        if !document.is_mapping() {
            return Err(ConfigError::NotAMapping { path: path_str });
        }

        info!("Loaded config file {}", path_str);

        Ok(document)
    }

    /// Save the configuration document back to disk
    ///
    /// Serializes into a temp file in the destination directory and renames
    /// it over the original, so a failed or interrupted write leaves the
    /// previous document intact.
    pub fn save<P: AsRef<Path>>(&self, document: &Value, file_path: P) -> Result<(), ConfigError> {
        let path = file_path.as_ref();
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));

        let serialized = serde_yaml::to_string(document)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;

        temp.persist(path).map_err(|e| ConfigError::PersistFailed {
            message: e.to_string(),
        })?;

        info!("Saved config file {}", path.to_string_lossy());

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_requires_mapping_root() {
        let file = write_config("- just\n- a\n- list\n");
        let result = ConfigManager::new().load(file.path());
        assert!(matches!(result, Err(ConfigError::NotAMapping { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigManager::new().load("/nonexistent/config.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_round_trip_preserves_unknown_keys_and_order() {
        let file = write_config(
            "logging:\n  level: debug\nonvif:\n- name: Cam-A\n  custom_flag: true\nextra: 42\n"
        );

        let manager = ConfigManager::new();
        let document = manager.load(file.path()).unwrap();

        let out = tempfile::NamedTempFile::new().unwrap();
        manager.save(&document, out.path()).unwrap();

        let reread = manager.load(out.path()).unwrap();
        assert_eq!(document, reread);

        // Key order survives as well
        let keys: Vec<String> = reread
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["logging", "onvif", "extra"]);
    }
}

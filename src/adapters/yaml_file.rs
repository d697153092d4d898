// SPDX-License-Identifier: MIT OR Apache-2.0

//! YAML settings file loader.
//!
//! Reads [`Settings`] from a YAML file, either at an explicit path or in the
//! OS-appropriate configuration directory for an application.

use crate::domain::{ConfigError, Result, Settings};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum allowed file size for settings files (10MB)
/// This prevents denial of service attacks via extremely large files
const MAX_YAML_FILE_SIZE: u64 = 10 * 1024 * 1024;

const SOURCE_NAME: &str = "yaml-file";

fn display_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
}

/// Parses settings from YAML text.
///
/// # Examples
///
/// ```rust
/// use harvestcfg::adapters::yaml_file::parse_settings;
///
/// let settings = parse_settings("redis:\n  url: redis://127.0.0.1:6379\n").unwrap();
/// assert_eq!(settings.redis.unwrap().poll_interval_ms, 1000);
/// ```
pub fn parse_settings(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
        message: format!("Failed to parse YAML: {}", e),
        source: Some(Box::new(e)),
    })
}

/// A settings file that has been read and parsed.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::SettingsFile;
///
/// // Load from a specific file
/// let file = SettingsFile::from_file("/etc/myapp/harvester.yaml").unwrap();
///
/// // Load from default OS location
/// let file = SettingsFile::from_default_location("myapp", "com.example").unwrap();
/// let settings = file.settings();
/// ```
#[derive(Debug, Clone)]
pub struct SettingsFile {
    file_path: PathBuf,
    settings: Settings,
}

impl SettingsFile {
    /// Reads and parses the settings file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref();

        // Canonicalize path to prevent directory traversal attacks
        let canonical_path = file_path
            .canonicalize()
            .map_err(|e| ConfigError::SourceError {
                source_name: SOURCE_NAME.to_string(),
                message: format!("Invalid or inaccessible path: {}", display_name(file_path)),
                source: Some(Box::new(e)),
            })?;

        let metadata = fs::metadata(&canonical_path).map_err(|e| ConfigError::SourceError {
            source_name: SOURCE_NAME.to_string(),
            message: format!(
                "Failed to read file metadata: {}",
                display_name(&canonical_path)
            ),
            source: Some(Box::new(e)),
        })?;

        if metadata.len() > MAX_YAML_FILE_SIZE {
            return Err(ConfigError::SourceError {
                source_name: SOURCE_NAME.to_string(),
                message: format!(
                    "Settings file too large: {} bytes (max {} bytes)",
                    metadata.len(),
                    MAX_YAML_FILE_SIZE
                ),
                source: None,
            });
        }

        let content = fs::read_to_string(&canonical_path).map_err(|e| ConfigError::SourceError {
            source_name: SOURCE_NAME.to_string(),
            message: format!(
                "Failed to read settings file: {}",
                display_name(&canonical_path)
            ),
            source: Some(Box::new(e)),
        })?;

        let settings = parse_settings(&content)?;
        tracing::debug!(path = %canonical_path.display(), "loaded harvester settings");

        Ok(Self {
            file_path: canonical_path,
            settings,
        })
    }

    /// Loads `harvester.yaml` from the application's configuration directory.
    pub fn from_default_location(app_name: &str, qualifier: &str) -> Result<Self> {
        Self::with_filename(app_name, qualifier, "harvester.yaml")
    }

    /// Loads `filename` from the application's configuration directory.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use harvestcfg::adapters::SettingsFile;
    ///
    /// let file = SettingsFile::with_filename("myapp", "com.example", "stores.yaml").unwrap();
    /// ```
    pub fn with_filename(app_name: &str, qualifier: &str, filename: &str) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from(qualifier, "", app_name).ok_or_else(|| ConfigError::SourceError {
                source_name: SOURCE_NAME.to_string(),
                message: "Failed to determine project directories".to_string(),
                source: None,
            })?;

        Self::from_file(proj_dirs.config_dir().join(filename))
    }

    /// Returns the path to the settings file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// The parsed settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Consumes the file, returning its settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }
}

//! Configuration file loading
//!
//! Settings live in a YAML file in the platform's config directory. A missing
//! file is created with default values, so a first run works out of the box.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine the config directory location
    #[error("Failed to determine config directory location")]
    ConfigDirectoryNotFound,

    /// Failed to read or write the config file
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The config file is not valid YAML for our structure
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A value is present but unusable
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Site API settings
    #[serde(default)]
    pub site: SiteConfig,
    /// Download destination and tuning parameters
    pub downloader: DownloaderConfig,
}

/// Settings of the streaming site client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL of the site, without trailing slash
    pub base_url: String,
    /// Resolution label used when a stream does not state its own
    pub fallback_resolution: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://kisskh.co".to_string(),
            fallback_resolution: "720".to_string(),
        }
    }
}

/// Download destination and downloader tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Root directory; each series gets its own subdirectory
    pub download_dir: PathBuf,
    /// Timeout applied to every HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Attempts per HLS segment before the episode fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Remux assembled HLS streams into MP4 when ffmpeg is available
    #[serde(default = "default_remux_to_mp4")]
    pub remux_to_mp4: bool,
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .to_string()
}

fn default_remux_to_mp4() -> bool {
    true
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        let download_dir = directories::UserDirs::new()
            .and_then(|dirs| dirs.video_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("downloads"))
            .join("kisskh");

        Self {
            download_dir,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            remux_to_mp4: default_remux_to_mp4(),
        }
    }
}

impl DownloaderConfig {
    /// Timeout for a single HTTP request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builds the blocking HTTP client shared by the site client and downloaders
    pub fn http_client(&self) -> Result<reqwest::blocking::Client, reqwest::Error> {
        reqwest::blocking::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.request_timeout())
            .build()
    }
}

impl Config {
    /// Loads the configuration, creating a default file if none exists
    ///
    /// # Arguments
    ///
    /// * `path` - Explicit config file path; `None` uses the default location
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            let config = Config::default();
            config.write(&path)?;
            info!(path = %path.display(), "created default configuration");
            return Ok(config);
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        Self::parse(&raw, &path)
    }

    /// Parses and validates YAML text; `path` is only used for messages
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as YAML, creating parent directories
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let yaml =
            serde_yaml::to_string(self).map_err(|e| ConfigError::Validation(e.to_string()))?;
        fs::write(path, yaml).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.downloader.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "downloader.download_dir must not be empty".to_string(),
            ));
        }
        if self.downloader.max_retries == 0 {
            return Err(ConfigError::Validation(
                "downloader.max_retries must be at least 1".to_string(),
            ));
        }
        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "site.base_url is not a valid URL: {}",
                self.site.base_url
            )));
        }
        Ok(())
    }
}

/// Gets the default config file path
///
/// Returns the platform-specific config directory path:
/// - Linux: ~/.config/kisskh_dl/config.yaml
/// - macOS: ~/Library/Application Support/kisskh_dl/config.yaml
/// - Windows: %APPDATA%\kisskh_dl\config\config.yaml
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = directories::ProjectDirs::from("", "", "kisskh_dl")
        .ok_or(ConfigError::ConfigDirectoryNotFound)?;
    Ok(proj_dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let raw = "downloader:\n  download_dir: /tmp/shows\n";
        let config = Config::parse(raw, Path::new("config.yaml")).unwrap();
        assert_eq!(config.downloader.download_dir, PathBuf::from("/tmp/shows"));
        assert_eq!(config.downloader.max_retries, 3);
        assert_eq!(config.site, SiteConfig::default());
    }

    #[test]
    fn test_parse_missing_downloader_section() {
        let raw = "site:\n  base_url: https://example.com\n";
        let result = Config::parse(raw, Path::new("config.yaml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_zero_retries() {
        let raw = "downloader:\n  download_dir: /tmp/shows\n  max_retries: 0\n";
        let result = Config::parse(raw, Path::new("config.yaml"));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let created = Config::load(Some(&path)).unwrap();
        assert!(path.exists());

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(created, reloaded);
    }
}

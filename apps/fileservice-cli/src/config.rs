//! CLI configuration management.
//!
//! The last used settings are stored as TOML:
//! - Linux: `~/.config/fileservice/client.toml`
//! - Windows: `%APPDATA%/fileservice/client.toml`
//!
//! The access token is never written here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fileservice_client::{ClientConfig, DEFAULT_BASE_URL, RetryConfig};
use fileservice_uploader::UploaderConfig;
use serde::{Deserialize, Serialize};

/// Persisted CLI settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Resource used by the last transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<u32>,

    /// File sent by the last upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Folder used by the last download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_commit_poll_attempts")]
    pub commit_poll_attempts: u32,

    #[serde(default = "default_commit_poll_interval_secs")]
    pub commit_poll_interval_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

fn default_backoff_secs() -> u64 {
    RetryConfig::default().backoff.as_secs()
}

fn default_timeout_secs() -> u64 {
    ClientConfig::default().timeout.as_secs()
}

fn default_commit_poll_attempts() -> u32 {
    UploaderConfig::default().commit_poll_attempts
}

fn default_commit_poll_interval_secs() -> u64 {
    UploaderConfig::default().commit_poll_interval.as_secs()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            resource_id: None,
            file_path: None,
            download_dir: None,
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            timeout_secs: default_timeout_secs(),
            commit_poll_attempts: default_commit_poll_attempts(),
            commit_poll_interval_secs: default_commit_poll_interval_secs(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path`, or returns defaults if it does not
    /// exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryConfig {
                max_retries: self.max_retries,
                backoff: Duration::from_secs(self.backoff_secs),
            },
        }
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            commit_poll_attempts: self.commit_poll_attempts,
            commit_poll_interval: Duration::from_secs(self.commit_poll_interval_secs),
            ..UploaderConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("fileservice").join("client.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("fileservice")
            .join("client.toml")
    }
}

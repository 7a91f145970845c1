use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::version::VERSION_FILE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Endpoint of the local remote update agent
    #[serde(default)]
    pub remote: RemoteConfig,

    /// QR login page settings
    #[serde(default)]
    pub login: LoginConfig,

    /// Source file scanned for the version string, relative to the root
    #[serde(default = "default_version_file")]
    pub version_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Loopback host of the remote update agent
    #[serde(default = "default_remote_host")]
    pub host: String,

    /// Port of the remote update agent
    #[serde(default = "default_remote_port")]
    pub port: u16,

    /// Upper bound for a whole request/response exchange, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound for establishing the connection, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Authorization page the QR code points at
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
}

fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}
fn default_remote_port() -> u16 {
    17801
}
fn default_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_authorize_url() -> String {
    "https://open.weixin.qq.com/connect/qrconnect".to_string()
}
fn default_version_file() -> String {
    VERSION_FILE.to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            login: LoginConfig::default(),
            version_file: default_version_file(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_remote_host(),
            port: default_remote_port(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
        }
    }
}

impl RemoteConfig {
    /// Remote agent on the default host at `port`
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// URL the requests are posted to
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ManagerConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "svcupd", "svcupdmgr") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("svcupdmgr-config.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Load config from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }
}

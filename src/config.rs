//! Service configuration: optional TOML file, overridden by CLI flags.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// On-disk service config, loaded from TOML. Every field is optional;
/// the CLI supplies or overrides values, and [`ServerSettings::resolve`]
/// enforces what is actually required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listening address, e.g. `0.0.0.0:10022`.
    pub bind: Option<SocketAddr>,
    /// PEM certificate chain (host credential).
    pub cert: Option<PathBuf>,
    /// PEM private key (host credential).
    pub key: Option<PathBuf>,
    /// Directory of `*.ttf` fonts for width estimation.
    pub fonts: Option<PathBuf>,
    /// Bound on concurrent sessions.
    pub max_sessions: Option<usize>,
    /// Service identity shown in every status line; defaults to
    /// `termchat@<hostname>`.
    pub identity: Option<String>,
}

impl ServiceConfig {
    /// Load config from a TOML file path. Returns `None` if the file
    /// doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }
}

/// Errors that can occur when loading config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    ParseFailed(PathBuf, #[source] toml::de::Error),
    #[error("missing required setting: {0} (set it via CLI flag or config file)")]
    Missing(&'static str),
}

/// Fully resolved server settings, after merging CLI flags over the
/// config file.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub fonts: PathBuf,
    pub max_sessions: Option<usize>,
    pub identity: String,
}

impl ServerSettings {
    /// Merge CLI values (which win) over the optional config file.
    pub fn resolve(
        file: Option<ServiceConfig>,
        bind: Option<SocketAddr>,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        fonts: Option<PathBuf>,
        max_sessions: Option<usize>,
        identity: Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let settings = Self {
            bind: bind.or(file.bind).ok_or(ConfigError::Missing("bind"))?,
            cert: cert.or(file.cert).ok_or(ConfigError::Missing("cert"))?,
            key: key.or(file.key).ok_or(ConfigError::Missing("key"))?,
            fonts: fonts.or(file.fonts).ok_or(ConfigError::Missing("fonts"))?,
            max_sessions: max_sessions.or(file.max_sessions),
            identity: identity
                .or(file.identity)
                .unwrap_or_else(default_identity),
        };
        check_key_permissions(&settings.key);
        Ok(settings)
    }
}

/// Default service identity: `termchat@<hostname>`.
pub fn default_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("termchat@{host}")
}

/// Warn if the private key file is world-readable.
#[cfg(unix)]
fn check_key_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return; // Missing file surfaces later, when the credential loads.
    };
    let mode = metadata.permissions().mode();
    if mode & 0o004 != 0 {
        tracing::warn!(
            "private key {} is world-readable (mode {:o}); consider chmod 600",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
fn check_key_permissions(_path: &Path) {}

//! Configuration system for peerauth.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PEERAUTH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/peerauth/config.toml
//!   3. ~/.config/peerauth/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wallet::{Protocol, SecurityLevel};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerAuthConfig {
    pub identity: IdentityConfig,
    pub handshake: HandshakeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to the Ed25519 root key seed. Auto-generated on first run.
    pub key_path: PathBuf,
    /// false = run with an anonymous wallet that cannot derive or sign.
    pub key_deriver: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Protocol name handshake signatures are scoped to.
    pub protocol_name: String,
    /// 0 = silent, 1 = app, 2 = counterparty.
    pub security_level: u8,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_path: config_dir().join("identity.key"),
            key_deriver: true,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_name: "auth message signature".to_string(),
            security_level: SecurityLevel::Counterparty as u8,
        }
    }
}

impl HandshakeConfig {
    /// The signing protocol described by this section.
    /// An out-of-range level falls back to counterparty scope.
    pub fn protocol(&self) -> Protocol {
        let level = SecurityLevel::try_from(self.security_level).unwrap_or_else(|_| {
            tracing::warn!(level = self.security_level, "invalid security level, using counterparty");
            SecurityLevel::Counterparty
        });
        Protocol::new(level, self.protocol_name.clone())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("peerauth")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PeerAuthConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            PeerAuthConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PEERAUTH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PeerAuthConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PEERAUTH_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("PEERAUTH_IDENTITY__KEY_PATH") {
            self.identity.key_path = PathBuf::from(v);
        }
        if let Some(v) = var("PEERAUTH_IDENTITY__KEY_DERIVER") {
            self.identity.key_deriver = v == "true" || v == "1";
        }
        if let Some(v) = var("PEERAUTH_HANDSHAKE__PROTOCOL_NAME") {
            self.handshake.protocol_name = v;
        }
        if let Some(v) = var("PEERAUTH_HANDSHAKE__SECURITY_LEVEL") {
            if let Ok(level) = v.parse() {
                self.handshake.security_level = level;
            }
        }
    }
}

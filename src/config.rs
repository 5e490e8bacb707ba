//! Configuration loading for Confessor.
//!
//! Two sources feed a running bot:
//! - `Settings`: optional JSON file (`~/.confessor/settings.json`), every field defaulted.
//! - `Credentials`: the three required environment variables gating startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const WALLET_KEY_VAR: &str = "WALLET_KEY";
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";
pub const ENV_VAR: &str = "XMTP_ENV";

/// Get the Confessor home directory (~/.confessor).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".confessor"))
}

/// Get the default settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from `path`, or from ~/.confessor/settings.json.
///
/// A missing file yields defaults; a present but invalid file is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };

    if !path.exists() {
        tracing::debug!("No settings at {}, using defaults", path.display());
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    settings.validate()?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// A group the bot manages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GroupConfig {
    pub name: String,

    /// Known conversation id; looked up by name when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Whether direct-message senders get added to this group.
    #[serde(default = "default_true")]
    pub enroll: bool,
}

fn default_true() -> bool {
    true
}

/// Game configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GameConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default = "default_max_incorrect_guesses")]
    pub max_incorrect_guesses: u32,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/confessions.json")
}

fn default_max_incorrect_guesses() -> u32 {
    5
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_incorrect_guesses: default_max_incorrect_guesses(),
        }
    }
}

/// Message stream retry configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StreamConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    6
}

fn default_retry_delay_secs() -> u64 {
    10
}

impl StreamConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

/// Messaging sidecar connection.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BridgeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5555".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

/// Confessor settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,

    #[serde(default = "default_confession_group")]
    pub confession_group: String,

    /// Inbox ids promoted to super admin in every group.
    #[serde(default)]
    pub admins: Vec<String>,

    #[serde(default)]
    pub game: GameConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,
}

fn default_groups() -> Vec<GroupConfig> {
    vec![GroupConfig {
        name: default_confession_group(),
        id: None,
        enroll: true,
    }]
}

fn default_confession_group() -> String {
    "Confessions".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            groups: default_groups(),
            confession_group: default_confession_group(),
            admins: Vec::new(),
            game: GameConfig::default(),
            stream: StreamConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::Config("at least one group must be configured".to_string()));
        }
        for (i, group) in self.groups.iter().enumerate() {
            if group.name.trim().is_empty() {
                return Err(Error::Config(format!("groups[{}].name is empty", i)));
            }
            if self.groups[..i].iter().any(|g| g.name == group.name) {
                return Err(Error::Config(format!("duplicate group name '{}'", group.name)));
            }
        }
        if self.confession_group_config().is_none() {
            return Err(Error::Config(format!(
                "confession_group '{}' not found in groups",
                self.confession_group
            )));
        }
        if self.stream.max_attempts == 0 {
            return Err(Error::Config("stream.max_attempts must be at least 1".to_string()));
        }
        if self.game.max_incorrect_guesses == 0 {
            return Err(Error::Config(
                "game.max_incorrect_guesses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn confession_group_config(&self) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == self.confession_group)
    }
}

/// Messaging network the client connects to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnv {
    Local,
    Dev,
    Production,
}

impl std::str::FromStr for NetworkEnv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(NetworkEnv::Local),
            "dev" => Ok(NetworkEnv::Dev),
            "production" => Ok(NetworkEnv::Production),
            other => Err(Error::Config(format!(
                "{} must be one of local, dev, production (got '{}')",
                ENV_VAR, other
            ))),
        }
    }
}

impl fmt::Display for NetworkEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEnv::Local => write!(f, "local"),
            NetworkEnv::Dev => write!(f, "dev"),
            NetworkEnv::Production => write!(f, "production"),
        }
    }
}

/// Signing key, local database key and network tag.
#[derive(Clone)]
pub struct Credentials {
    pub wallet_key: String,
    pub encryption_key: String,
    pub env: NetworkEnv,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("wallet_key", &"<redacted>")
            .field("encryption_key", &"<redacted>")
            .field("env", &self.env)
            .finish()
    }
}

impl Credentials {
    /// Validate raw values; each missing one is reported by variable name.
    pub fn from_parts(
        wallet_key: Option<&str>,
        encryption_key: Option<&str>,
        env: Option<&str>,
    ) -> Result<Self> {
        let wallet_key = require(WALLET_KEY_VAR, wallet_key)?;
        let encryption_key = require(ENCRYPTION_KEY_VAR, encryption_key)?;
        let env: NetworkEnv = require(ENV_VAR, env)?.parse()?;

        check_hex_key(WALLET_KEY_VAR, &wallet_key)?;
        check_hex_key(ENCRYPTION_KEY_VAR, &encryption_key)?;

        Ok(Self {
            wallet_key,
            encryption_key,
            env,
        })
    }
}

fn require(name: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Config(format!("{} must be set", name))),
    }
}

fn check_hex_key(name: &str, value: &str) -> Result<()> {
    let raw = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(raw)
        .map_err(|_| Error::Config(format!("{} is not valid hex", name)))?;
    if bytes.len() != 32 {
        return Err(Error::Config(format!(
            "{} must be 32 bytes, got {}",
            name,
            bytes.len()
        )));
    }
    Ok(())
}

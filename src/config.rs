use anyhow::{anyhow, Result};
use log::{debug, info};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::models::UserId;

/// How the chat list is ordered for rendering
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChatOrder {
    /// Most recent activity first
    #[default]
    Recent,
    /// Order in which chats were created
    Insertion,
}

/// Runtime configuration of a reconciler
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub local_user_id: UserId,
    pub chat_order: ChatOrder,
    /// Shown for users the roster has not told us about
    pub unknown_name: String,
    /// Upper bound on acks held for messages not seen yet
    pub max_buffered_acks: usize,
    /// Composing/paused indicators older than this are dropped
    pub typing_timeout_secs: i64,
    /// Queue delivered/read receipts for inbound messages
    pub emit_receipts: bool,
}

impl SyncConfig {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        let defaults = Settings::default();
        SyncConfig {
            local_user_id: local_user_id.into(),
            chat_order: defaults.chat_order,
            unknown_name: defaults.unknown_name,
            max_buffered_acks: defaults.max_buffered_acks,
            typing_timeout_secs: defaults.typing_timeout_secs,
            emit_receipts: defaults.emit_receipts,
        }
    }

    pub fn with_chat_order(mut self, order: ChatOrder) -> Self {
        self.chat_order = order;
        self
    }
}

/// On-disk settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_user_id: Option<UserId>,
    pub chat_order: ChatOrder,
    pub unknown_name: String,
    pub max_buffered_acks: usize,
    pub typing_timeout_secs: i64,
    pub emit_receipts: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            local_user_id: None,
            chat_order: ChatOrder::Recent,
            unknown_name: "Unknown".to_string(),
            max_buffered_acks: 1024,
            typing_timeout_secs: 10,
            emit_receipts: true,
        }
    }
}

impl Settings {
    /// Build the reconciler config. `user_override` wins over the file.
    pub fn into_sync_config(self, user_override: Option<String>) -> Result<SyncConfig> {
        let local_user_id = user_override
            .or(self.local_user_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("No local user id configured (set local_user_id or pass --user)"))?;

        Ok(SyncConfig {
            local_user_id,
            chat_order: self.chat_order,
            unknown_name: self.unknown_name,
            max_buffered_acks: self.max_buffered_acks,
            typing_timeout_secs: self.typing_timeout_secs,
            emit_receipts: self.emit_receipts,
        })
    }
}

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Point settings at a specific file. Only the first call takes effect.
pub fn set_config_path_override(path: PathBuf) {
    if CONFIG_PATH_OVERRIDE.set(path).is_err() {
        debug!("Settings path override already set, ignoring");
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("chatsync");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn get_config_path() -> Result<PathBuf> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("settings.json"))
}

/// Load settings from the configured location, falling back to defaults
pub fn load_settings() -> Result<Settings> {
    let path = get_config_path()?;
    load_settings_from(&path)
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let settings: Settings = serde_json::from_str(&contents)
        .map_err(|e| anyhow!("Invalid settings file {}: {}", path.display(), e))?;
    info!("Loaded settings from {}", path.display());

    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;

    info!("Settings saved to {}", path.display());
    Ok(())
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&get_config_path()?, settings)
}

use crate::minecraft::{self, DEFAULT_GAME_VERSION, DEFAULT_LOADER};
use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const APP_DIR_NAME: &str = "modding-helper";
const MODRINTH_API: &str = "https://api.modrinth.com";
const UPDATER_BASE_URL: &str =
    "https://raw.githubusercontent.com/Henrique-Coder/modding-helper/main/updater_api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "minecraft::default_minecraft_dir")]
    pub minecraft_dir: PathBuf,
    #[serde(default)]
    pub backups_dir: PathBuf,
    #[serde(default = "default_game_version")]
    pub game_version: String,
    #[serde(default = "default_loader")]
    pub loader: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_updater_base_url")]
    pub updater_base_url: String,
    #[serde(default = "default_true")]
    pub backup_before_install: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            minecraft_dir: minecraft::default_minecraft_dir(),
            backups_dir: PathBuf::new(),
            game_version: default_game_version(),
            loader: default_loader(),
            api_base: default_api_base(),
            updater_base_url: default_updater_base_url(),
            backup_before_install: true,
        }
    }
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            if config.backups_dir.as_os_str().is_empty() {
                config.backups_dir = base_dir.join("backups");
                config.save()?;
            }
            return Ok(config);
        }

        let config = AppConfig {
            backups_dir: base_dir.join("backups"),
            ..AppConfig::default()
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    pub fn mods_dir(&self) -> PathBuf {
        minecraft::mods_dir(&self.minecraft_dir)
    }

    /// Applies a `config set` key. Unknown keys and unparseable values fail.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "minecraft-dir" | "minecraft_dir" => self.minecraft_dir = PathBuf::from(value),
            "backups-dir" | "backups_dir" => self.backups_dir = PathBuf::from(value),
            "game-version" | "game_version" => self.game_version = value.to_string(),
            "loader" => self.loader = value.to_ascii_lowercase(),
            "api-base" | "api_base" => self.api_base = value.trim_end_matches('/').to_string(),
            "updater-base-url" | "updater_base_url" => {
                self.updater_base_url = value.trim_end_matches('/').to_string()
            }
            "backup-before-install" | "backup_before_install" => {
                self.backup_before_install = parse_bool(value)
                    .with_context(|| format!("expected true/false for {key}, got {value}"))?;
            }
            _ => bail!("Unknown config key: {key}"),
        }
        Ok(())
    }
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join(APP_DIR_NAME))
}

pub fn cache_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve cache dir")?;
    let dir = base.cache_dir().join(APP_DIR_NAME);
    fs::create_dir_all(&dir).context("create cache dir")?;
    Ok(dir)
}

pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("modding-helper.log")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn default_game_version() -> String {
    DEFAULT_GAME_VERSION.to_string()
}

fn default_loader() -> String {
    DEFAULT_LOADER.to_string()
}

fn default_api_base() -> String {
    MODRINTH_API.to_string()
}

fn default_updater_base_url() -> String {
    UPDATER_BASE_URL.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "minecraft_dir": "/games/mc" }"#).unwrap();
        assert_eq!(config.minecraft_dir, PathBuf::from("/games/mc"));
        assert_eq!(config.game_version, "1.20.1");
        assert_eq!(config.loader, "fabric");
        assert!(config.backup_before_install);
        assert!(config.backups_dir.as_os_str().is_empty());
        assert_eq!(config.mods_dir(), PathBuf::from("/games/mc/mods"));
    }

    #[test]
    fn set_updates_known_keys() {
        let mut config = AppConfig::default();
        config.set("loader", "Quilt").unwrap();
        config.set("backup-before-install", "no").unwrap();
        config.set("api-base", "http://localhost:8080/").unwrap();
        assert_eq!(config.loader, "quilt");
        assert!(!config.backup_before_install);
        assert_eq!(config.api_base, "http://localhost:8080");
        assert!(config.set("backup-before-install", "maybe").is_err());
        assert!(config.set("colour", "blue").is_err());
    }
}

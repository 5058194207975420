use crate::ranking::RankingSettings;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ForumConfig {
    pub api_port: u16,
    pub storage: StorageBackend,
    pub paths: ForumPaths,
    pub ranking: RankingSettings,
    /// Insert the default communities and demo user into a fresh store.
    pub seed_defaults: bool,
}

impl ForumConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("FORUM_HOME") {
            Ok(raw) if !raw.trim().is_empty() => ForumPaths::from_base_dir(raw)?,
            _ => ForumPaths::discover()?,
        };
        let api_port = env::var("FORUM_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);
        let storage = match env::var("FORUM_STORAGE") {
            Ok(raw) => raw.parse()?,
            Err(_) => StorageBackend::default(),
        };
        let seed_defaults = env::var("FORUM_SEED")
            .ok()
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);
        Ok(Self {
            api_port,
            storage,
            paths,
            ranking: RankingSettings::from_env(),
            seed_defaults,
        })
    }

    pub fn new(api_port: u16, storage: StorageBackend, paths: ForumPaths) -> Self {
        Self {
            api_port,
            storage,
            paths,
            ranking: RankingSettings::default(),
            seed_defaults: true,
        }
    }
}

impl RankingSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hot_exponent: env_number("FORUM_HOT_EXPONENT").unwrap_or(defaults.hot_exponent),
            rising_window_hours: env_number("FORUM_RISING_WINDOW_HOURS")
                .unwrap_or(defaults.rising_window_hours),
            rising_min_upvotes: env_number("FORUM_RISING_MIN_UPVOTES")
                .unwrap_or(defaults.rising_min_upvotes),
        }
    }
}

fn env_number<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown storage backend {other:?} (expected sqlite, json or memory)"),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Json => "json",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ForumPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub json_path: PathBuf,
}

impl ForumPaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("forum.db");
        let json_path = data_dir.join("forum.json");

        Ok(Self {
            base,
            data_dir,
            db_path,
            json_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_case_insensitively() {
        assert_eq!("JSON".parse::<StorageBackend>().unwrap(), StorageBackend::Json);
        assert_eq!(" memory ".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("postgres".parse::<StorageBackend>().is_err());
        assert_eq!(StorageBackend::default().to_string(), "sqlite");
    }

    #[test]
    fn paths_hang_off_the_base_dir() {
        let paths = ForumPaths::from_base_dir("/tmp/forum").unwrap();
        assert_eq!(paths.db_path, PathBuf::from("/tmp/forum/data/forum.db"));
        assert_eq!(paths.json_path, PathBuf::from("/tmp/forum/data/forum.json"));
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// Cache-related constants
// =============================================================================

/// Default capacity of an in-process cache slot
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Default expiry of entries written to a shared cache slot (5 minutes)
pub const DEFAULT_TTL_SECS: u64 = 5 * 60;

/// Name of the log file inside the data directory
pub const LOG_FILE_NAME: &str = "app-catalog.log";

/// Catalog configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogConfig {
    pub store: StoreConfig,
    pub spaces: Vec<SpaceConfig>,
    pub cache: CacheConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            spaces: vec![SpaceConfig::default()],
            cache: CacheConfig::default(),
        }
    }
}

impl CatalogConfig {
    /// Read a JSON configuration file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Space with the given name, or the first configured one
    pub fn space(&self, name: Option<&str>) -> Option<&SpaceConfig> {
        match name {
            Some(name) => self.spaces.iter().find(|space| space.name == name),
            None => self.spaces.first(),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Path of the SQLite database file
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: db_path() }
    }
}

/// A catalog partition
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SpaceConfig {
    pub name: String,
    /// Prefix of the space's collections and cache keys
    pub prefix: String,
}

/// Cache slots used by the catalog
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub versions_latest: SlotConfig,
    pub versions_list: SlotConfig,
}

/// Backend of one cache slot
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SlotConfig {
    #[serde(rename_all = "camelCase")]
    Memory {
        #[serde(default = "default_max_entries")]
        max_entries: usize,
    },
    #[serde(rename_all = "camelCase")]
    Redis {
        url: String,
        #[serde(default = "default_ttl_secs")]
        ttl_secs: u64,
    },
}

impl Default for SlotConfig {
    fn default() -> Self {
        SlotConfig::Memory {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

/// Returns the path to the data directory for app-catalog.
/// Uses $XDG_DATA_HOME/app-catalog if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/app-catalog,
/// or ./app-catalog if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file.
pub fn db_path() -> PathBuf {
    data_dir().join("catalog.db")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("app-catalog")
}

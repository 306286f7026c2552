// Local configuration for the daemon: `~/.quire/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::DEFAULT_MERGE_THRESHOLD;
use crate::notebook::NotebookOptions;
use crate::search::DEFAULT_SEARCH_LIMIT;
use crate::startup::{ensure_owner_only_dir, ensure_owner_only_file};
use crate::subscription::DebounceConfig;

const NOTEBOOK_FILE_NAME: &str = "notebook.db";

/// Root directory for quire global state: `~/.quire/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quire"))
}

/// Path to the global config file: `~/.quire/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("config.toml"))
}

/// Daemon configuration. Every field has a default, so a partial or empty
/// file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Notebook database to open (defaults to `~/.quire/notebook.db`).
    pub notebook_path: Option<PathBuf>,
    /// Changesets applied since the last snapshot before compaction.
    pub merge_threshold: u32,
    /// Document-list push debounce in milliseconds (50–2000).
    pub doc_list_debounce_ms: u64,
    /// Outline push debounce in milliseconds (50–2000).
    pub outline_debounce_ms: u64,
    /// Default number of title search results.
    pub search_limit: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            notebook_path: None,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            doc_list_debounce_ms: 300,
            outline_debounce_ms: 500,
            search_limit: DEFAULT_SEARCH_LIMIT,
            log_filter: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, or from `~/.quire/config.toml` when `None`. A missing
    /// file yields defaults; an unreadable or malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match global_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            ensure_owner_only_dir(parent).map_err(ConfigError::Permissions)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        ensure_owner_only_file(path).map_err(ConfigError::Permissions)
    }

    /// Configured notebook path, falling back to `notebook.db` in `base_dir`.
    pub fn notebook_path_in(&self, base_dir: &Path) -> PathBuf {
        self.notebook_path.clone().unwrap_or_else(|| base_dir.join(NOTEBOOK_FILE_NAME))
    }

    pub fn notebook_options(&self) -> NotebookOptions {
        NotebookOptions {
            merge_threshold: self.merge_threshold,
            doc_list_debounce: DebounceConfig::with_millis(self.doc_list_debounce_ms),
            outline_debounce: DebounceConfig::with_millis(self.outline_debounce_ms),
            search_limit: self.search_limit,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config permissions error: {0}")]
    Permissions(anyhow::Error),
}

//! Configuration loading and root folder resolution
//!
//! Static configuration consumed by the similarity core: embedding
//! dimensions, the audio feature order with its scalar divisors, and the
//! category rule table. Each component receives its slice of this
//! configuration at construction time; nothing reads it from global state.
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `SIMCAT_CONFIG` environment variable
//! 3. `<user config dir>/simcat/simcat.toml`, then `/etc/simcat/simcat.toml` on Linux
//! 4. Compiled defaults
//!
//! A missing config file is not an error: a warning is logged and the
//! compiled defaults are used.

use crate::category::{RuleTable, DEFAULT_MOOD_RULES};
use crate::embedding::builder::{
    default_audio_features, EmbeddingLayout, FeatureSpec, AUDIO_EMBEDDING_DIM,
};
use crate::embedding::external::{ExternalVectorAdapter, TEXT_EMBEDDING_DIM};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SIMCAT_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "SIMCAT_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "simcat.db";

/// Full TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: String,
    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub text: TextConfig,
    pub search: SearchConfig,
    /// Category rules; order decides ties
    pub categories: Vec<CategoryConfig>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: "127.0.0.1:5740".to_string(),
            logging: LoggingConfig::default(),
            audio: AudioConfig::default(),
            text: TextConfig::default(),
            search: SearchConfig::default(),
            categories: DEFAULT_MOOD_RULES
                .iter()
                .map(|(label, keywords)| CategoryConfig {
                    label: (*label).to_string(),
                    keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Audio embedding layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub target_dim: usize,
    /// Concatenation order; part of the stored embedding format
    pub features: Vec<FeatureSpec>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_dim: AUDIO_EMBEDDING_DIM,
            features: default_audio_features(),
        }
    }
}

impl AudioConfig {
    pub fn layout(&self) -> Result<EmbeddingLayout> {
        Ok(EmbeddingLayout::new(self.target_dim, self.features.clone())?)
    }
}

/// Text embedding provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub target_dim: usize,
    pub model: String,
    pub api_base: String,
    /// Lowest-priority key source; environment variables win
    pub api_key: Option<String>,
    pub requests_per_second: u32,
    pub timeout_seconds: u64,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            target_dim: TEXT_EMBEDDING_DIM,
            model: "text-embedding-3-small".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            requests_per_second: 5,
            timeout_seconds: 30,
        }
    }
}

impl TextConfig {
    pub fn adapter(&self) -> Result<ExternalVectorAdapter> {
        Ok(ExternalVectorAdapter::new(self.target_dim)?)
    }
}

/// Similarity query bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Candidate breadth handed to an index-backed search
    pub default_search_breadth: usize,
    pub max_search_breadth: usize,
    /// Candidates per ranking partition in a full scan
    pub partition_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            default_search_breadth: 100,
            max_search_breadth: 1000,
            partition_size: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub label: String,
    pub keywords: Vec<String>,
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// A config path was resolved but no file exists there
    Missing(PathBuf),
    Defaults,
}

impl CatalogConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load from the resolved config file, or fall back to defaults
    ///
    /// Returns the config and where it came from. A file that exists but
    /// does not parse is an error. Nothing is logged here since this runs
    /// before the subscriber is installed.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<(Self, ConfigSource)> {
        match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                let config = Self::load(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            Some(path) => Ok((Self::default(), ConfigSource::Missing(path))),
            None => Ok((Self::default(), ConfigSource::Defaults)),
        }
    }

    /// Category rule table in configured order
    pub fn rule_table(&self) -> Result<RuleTable> {
        Ok(RuleTable::new(
            self.categories
                .iter()
                .map(|c| (c.label.clone(), c.keywords.clone())),
        )?)
    }

    /// Check everything that would otherwise fail later at request time
    pub fn validate(&self) -> Result<()> {
        self.audio.layout()?;
        self.text.adapter()?;
        self.rule_table()?;

        let search = &self.search;
        if search.max_limit == 0 || search.default_limit == 0 {
            return Err(Error::Config("search limits must be positive".to_string()));
        }
        if search.default_limit > search.max_limit {
            return Err(Error::Config(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                search.default_limit, search.max_limit
            )));
        }
        if search.default_search_breadth > search.max_search_breadth {
            return Err(Error::Config(format!(
                "search.default_search_breadth ({}) exceeds search.max_search_breadth ({})",
                search.default_search_breadth, search.max_search_breadth
            )));
        }
        if search.max_search_breadth < search.max_limit {
            return Err(Error::Config(format!(
                "search.max_search_breadth ({}) must be at least search.max_limit ({})",
                search.max_search_breadth, search.max_limit
            )));
        }
        if search.partition_size == 0 {
            return Err(Error::Config(
                "search.partition_size must be positive".to_string(),
            ));
        }
        if self.text.requests_per_second == 0 {
            return Err(Error::Config(
                "text.requests_per_second must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the config file without reading it
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config locations
    let user_config = dirs::config_dir().map(|d| d.join("simcat").join("simcat.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/simcat/simcat.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. `SIMCAT_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &CatalogConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/simcat (or /var/lib/simcat for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("simcat"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/simcat"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("simcat"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/simcat"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("simcat"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\simcat"))
    } else {
        PathBuf::from("./simcat_data")
    }
}

//! Process configuration.
//!
//! One YAML file, loaded once at startup and never re-read during a
//! cycle. Every field has a default so a minimal deployment can start
//! from an empty document.
//!
//! ```yaml
//! permits_db_path: data/permits.db
//! clients_db_path: data/clients.db
//! rag_index_dir: data/rag_index
//! cycle_interval_secs: 14400
//! batch_size: 256
//! per_client_top_k: 200
//! oversample: 5
//! scrape_timeout_secs: 30
//! sources:
//!   - name: austin
//!     window_days: 30
//!   - name: seattle
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating the process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// One scrape source and its date-window policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    /// Rolling window in days. 1 means "today only"; sparse sources use a
    /// wider window so a cycle never sees zero rows just because the
    /// portal publishes late.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

fn default_window_days() -> u32 {
    1
}

/// Process-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Permit catalog + delivery ledger database.
    pub permits_db_path: PathBuf,
    /// Client profile database.
    pub clients_db_path: PathBuf,
    /// Directory holding the index artifact triple.
    pub rag_index_dir: PathBuf,
    /// Seconds between automation cycles.
    pub cycle_interval_secs: u64,
    /// Embedding batch size.
    pub batch_size: usize,
    /// Semantic result cap per client, pre-resolver.
    pub per_client_top_k: usize,
    /// Database oversampling factor for semantic retrieval.
    pub oversample: usize,
    /// Per-request scraper timeout, seconds.
    pub scrape_timeout_secs: u64,
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            permits_db_path: PathBuf::from("data/permits.db"),
            clients_db_path: PathBuf::from("data/clients.db"),
            rag_index_dir: PathBuf::from("data/rag_index"),
            cycle_interval_secs: 4 * 60 * 60,
            batch_size: 256,
            per_client_top_k: 200,
            oversample: 5,
            scrape_timeout_secs: 30,
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "cycle_interval_secs must be positive".into(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > 256 {
            return Err(ConfigError::Validation(
                "batch_size must be in 1..=256".into(),
            ));
        }
        if self.per_client_top_k == 0 {
            return Err(ConfigError::Validation(
                "per_client_top_k must be positive".into(),
            ));
        }
        if self.oversample == 0 {
            return Err(ConfigError::Validation("oversample must be positive".into()));
        }
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Validation("source name must be set".into()));
            }
            if source.window_days == 0 {
                return Err(ConfigError::Validation(format!(
                    "source '{}' window_days must be positive",
                    source.name
                )));
            }
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }
}

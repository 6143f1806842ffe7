//! Configuration management for Docent
//!
//! Settings come from a YAML file, looked up in this order:
//! `--config`, `$DOCENT_CONFIG`, then `<data dir>/config.yaml`. Missing files
//! fall back to defaults. `GEMINI_API_KEY` overrides the configured key.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::models::EmbeddingModel;

pub const CONFIG_ENV: &str = "DOCENT_CONFIG";
pub const DATA_DIR_ENV: &str = "DOCENT_DATA_DIR";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const CONFIG_FILE: &str = "config.yaml";
const STORE_FILE: &str = "knowledge.db";
const TRACE_LOG_FILE: &str = "retrieval.logs.jsonl";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
  /// Where the store and trace log live; defaults to `~/.docent`
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub embedding: EmbeddingConfig,
  #[serde(default)]
  pub retrieval: RetrievalConfig,
  #[serde(default)]
  pub ingestion: IngestionConfig,
}

/// Upstream embedding model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
  #[serde(default = "default_model")]
  pub model: String,
  /// Length of every vector the model returns and the store accepts
  #[serde(default = "default_dimension")]
  pub dimension: usize,
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default)]
  pub api_key: Option<String>,
  /// Longer inputs are truncated before being sent
  #[serde(default = "default_max_input_chars")]
  pub max_input_chars: usize,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

/// Query-time settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
  /// Minimum cosine similarity for a passage to be included
  #[serde(default = "default_threshold")]
  pub threshold: f32,
  /// Passage budget when the caller does not give one
  #[serde(default = "default_limit")]
  pub limit: usize,
}

/// Bulk embedding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency: usize,
  /// Pause after each batch
  #[serde(default = "default_pause_ms")]
  pub pause_ms: u64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_initial_backoff_ms")]
  pub initial_backoff_ms: u64,
  /// Ceiling on any single retry wait, including upstream hints
  #[serde(default = "default_max_backoff_ms")]
  pub max_backoff_ms: u64,
  /// Chunks shorter than this (after trimming) are skipped
  #[serde(default = "default_min_chunk_chars")]
  pub min_chunk_chars: usize,
}

// Default value functions
fn default_model() -> String {
  "models/gemini-embedding-001".to_string()
}
fn default_dimension() -> usize {
  768
}
fn default_base_url() -> String {
  "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_max_input_chars() -> usize {
  8000
}
fn default_timeout_secs() -> u64 {
  30
}
fn default_threshold() -> f32 {
  0.1
}
fn default_limit() -> usize {
  5
}
fn default_batch_size() -> usize {
  100
}
fn default_max_concurrency() -> usize {
  2
}
fn default_pause_ms() -> u64 {
  500
}
fn default_max_retries() -> u32 {
  3
}
fn default_initial_backoff_ms() -> u64 {
  1000
}
fn default_max_backoff_ms() -> u64 {
  30_000
}
fn default_min_chunk_chars() -> usize {
  20
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      model: default_model(),
      dimension: default_dimension(),
      base_url: default_base_url(),
      api_key: None,
      max_input_chars: default_max_input_chars(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl EmbeddingConfig {
  pub fn embedding_model(&self) -> EmbeddingModel {
    EmbeddingModel::new(self.model.clone(), self.dimension)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl Default for RetrievalConfig {
  fn default() -> Self {
    Self { threshold: default_threshold(), limit: default_limit() }
  }
}

impl Default for IngestionConfig {
  fn default() -> Self {
    Self {
      batch_size: default_batch_size(),
      max_concurrency: default_max_concurrency(),
      pause_ms: default_pause_ms(),
      max_retries: default_max_retries(),
      initial_backoff_ms: default_initial_backoff_ms(),
      max_backoff_ms: default_max_backoff_ms(),
      min_chunk_chars: default_min_chunk_chars(),
    }
  }
}

impl Config {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content =
      std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: Config =
      serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    config.validate()?;
    Ok(config)
  }

  /// Resolve, load and validate configuration, then apply environment overrides
  ///
  /// An explicit or `$DOCENT_CONFIG` path must exist; the data-dir default may not.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let env_path = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from);

    let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
      Some(path) => Self::load_from_file(path)?,
      None => {
        let default_path = default_data_dir().join(CONFIG_FILE);
        if default_path.exists() {
          Self::load_from_file(default_path)?
        } else {
          Config::default()
        }
      }
    };

    config.apply_env();
    Ok(config)
  }

  /// Environment overrides: data directory and API key
  pub fn apply_env(&mut self) {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
      self.data_dir = Some(PathBuf::from(dir));
    }

    if let Ok(key) = std::env::var(API_KEY_ENV) {
      if !key.trim().is_empty() {
        self.embedding.api_key = Some(key.trim().to_string());
      }
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |message: &str| Err(ConfigError::Invalid { message: message.to_string() });

    if self.embedding.model.trim().is_empty() {
      return invalid("embedding.model must not be empty");
    }
    if self.embedding.dimension == 0 {
      return invalid("embedding.dimension must be positive");
    }
    if !(-1.0..=1.0).contains(&self.retrieval.threshold) {
      return invalid("retrieval.threshold must be between -1 and 1");
    }
    if self.ingestion.batch_size == 0 {
      return invalid("ingestion.batch_size must be positive");
    }
    if self.ingestion.max_concurrency == 0 {
      return invalid("ingestion.max_concurrency must be positive");
    }
    Ok(())
  }

  pub fn data_dir(&self) -> PathBuf {
    self.data_dir.clone().unwrap_or_else(default_data_dir)
  }

  pub fn store_path(&self) -> PathBuf {
    self.data_dir().join(STORE_FILE)
  }

  pub fn trace_log_path(&self) -> PathBuf {
    self.data_dir().join(TRACE_LOG_FILE)
  }

  /// Configured API key, if any non-blank one is set
  pub fn api_key(&self) -> Option<&str> {
    self.embedding.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty())
  }
}

fn default_data_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
    return PathBuf::from(dir);
  }
  dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".docent")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  fn clear_env() {
    std::env::remove_var(CONFIG_ENV);
    std::env::remove_var(DATA_DIR_ENV);
    std::env::remove_var(API_KEY_ENV);
  }

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.embedding.model, "models/gemini-embedding-001");
    assert_eq!(config.embedding.dimension, 768);
    assert_eq!(config.retrieval.threshold, 0.1);
    assert_eq!(config.retrieval.limit, 5);
    assert_eq!(config.ingestion.batch_size, 100);
    assert_eq!(config.ingestion.min_chunk_chars, 20);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "retrieval:\n  threshold: 0.35\nembedding:\n  dimension: 1536\n").unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.retrieval.threshold, 0.35);
    assert_eq!(config.retrieval.limit, 5);
    assert_eq!(config.embedding.dimension, 1536);
    assert_eq!(config.embedding.model, "models/gemini-embedding-001");
  }

  #[test]
  fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    fs::write(&path, "embedding:\n  dimension: 0\n").unwrap();
    assert!(matches!(Config::load_from_file(&path), Err(ConfigError::Invalid { .. })));

    fs::write(&path, "retrieval:\n  threshold: 1.5\n").unwrap();
    assert!(matches!(Config::load_from_file(&path), Err(ConfigError::Invalid { .. })));

    fs::write(&path, "retrieval: [not, a, map]\n").unwrap();
    assert!(matches!(Config::load_from_file(&path), Err(ConfigError::Parse { .. })));
  }

  #[test]
  #[serial]
  fn test_explicit_path_must_exist() {
    clear_env();
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
  }

  #[test]
  #[serial]
  fn test_env_config_and_data_dir() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.yaml");
    fs::write(&path, "retrieval:\n  limit: 9\n").unwrap();

    std::env::set_var(CONFIG_ENV, &path);
    std::env::set_var(DATA_DIR_ENV, dir.path());

    let config = Config::load(None).unwrap();
    assert_eq!(config.retrieval.limit, 9);
    assert_eq!(config.store_path(), dir.path().join("knowledge.db"));
    assert_eq!(config.trace_log_path(), dir.path().join("retrieval.logs.jsonl"));

    clear_env();
  }

  #[test]
  #[serial]
  fn test_config_in_data_dir_is_picked_up() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.yaml"), "retrieval:\n  threshold: 0.2\n").unwrap();
    std::env::set_var(DATA_DIR_ENV, dir.path());

    let config = Config::load(None).unwrap();
    assert_eq!(config.retrieval.threshold, 0.2);

    clear_env();
  }

  #[test]
  #[serial]
  fn test_api_key_env_overrides_file() {
    clear_env();
    let mut config = Config::default();
    config.embedding.api_key = Some("from-file".to_string());

    std::env::set_var(API_KEY_ENV, "  from-env  ");
    config.apply_env();
    assert_eq!(config.api_key(), Some("from-env"));

    clear_env();
  }

  #[test]
  fn test_blank_api_key_counts_as_missing() {
    let mut config = Config::default();
    config.embedding.api_key = Some("   ".to_string());
    assert_eq!(config.api_key(), None);
  }
}

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the upstream embedding model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
  #[error("no embedding backend is configured")]
  NotConfigured,

  #[error("cannot embed empty text")]
  EmptyInput,

  #[error("authentication failed: {message}")]
  Authentication { message: String },

  #[error("rate limited: {message}")]
  RateLimited { message: String, retry_after: Option<Duration> },

  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  #[error("model not found: {model}")]
  ModelNotFound { model: String },

  #[error("network error: {message}")]
  Network { message: String },

  #[error("server error (HTTP {status}): {message}")]
  Server { status: u16, message: String },

  #[error("unparseable response: {message}")]
  Parse { message: String },

  #[error("expected a {expected}-dimensional embedding, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::Network { message: message.into() }
  }

  pub fn parse(message: impl Into<String>) -> Self {
    Self::Parse { message: message.into() }
  }

  pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
    Self::RateLimited { message: message.into(), retry_after }
  }

  /// Whether the same request may succeed if sent again later
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::RateLimited { .. } | Self::Network { .. } | Self::Server { .. })
  }

  /// Upstream-suggested wait before retrying
  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      Self::RateLimited { retry_after, .. } => *retry_after,
      _ => None,
    }
  }
}

/// Failures of the knowledge store
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("agent '{slug}' not found")]
  AgentNotFound { slug: String },

  #[error("agent '{slug}' already exists")]
  DuplicateAgent { slug: String },

  #[error("section '{id}' not found")]
  SectionNotFound { id: String },

  #[error("entry '{id}' not found")]
  EntryNotFound { id: String },

  #[error("knowledge store lock poisoned")]
  Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures on the query path; never surfaced past the retrieval boundary
#[derive(Error, Debug)]
pub enum RetrievalError {
  #[error("embedding failed: {0}")]
  Embedding(#[from] EmbeddingError),

  #[error("store query failed: {0}")]
  Store(#[from] StoreError),

  #[error("query vector has {actual} dimensions but '{model}' vectors have {expected}")]
  DimensionMismatch { model: String, expected: usize, actual: usize },
}

/// Failures surfaced to the administrator during ingestion
#[derive(Error, Debug)]
pub enum IngestError {
  #[error("no readable text found in '{title}'")]
  NoReadableText { title: String },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Failures loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse config {path}: {source}")]
  Parse { path: PathBuf, source: serde_yaml::Error },

  #[error("invalid config: {message}")]
  Invalid { message: String },
}

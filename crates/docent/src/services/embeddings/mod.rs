//! Text embedding backends
//!
//! The `Embedder` trait is the seam between retrieval/ingestion and the
//! upstream model. Every vector an embedder returns has exactly the
//! configured dimension.

pub mod batch;
pub mod gemini;

pub use batch::{BatchEmbedder, BatchPolicy};
pub use gemini::GeminiEmbedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::EmbeddingError;
use crate::models::EmbeddingModel;

/// Which side of the retrieval pair a text is embedded for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
  RetrievalQuery,
  RetrievalDocument,
}

impl EmbeddingTask {
  pub fn as_api_str(&self) -> &'static str {
    match self {
      Self::RetrievalQuery => "RETRIEVAL_QUERY",
      Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
    }
  }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Model name and output dimension
  fn model(&self) -> &EmbeddingModel;

  async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError>;

  /// Embed many texts in one request; the output is in input order
  async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Build the configured embedder, or `None` when no API key is available
pub fn from_config(config: &Config) -> Result<Option<Arc<dyn Embedder>>, EmbeddingError> {
  let Some(api_key) = config.api_key() else {
    return Ok(None);
  };

  let embedder = GeminiEmbedder::new(&config.embedding, api_key)?;
  Ok(Some(Arc::new(embedder)))
}

/// Trim and cap an input, rejecting blank text
pub fn prepare_input(text: &str, max_chars: usize) -> Result<&str, EmbeddingError> {
  let text = text.trim();
  if text.is_empty() {
    return Err(EmbeddingError::EmptyInput);
  }

  match text.char_indices().nth(max_chars) {
    Some((byte_index, _)) => Ok(&text[..byte_index]),
    None => Ok(text),
  }
}

/// Reject vectors whose length differs from the model's dimension
pub fn validate_dimension(model: &EmbeddingModel, values: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
  if values.len() != model.dimension {
    return Err(EmbeddingError::DimensionMismatch { expected: model.dimension, actual: values.len() });
  }
  Ok(values)
}

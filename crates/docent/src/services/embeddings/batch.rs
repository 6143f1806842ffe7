//! Bulk embedding with bounded concurrency and retry
//!
//! Texts are split into fixed-size batches. At most `max_concurrency`
//! batches are in flight at once, and results are merged back in input
//! order. Retryable failures back off exponentially (or by the upstream
//! `retry_after` hint); a batch that still fails marks each of its texts
//! as failed without affecting other batches.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use super::{Embedder, EmbeddingTask};
use crate::config::IngestionConfig;
use crate::errors::EmbeddingError;
use crate::models::EmbeddingModel;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPolicy {
  pub batch_size: usize,
  pub max_concurrency: usize,
  /// Pause after each successful batch
  pub pause: Duration,
  pub max_retries: u32,
  pub initial_backoff: Duration,
  /// Longest single wait between attempts
  pub max_backoff: Duration,
}

impl Default for BatchPolicy {
  fn default() -> Self {
    Self::from(&IngestionConfig::default())
  }
}

impl From<&IngestionConfig> for BatchPolicy {
  fn from(config: &IngestionConfig) -> Self {
    Self {
      batch_size: config.batch_size,
      max_concurrency: config.max_concurrency,
      pause: Duration::from_millis(config.pause_ms),
      max_retries: config.max_retries,
      initial_backoff: Duration::from_millis(config.initial_backoff_ms),
      max_backoff: Duration::from_millis(config.max_backoff_ms),
    }
  }
}

pub struct BatchEmbedder {
  embedder: Arc<dyn Embedder>,
  policy: BatchPolicy,
}

impl BatchEmbedder {
  pub fn new(embedder: Arc<dyn Embedder>, policy: BatchPolicy) -> Self {
    Self { embedder, policy }
  }

  pub fn model(&self) -> &EmbeddingModel {
    self.embedder.model()
  }

  /// Embed every text, returning one result per text in input order
  pub async fn embed_all(&self, texts: &[String], task: EmbeddingTask) -> Vec<Result<Vec<f32>, EmbeddingError>> {
    if texts.is_empty() {
      return Vec::new();
    }

    let batch_size = self.policy.batch_size.max(1);
    let batch_count = texts.len().div_ceil(batch_size);

    let batches: Vec<(usize, Result<Vec<Vec<f32>>, EmbeddingError>)> = stream::iter(texts.chunks(batch_size).enumerate())
      .map(|(index, batch)| async move {
        bentley::verbose!(&format!("Embedding batch {}/{} ({} texts)", index + 1, batch_count, batch.len()));
        (batch.len(), self.embed_with_retry(batch, task).await)
      })
      .buffered(self.policy.max_concurrency.max(1))
      .collect()
      .await;

    let mut results = Vec::with_capacity(texts.len());
    for (len, outcome) in batches {
      match outcome {
        Ok(vectors) if vectors.len() == len => results.extend(vectors.into_iter().map(Ok)),
        Ok(vectors) => {
          let error = EmbeddingError::parse(format!("expected {len} embeddings, got {}", vectors.len()));
          results.extend(std::iter::repeat_n(Err(error), len));
        }
        Err(error) => results.extend(std::iter::repeat_n(Err(error), len)),
      }
    }
    results
  }

  /// Upstream hint if given, else the running backoff, never above `max_backoff`
  fn retry_wait(&self, error: &EmbeddingError, backoff: Duration) -> Duration {
    error.retry_after().unwrap_or(backoff).min(self.policy.max_backoff)
  }

  async fn embed_with_retry(&self, batch: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut attempt = 0;
    let mut backoff = self.policy.initial_backoff;

    loop {
      match self.embedder.embed_batch(batch, task).await {
        Ok(vectors) => {
          if !self.policy.pause.is_zero() {
            tokio::time::sleep(self.policy.pause).await;
          }
          return Ok(vectors);
        }
        Err(error) if error.is_retryable() && attempt < self.policy.max_retries => {
          let wait = self.retry_wait(&error, backoff);
          attempt += 1;
          tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, %error, "retrying embedding batch");
          tokio::time::sleep(wait).await;
          backoff = backoff.saturating_mul(2);
        }
        Err(error) => return Err(error),
      }
    }
  }
}

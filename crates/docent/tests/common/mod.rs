#![allow(dead_code)]

use async_trait::async_trait;
use docent::errors::EmbeddingError;
use docent::models::EmbeddingModel;
use docent::services::embeddings::{BatchPolicy, Embedder, EmbeddingTask};
use docent::services::store::{KnowledgeStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

/// Each dimension counts occurrences of one vocabulary word
pub const VOCABULARY: [&str; 8] = ["gdpr", "eu", "ccpa", "california", "refund", "shipping", "privacy", "tax"];

/// Deterministic bag-of-words embedder
pub struct KeywordEmbedder {
  model: EmbeddingModel,
}

impl KeywordEmbedder {
  pub fn new() -> Self {
    Self::named("keyword-v1")
  }

  pub fn named(name: &str) -> Self {
    Self { model: EmbeddingModel::new(name, VOCABULARY.len()) }
  }

  fn vectorize(text: &str) -> Vec<f32> {
    let words: Vec<String> =
      text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase).collect();
    VOCABULARY.iter().map(|term| words.iter().filter(|w| w.as_str() == *term).count() as f32).collect()
  }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
  fn model(&self) -> &EmbeddingModel {
    &self.model
  }

  async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError> {
    if text.trim().is_empty() {
      return Err(EmbeddingError::EmptyInput);
    }
    Ok(Self::vectorize(text))
  }

  async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|text| Self::vectorize(text)).collect())
  }
}

/// Embedder whose upstream is always down
pub struct UnreachableEmbedder {
  model: EmbeddingModel,
}

impl UnreachableEmbedder {
  pub fn new() -> Self {
    Self { model: EmbeddingModel::new("keyword-v1", VOCABULARY.len()) }
  }
}

#[async_trait]
impl Embedder for UnreachableEmbedder {
  fn model(&self) -> &EmbeddingModel {
    &self.model
  }

  async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError> {
    Err(EmbeddingError::network("connection refused"))
  }

  async fn embed_batch(&self, _texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Err(EmbeddingError::network("connection refused"))
  }
}

pub fn instant_policy() -> BatchPolicy {
  BatchPolicy { pause: Duration::ZERO, initial_backoff: Duration::ZERO, max_retries: 1, ..BatchPolicy::default() }
}

pub fn keyword_embedder() -> Option<Arc<dyn Embedder>> {
  Some(Arc::new(KeywordEmbedder::new()))
}

/// In-memory store with the given agents already created
pub async fn store_with_agents(slugs: &[&str]) -> Arc<dyn KnowledgeStore> {
  let store = SqliteStore::open_in_memory().unwrap();
  for slug in slugs {
    store.create_agent(slug, &format!("{slug} agent"), "").await.unwrap();
  }
  Arc::new(store)
}

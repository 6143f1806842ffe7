pub mod commands;
pub mod display;

use anyhow::{Context, Result};
use bentley::trace_log::TraceLog;
use std::sync::Arc;

use crate::config::Config;
use crate::services::embeddings::{self, BatchEmbedder, BatchPolicy, Embedder};
use crate::services::ingestion::Ingestor;
use crate::services::retrieval::{RetrievalSettings, Retriever};
use crate::services::store::{KnowledgeStore, SqliteStore};

/// Everything a command needs, opened once per invocation
pub struct App {
  pub config: Config,
  pub store: Arc<dyn KnowledgeStore>,
  pub embedder: Option<Arc<dyn Embedder>>,
  pub trace: TraceLog,
}

impl App {
  pub fn open(config: Config) -> Result<Self> {
    let store_path = config.store_path();
    let store = SqliteStore::open(&store_path)
      .with_context(|| format!("Failed to open knowledge store at {}", store_path.display()))?;

    let embedder = embeddings::from_config(&config)?;
    if embedder.is_none() {
      bentley::verbose!("GEMINI_API_KEY is not set; retrieval will return no context");
    }

    let trace = TraceLog::open(config.trace_log_path())
      .with_context(|| format!("Failed to open trace log at {}", config.trace_log_path().display()))?;

    Ok(Self { config, store: Arc::new(store), embedder, trace })
  }

  pub fn retriever(&self) -> Retriever {
    Retriever::new(self.store.clone(), self.embedder.clone(), RetrievalSettings::from(&self.config.retrieval))
      .with_trace(self.trace.clone())
  }

  pub fn ingestor(&self) -> Ingestor {
    Ingestor::new(
      self.store.clone(),
      self.embedder.clone(),
      BatchPolicy::from(&self.config.ingestion),
      self.config.ingestion.min_chunk_chars,
    )
  }

  pub fn batch_embedder(&self) -> Option<BatchEmbedder> {
    self.embedder.clone().map(|embedder| BatchEmbedder::new(embedder, BatchPolicy::from(&self.config.ingestion)))
  }
}

//! Query-time retrieval
//!
//! `Retriever::get_relevant_context` is the boundary the chat layer calls:
//! it never fails. Any embedding or store failure degrades to an empty
//! context so the completion can still proceed ungrounded.

use bentley::trace_log::{TraceContext, TraceLog};
use std::sync::Arc;
use std::time::Instant;

use crate::config::RetrievalConfig;
use crate::errors::{EmbeddingError, RetrievalError};
use crate::models::ScoredEntry;
use crate::services::embeddings::{Embedder, EmbeddingTask};
use crate::services::formatter::format_context;
use crate::services::matcher::VectorMatcher;
use crate::services::store::KnowledgeStore;

const QUERY_PREVIEW_CHARS: usize = 80;
const TRACE_COMPONENT: &str = "retrieval";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
  pub threshold: f32,
  pub limit: usize,
}

impl Default for RetrievalSettings {
  fn default() -> Self {
    Self::from(&RetrievalConfig::default())
  }
}

impl From<&RetrievalConfig> for RetrievalSettings {
  fn from(config: &RetrievalConfig) -> Self {
    Self { threshold: config.threshold, limit: config.limit }
  }
}

pub struct Retriever {
  store: Arc<dyn KnowledgeStore>,
  embedder: Option<Arc<dyn Embedder>>,
  settings: RetrievalSettings,
  trace: Option<TraceLog>,
}

impl Retriever {
  pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Option<Arc<dyn Embedder>>, settings: RetrievalSettings) -> Self {
    Self { store, embedder, settings, trace: None }
  }

  /// Record one trace entry per retrieval
  pub fn with_trace(mut self, trace: TraceLog) -> Self {
    self.trace = Some(trace);
    self
  }

  pub fn settings(&self) -> RetrievalSettings {
    self.settings
  }

  /// Ranked passages for `query` from the agent's knowledge
  ///
  /// `limit` defaults to the configured budget.
  pub async fn retrieve(
    &self,
    query: &str,
    agent_slug: &str,
    limit: Option<usize>,
  ) -> Result<Vec<ScoredEntry>, RetrievalError> {
    let embedder = self.embedder.as_ref().ok_or(EmbeddingError::NotConfigured)?;
    let limit = limit.unwrap_or(self.settings.limit);
    if limit == 0 {
      return Ok(Vec::new());
    }

    let query_embedding = embedder.embed(query, EmbeddingTask::RetrievalQuery).await?;
    let matcher = VectorMatcher::new(self.store.clone(), embedder.model().clone());
    matcher.find_matches(&query_embedding, agent_slug, self.settings.threshold, limit).await
  }

  /// Prompt-ready context for `query`, or an empty string
  ///
  /// Returns "" when no embedder is configured, the query is blank, nothing
  /// clears the threshold, or anything along the way fails.
  pub async fn get_relevant_context(&self, query: &str, agent_slug: &str, limit: Option<usize>) -> String {
    if self.embedder.is_none() {
      bentley::verbose!("No embedding backend configured; answering without knowledge context");
      return String::new();
    }
    if query.trim().is_empty() {
      return String::new();
    }

    let started = Instant::now();
    let outcome = self.retrieve(query, agent_slug, limit).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    let mut trace = TraceContext {
      agent: Some(agent_slug.to_string()),
      query_preview: Some(preview(query, QUERY_PREVIEW_CHARS)),
      duration_ms: Some(duration_ms),
      ..TraceContext::default()
    };

    match outcome {
      Ok(passages) => {
        let context = format_context(&passages);
        trace.matches = Some(passages.len());
        trace.context_chars = Some(context.chars().count());

        let message = format!(
          "agent={agent_slug} query=\"{}\" matches={} context_chars={}",
          preview(query, QUERY_PREVIEW_CHARS),
          passages.len(),
          context.chars().count()
        );
        bentley::debug!(&message);
        self.record("info", &message, trace).await;
        context
      }
      Err(error) => {
        let message = format!("Retrieval for agent '{agent_slug}' failed, continuing without context: {error}");
        bentley::warn!(&message);
        self.record("warn", &message, trace).await;
        String::new()
      }
    }
  }

  async fn record(&self, level: &str, message: &str, context: TraceContext) {
    if let Some(trace) = &self.trace {
      trace.log(level, message, TRACE_COMPONENT, Some(context)).await;
    }
  }
}

/// Leading `max_chars` characters of `text`, on one line
pub fn preview(text: &str, max_chars: usize) -> String {
  let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
  match single_line.char_indices().nth(max_chars) {
    Some((byte_index, _)) => single_line[..byte_index].to_string(),
    None => single_line,
  }
}

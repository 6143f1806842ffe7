//! Knowledge ingestion
//!
//! A document arrives as pre-split chunks and becomes one section. Chunks
//! that embed successfully are searchable immediately; chunks whose
//! embedding fails are stored as pending and can be repaired later.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{EmbeddingError, IngestError};
use crate::models::{KnowledgeEntry, NewEntry, StoredEmbedding};
use crate::services::embeddings::{BatchEmbedder, BatchPolicy, Embedder, EmbeddingTask};
use crate::services::store::KnowledgeStore;

pub const MANUAL_ENTRY_SOURCE: &str = "Manual Entry";

/// One pre-split chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInput {
  pub content: String,
  /// Overrides the generated `<title> (Chunk n)` label
  #[serde(default)]
  pub source: Option<String>,
}

impl ChunkInput {
  pub fn new(content: impl Into<String>) -> Self {
    Self { content: content.into(), source: None }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
  pub section_id: String,
  pub chunks_found: usize,
  pub entries_inserted: usize,
  /// Entries stored with a current embedding
  pub embedded: usize,
  /// Entries stored without an embedding
  pub pending: usize,
  /// Chunks dropped for being too short
  pub skipped: usize,
  pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct ManualEntryOutcome {
  pub entry: KnowledgeEntry,
  /// Set when the entry was stored as pending
  pub embedding_error: Option<EmbeddingError>,
}

pub struct Ingestor {
  store: Arc<dyn KnowledgeStore>,
  embedder: Option<Arc<dyn Embedder>>,
  batch: Option<BatchEmbedder>,
  min_chunk_chars: usize,
}

impl Ingestor {
  pub fn new(
    store: Arc<dyn KnowledgeStore>,
    embedder: Option<Arc<dyn Embedder>>,
    policy: BatchPolicy,
    min_chunk_chars: usize,
  ) -> Self {
    let batch = embedder.clone().map(|embedder| BatchEmbedder::new(embedder, policy));
    Self { store, embedder, batch, min_chunk_chars }
  }

  /// Store a chunked document as a new section of the agent
  pub async fn ingest_document(
    &self,
    agent_slug: &str,
    title: &str,
    chunks: &[ChunkInput],
  ) -> Result<IngestReport, IngestError> {
    if chunks.iter().all(|chunk| chunk.content.trim().is_empty()) {
      return Err(IngestError::NoReadableText { title: title.to_string() });
    }

    let section = self.store.create_section(agent_slug, title, None).await?;
    let mut report = IngestReport { section_id: section.id.clone(), chunks_found: chunks.len(), ..Default::default() };

    let kept: Vec<(usize, &ChunkInput)> = chunks
      .iter()
      .enumerate()
      .filter(|(_, chunk)| {
        let text = chunk.content.trim();
        !text.is_empty() && text.chars().count() >= self.min_chunk_chars
      })
      .collect();
    report.skipped = chunks.len() - kept.len();

    let texts: Vec<String> = kept.iter().map(|(_, chunk)| chunk.content.trim().to_string()).collect();
    let embeddings = match &self.batch {
      Some(batch) => batch.embed_all(&texts, EmbeddingTask::RetrievalDocument).await,
      None => vec![Err(EmbeddingError::NotConfigured); texts.len()],
    };

    for (((index, chunk), content), embedding) in kept.into_iter().zip(texts).zip(embeddings) {
      let label = format!("Chunk {}", index + 1);
      let embedding = match (embedding, &self.batch) {
        (Ok(values), Some(batch)) => Some(StoredEmbedding::new(batch.model(), values)),
        (Err(EmbeddingError::NotConfigured), _) | (Ok(_), None) => None,
        (Err(error), _) => {
          report.errors.push(format!("{label}: {error}"));
          None
        }
      };

      let embedded = embedding.is_some();
      let entry = NewEntry {
        section_id: section.id.clone(),
        content,
        source: chunk.source.clone().unwrap_or_else(|| format!("{title} ({label})")),
        embedding,
      };

      match self.store.insert_entry(entry).await {
        Ok(_) if embedded => {
          report.entries_inserted += 1;
          report.embedded += 1;
        }
        Ok(_) => {
          report.entries_inserted += 1;
          report.pending += 1;
        }
        Err(error) => report.errors.push(format!("{label}: {error}")),
      }
    }

    bentley::verbose!(&format!(
      "Ingested '{title}' for agent '{agent_slug}': {} of {} chunks stored, {} pending",
      report.entries_inserted, report.chunks_found, report.pending
    ));
    Ok(report)
  }

  /// Add a single hand-written entry to an existing section
  ///
  /// The source defaults to "Manual Entry". An embedding failure stores the
  /// entry as pending rather than rejecting it.
  pub async fn add_entry(
    &self,
    section_id: &str,
    content: &str,
    source: Option<&str>,
  ) -> Result<ManualEntryOutcome, IngestError> {
    let content = content.trim();
    if content.is_empty() {
      return Err(IngestError::NoReadableText { title: MANUAL_ENTRY_SOURCE.to_string() });
    }

    let (embedding, embedding_error) = match &self.embedder {
      Some(embedder) => match embedder.embed(content, EmbeddingTask::RetrievalDocument).await {
        Ok(values) => (Some(StoredEmbedding::new(embedder.model(), values)), None),
        Err(error) => (None, Some(error)),
      },
      None => (None, Some(EmbeddingError::NotConfigured)),
    };

    let source = source.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(MANUAL_ENTRY_SOURCE);
    let entry = self
      .store
      .insert_entry(NewEntry {
        section_id: section_id.to_string(),
        content: content.to_string(),
        source: source.to_string(),
        embedding,
      })
      .await?;

    Ok(ManualEntryOutcome { entry, embedding_error })
  }
}

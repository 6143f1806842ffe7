//! Knowledge base inspection and embedding repair

use serde::Serialize;

use crate::errors::{StoreError, StoreResult};
use crate::models::{EmbeddingModel, StoredEmbedding};
use crate::services::embeddings::{BatchEmbedder, EmbeddingTask};
use crate::services::retrieval::preview;
use crate::services::store::KnowledgeStore;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
  /// Embedded by the active model
  Current,
  /// Pending; never embedded or embedding failed
  Missing,
  /// Embedded by a different model or dimension
  Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStatus {
  pub id: String,
  pub section_title: String,
  pub source: String,
  pub preview: String,
  pub status: EmbeddingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeReport {
  pub agent_slug: String,
  pub total_entries: usize,
  pub with_embedding: usize,
  pub without_embedding: usize,
  pub stale: usize,
  pub entries: Vec<EntryStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
  pub fixed: usize,
  pub total: usize,
  pub errors: Vec<String>,
}

fn status_of(embedding: Option<&StoredEmbedding>, model: Option<&EmbeddingModel>) -> EmbeddingStatus {
  match (embedding, model) {
    (None, _) => EmbeddingStatus::Missing,
    (Some(_), None) => EmbeddingStatus::Current,
    (Some(stored), Some(model)) if stored.is_current(model) => EmbeddingStatus::Current,
    (Some(_), Some(_)) => EmbeddingStatus::Stale,
  }
}

async fn require_agent(store: &dyn KnowledgeStore, agent_slug: &str) -> StoreResult<()> {
  match store.agent(agent_slug).await? {
    Some(_) => Ok(()),
    None => Err(StoreError::AgentNotFound { slug: agent_slug.to_string() }),
  }
}

/// Whitespace-collapsed preview, marked with "..." when the collapsed text was cut
fn entry_preview(content: &str) -> String {
  let text = preview(content, PREVIEW_CHARS + 1);
  if text.chars().count() > PREVIEW_CHARS {
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
  } else {
    text
  }
}

/// Embedding health of every entry an agent owns
///
/// Without an active `model`, any stored embedding counts as current.
pub async fn inspect(
  store: &dyn KnowledgeStore,
  agent_slug: &str,
  model: Option<&EmbeddingModel>,
) -> StoreResult<KnowledgeReport> {
  require_agent(store, agent_slug).await?;
  let entries = store.entries_for_agent(agent_slug).await?;

  let statuses: Vec<EntryStatus> = entries
    .into_iter()
    .map(|item| {
      let text = entry_preview(&item.entry.content);
      EntryStatus {
        status: status_of(item.entry.embedding.as_ref(), model),
        id: item.entry.id,
        section_title: item.section_title,
        source: item.entry.source,
        preview: text,
      }
    })
    .collect();

  let count = |status: EmbeddingStatus| statuses.iter().filter(|s| s.status == status).count();
  let (with_embedding, without_embedding, stale) =
    (count(EmbeddingStatus::Current), count(EmbeddingStatus::Missing), count(EmbeddingStatus::Stale));

  Ok(KnowledgeReport {
    agent_slug: agent_slug.to_string(),
    total_entries: statuses.len(),
    with_embedding,
    without_embedding,
    stale,
    entries: statuses,
  })
}

/// Embed the agent's pending entries, and stale ones when `include_stale`
pub async fn reembed(
  store: &dyn KnowledgeStore,
  batch: &BatchEmbedder,
  agent_slug: &str,
  include_stale: bool,
) -> StoreResult<RepairReport> {
  require_agent(store, agent_slug).await?;
  let model = batch.model().clone();

  let targets: Vec<(String, String)> = store
    .entries_for_agent(agent_slug)
    .await?
    .into_iter()
    .filter(|item| match status_of(item.entry.embedding.as_ref(), Some(&model)) {
      EmbeddingStatus::Missing => true,
      EmbeddingStatus::Stale => include_stale,
      EmbeddingStatus::Current => false,
    })
    .map(|item| (item.entry.id, item.entry.content))
    .collect();

  let mut report = RepairReport { total: targets.len(), ..Default::default() };
  if targets.is_empty() {
    return Ok(report);
  }

  let texts: Vec<String> = targets.iter().map(|(_, content)| content.clone()).collect();
  let results = batch.embed_all(&texts, EmbeddingTask::RetrievalDocument).await;

  for ((entry_id, _), result) in targets.iter().zip(results) {
    let outcome = match result {
      Ok(values) => store.set_embedding(entry_id, &StoredEmbedding::new(&model, values)).await.map_err(|e| e.to_string()),
      Err(error) => Err(error.to_string()),
    };

    match outcome {
      Ok(()) => report.fixed += 1,
      Err(message) => report.errors.push(format!("Entry {entry_id}: {message}")),
    }
  }

  bentley::verbose!(&format!(
    "Re-embedded {} of {} entries for agent '{agent_slug}'",
    report.fixed, report.total
  ));
  Ok(report)
}

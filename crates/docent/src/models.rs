use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the vector space an embedding lives in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
  pub name: String,
  pub dimension: usize,
}

impl EmbeddingModel {
  pub fn new(name: impl Into<String>, dimension: usize) -> Self {
    Self { name: name.into(), dimension }
  }
}

/// A persona owning a disjoint set of knowledge sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
  pub id: String,
  pub slug: String,
  pub name: String,
  pub instruction: String,
  pub created_at: DateTime<Utc>,
}

/// A named group of entries, typically one per ingested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSection {
  pub id: String,
  pub agent_id: String,
  pub title: String,
  pub description: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionSummary {
  pub section: KnowledgeSection,
  pub entry_count: usize,
}

/// An embedding vector stamped with the model that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
  pub model: String,
  pub dimension: usize,
  pub values: Vec<f32>,
  pub embedded_at: DateTime<Utc>,
}

impl StoredEmbedding {
  pub fn new(model: &EmbeddingModel, values: Vec<f32>) -> Self {
    Self {
      model: model.name.clone(),
      dimension: model.dimension,
      values,
      embedded_at: Utc::now(),
    }
  }

  /// True when this vector is comparable with vectors from `model`
  pub fn is_current(&self, model: &EmbeddingModel) -> bool {
    self.model == model.name && self.dimension == model.dimension && self.values.len() == model.dimension
  }
}

/// A single retrievable passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
  pub id: String,
  pub section_id: String,
  pub content: String,
  pub source: String,
  /// Absent while the entry is pending embedding
  pub embedding: Option<StoredEmbedding>,
  pub created_at: DateTime<Utc>,
}

/// Entry fields supplied by callers; ids and timestamps are assigned by the store
#[derive(Debug, Clone)]
pub struct NewEntry {
  pub section_id: String,
  pub content: String,
  pub source: String,
  pub embedding: Option<StoredEmbedding>,
}

/// An entry together with the title of the section it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEntry {
  pub entry: KnowledgeEntry,
  pub section_title: String,
}

/// A candidate entry and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
  pub entry: KnowledgeEntry,
  pub similarity: f32,
}

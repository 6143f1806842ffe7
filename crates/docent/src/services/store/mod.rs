//! Knowledge store abstraction
//!
//! Agents own sections, sections own entries. Deleting a section removes its
//! entries. Similarity search only ever sees entries reachable from the named
//! agent whose embedding was produced by the active model.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::errors::StoreResult;
use crate::models::{
  Agent, AgentEntry, EmbeddingModel, KnowledgeEntry, KnowledgeSection, NewEntry, ScoredEntry, SectionSummary,
  StoredEmbedding,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
  /// Create an agent; slugs are unique
  async fn create_agent(&self, slug: &str, name: &str, instruction: &str) -> StoreResult<Agent>;

  async fn agent(&self, slug: &str) -> StoreResult<Option<Agent>>;

  /// Delete an agent with all of its sections and entries, returning the entry count removed
  async fn delete_agent(&self, slug: &str) -> StoreResult<usize>;

  /// Create a section owned by the agent with `agent_slug`
  async fn create_section(
    &self,
    agent_slug: &str,
    title: &str,
    description: Option<String>,
  ) -> StoreResult<KnowledgeSection>;

  /// Sections of an agent with their entry counts, oldest first
  async fn sections(&self, agent_slug: &str) -> StoreResult<Vec<SectionSummary>>;

  /// Delete a section and its entries, returning how many entries went with it
  async fn delete_section(&self, section_id: &str) -> StoreResult<usize>;

  async fn insert_entry(&self, entry: NewEntry) -> StoreResult<KnowledgeEntry>;

  async fn delete_entry(&self, entry_id: &str) -> StoreResult<()>;

  /// Every entry reachable from the agent, embedded or not
  async fn entries_for_agent(&self, agent_slug: &str) -> StoreResult<Vec<AgentEntry>>;

  /// Replace an entry's embedding
  async fn set_embedding(&self, entry_id: &str, embedding: &StoredEmbedding) -> StoreResult<()>;

  /// Rank the agent's current-model entries against `query_embedding`
  ///
  /// Only entries scoring at least `threshold` are returned, best first,
  /// at most `limit` of them.
  async fn search_similar(
    &self,
    query_embedding: &[f32],
    agent_slug: &str,
    model: &EmbeddingModel,
    threshold: f32,
    limit: usize,
  ) -> StoreResult<Vec<ScoredEntry>>;
}

//! SQLite knowledge store
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the model name
//! and dimension that produced them. A NULL embedding marks a pending entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use super::KnowledgeStore;
use crate::errors::{StoreError, StoreResult};
use crate::models::{
  Agent, AgentEntry, EmbeddingModel, KnowledgeEntry, KnowledgeSection, NewEntry, ScoredEntry, SectionSummary,
  StoredEmbedding,
};
use crate::services::matcher::rank;
use crate::services::similarity::{bytes_to_embedding, embedding_to_bytes};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
  id TEXT PRIMARY KEY,
  slug TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  instruction TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kb_sections (
  id TEXT PRIMARY KEY,
  agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
  title TEXT NOT NULL,
  description TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kb_entries (
  id TEXT PRIMARY KEY,
  section_id TEXT NOT NULL REFERENCES kb_sections(id) ON DELETE CASCADE,
  content TEXT NOT NULL,
  source TEXT NOT NULL,
  embedding BLOB,
  embedding_model TEXT,
  embedding_dimension INTEGER,
  embedded_at TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kb_sections_agent ON kb_sections(agent_id);
CREATE INDEX IF NOT EXISTS idx_kb_entries_section ON kb_entries(section_id);
";

const ENTRY_COLUMNS: &str = "e.id, e.section_id, e.content, e.source, e.embedding, e.embedding_model, \
                             e.embedding_dimension, e.embedded_at, e.created_at";

pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) a store file, creating parent directories as needed
  pub fn open(path: &Path) -> StoreResult<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    Self::initialize(Connection::open(path)?)
  }

  pub fn open_in_memory() -> StoreResult<Self> {
    Self::initialize(Connection::open_in_memory()?)
  }

  fn initialize(conn: Connection) -> StoreResult<Self> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn: Mutex::new(conn) })
  }

  fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    f(&conn)
  }
}

fn agent_from_row(row: &Row) -> rusqlite::Result<Agent> {
  Ok(Agent {
    id: row.get(0)?,
    slug: row.get(1)?,
    name: row.get(2)?,
    instruction: row.get(3)?,
    created_at: row.get(4)?,
  })
}

fn section_from_row(row: &Row) -> rusqlite::Result<KnowledgeSection> {
  Ok(KnowledgeSection {
    id: row.get(0)?,
    agent_id: row.get(1)?,
    title: row.get(2)?,
    description: row.get(3)?,
    created_at: row.get(4)?,
  })
}

/// Map a row selected with `ENTRY_COLUMNS`
fn entry_from_row(row: &Row) -> rusqlite::Result<KnowledgeEntry> {
  let blob: Option<Vec<u8>> = row.get(4)?;
  let model: Option<String> = row.get(5)?;
  let dimension: Option<i64> = row.get(6)?;
  let embedded_at: Option<DateTime<Utc>> = row.get(7)?;

  Ok(KnowledgeEntry {
    id: row.get(0)?,
    section_id: row.get(1)?,
    content: row.get(2)?,
    source: row.get(3)?,
    embedding: decode_embedding(blob, model, dimension, embedded_at),
    created_at: row.get(8)?,
  })
}

/// A half-written or corrupt stamp reads back as pending
fn decode_embedding(
  blob: Option<Vec<u8>>,
  model: Option<String>,
  dimension: Option<i64>,
  embedded_at: Option<DateTime<Utc>>,
) -> Option<StoredEmbedding> {
  let values = bytes_to_embedding(&blob?)?;
  let dimension = usize::try_from(dimension?).ok()?;
  if values.len() != dimension {
    return None;
  }

  Some(StoredEmbedding { model: model?, dimension, values, embedded_at: embedded_at? })
}

fn agent_id(conn: &Connection, slug: &str) -> StoreResult<String> {
  conn
    .query_row("SELECT id FROM agents WHERE slug = ?1", params![slug], |row| row.get(0))
    .optional()?
    .ok_or_else(|| StoreError::AgentNotFound { slug: slug.to_string() })
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
  async fn create_agent(&self, slug: &str, name: &str, instruction: &str) -> StoreResult<Agent> {
    self.with_conn(|conn| {
      let exists: bool =
        conn.query_row("SELECT EXISTS(SELECT 1 FROM agents WHERE slug = ?1)", params![slug], |row| row.get(0))?;
      if exists {
        return Err(StoreError::DuplicateAgent { slug: slug.to_string() });
      }

      let agent = Agent {
        id: Uuid::new_v4().to_string(),
        slug: slug.to_string(),
        name: name.to_string(),
        instruction: instruction.to_string(),
        created_at: Utc::now(),
      };
      conn.execute(
        "INSERT INTO agents (id, slug, name, instruction, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![agent.id, agent.slug, agent.name, agent.instruction, agent.created_at],
      )?;
      Ok(agent)
    })
  }

  async fn agent(&self, slug: &str) -> StoreResult<Option<Agent>> {
    self.with_conn(|conn| {
      let agent = conn
        .query_row(
          "SELECT id, slug, name, instruction, created_at FROM agents WHERE slug = ?1",
          params![slug],
          agent_from_row,
        )
        .optional()?;
      Ok(agent)
    })
  }

  async fn delete_agent(&self, slug: &str) -> StoreResult<usize> {
    self.with_conn(|conn| {
      let agent_id = agent_id(conn, slug)?;
      let entry_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM kb_entries e JOIN kb_sections s ON e.section_id = s.id WHERE s.agent_id = ?1",
        params![agent_id],
        |row| row.get(0),
      )?;

      conn.execute("DELETE FROM agents WHERE id = ?1", params![agent_id])?;
      Ok(entry_count as usize)
    })
  }

  async fn create_section(
    &self,
    agent_slug: &str,
    title: &str,
    description: Option<String>,
  ) -> StoreResult<KnowledgeSection> {
    self.with_conn(|conn| {
      let section = KnowledgeSection {
        id: Uuid::new_v4().to_string(),
        agent_id: agent_id(conn, agent_slug)?,
        title: title.to_string(),
        description,
        created_at: Utc::now(),
      };
      conn.execute(
        "INSERT INTO kb_sections (id, agent_id, title, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![section.id, section.agent_id, section.title, section.description, section.created_at],
      )?;
      Ok(section)
    })
  }

  async fn sections(&self, agent_slug: &str) -> StoreResult<Vec<SectionSummary>> {
    self.with_conn(|conn| {
      let agent_id = agent_id(conn, agent_slug)?;
      let mut stmt = conn.prepare(
        "SELECT s.id, s.agent_id, s.title, s.description, s.created_at, COUNT(e.id)
         FROM kb_sections s
         LEFT JOIN kb_entries e ON e.section_id = s.id
         WHERE s.agent_id = ?1
         GROUP BY s.id
         ORDER BY s.created_at ASC, s.rowid ASC",
      )?;

      let summaries = stmt
        .query_map(params![agent_id], |row| {
          let entry_count: i64 = row.get(5)?;
          Ok(SectionSummary { section: section_from_row(row)?, entry_count: entry_count as usize })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(summaries)
    })
  }

  async fn delete_section(&self, section_id: &str) -> StoreResult<usize> {
    self.with_conn(|conn| {
      let entry_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM kb_entries WHERE section_id = ?1", params![section_id], |row| row.get(0))?;

      let deleted = conn.execute("DELETE FROM kb_sections WHERE id = ?1", params![section_id])?;
      if deleted == 0 {
        return Err(StoreError::SectionNotFound { id: section_id.to_string() });
      }
      Ok(entry_count as usize)
    })
  }

  async fn insert_entry(&self, entry: NewEntry) -> StoreResult<KnowledgeEntry> {
    self.with_conn(|conn| {
      let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM kb_sections WHERE id = ?1)",
        params![entry.section_id],
        |row| row.get(0),
      )?;
      if !exists {
        return Err(StoreError::SectionNotFound { id: entry.section_id });
      }

      let stored = KnowledgeEntry {
        id: Uuid::new_v4().to_string(),
        section_id: entry.section_id,
        content: entry.content,
        source: entry.source,
        embedding: entry.embedding,
        created_at: Utc::now(),
      };
      let embedding = stored.embedding.as_ref();

      conn.execute(
        "INSERT INTO kb_entries (id, section_id, content, source, embedding, embedding_model,
                                 embedding_dimension, embedded_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
          stored.id,
          stored.section_id,
          stored.content,
          stored.source,
          embedding.map(|e| embedding_to_bytes(&e.values)),
          embedding.map(|e| e.model.clone()),
          embedding.map(|e| e.dimension as i64),
          embedding.map(|e| e.embedded_at),
          stored.created_at,
        ],
      )?;
      Ok(stored)
    })
  }

  async fn delete_entry(&self, entry_id: &str) -> StoreResult<()> {
    self.with_conn(|conn| {
      let deleted = conn.execute("DELETE FROM kb_entries WHERE id = ?1", params![entry_id])?;
      if deleted == 0 {
        return Err(StoreError::EntryNotFound { id: entry_id.to_string() });
      }
      Ok(())
    })
  }

  async fn entries_for_agent(&self, agent_slug: &str) -> StoreResult<Vec<AgentEntry>> {
    self.with_conn(|conn| {
      let agent_id = agent_id(conn, agent_slug)?;
      let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS}, s.title
         FROM kb_entries e
         JOIN kb_sections s ON e.section_id = s.id
         WHERE s.agent_id = ?1
         ORDER BY s.created_at ASC, s.rowid ASC, e.rowid ASC"
      ))?;

      let entries = stmt
        .query_map(params![agent_id], |row| Ok(AgentEntry { entry: entry_from_row(row)?, section_title: row.get(9)? }))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(entries)
    })
  }

  async fn set_embedding(&self, entry_id: &str, embedding: &StoredEmbedding) -> StoreResult<()> {
    self.with_conn(|conn| {
      let updated = conn.execute(
        "UPDATE kb_entries
         SET embedding = ?2, embedding_model = ?3, embedding_dimension = ?4, embedded_at = ?5
         WHERE id = ?1",
        params![
          entry_id,
          embedding_to_bytes(&embedding.values),
          embedding.model,
          embedding.dimension as i64,
          embedding.embedded_at,
        ],
      )?;
      if updated == 0 {
        return Err(StoreError::EntryNotFound { id: entry_id.to_string() });
      }
      Ok(())
    })
  }

  async fn search_similar(
    &self,
    query_embedding: &[f32],
    agent_slug: &str,
    model: &EmbeddingModel,
    threshold: f32,
    limit: usize,
  ) -> StoreResult<Vec<ScoredEntry>> {
    let candidates = self.with_conn(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS}
         FROM kb_entries e
         JOIN kb_sections s ON e.section_id = s.id
         JOIN agents a ON s.agent_id = a.id
         WHERE a.slug = ?1
           AND e.embedding IS NOT NULL
           AND e.embedding_model = ?2
           AND e.embedding_dimension = ?3"
      ))?;

      let entries = stmt
        .query_map(params![agent_slug, model.name, model.dimension as i64], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(entries)
    })?;

    Ok(rank(query_embedding, candidates, threshold, limit))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn model() -> EmbeddingModel {
    EmbeddingModel::new("test-model", 2)
  }

  fn new_entry(section_id: &str, content: &str, values: Option<Vec<f32>>) -> NewEntry {
    NewEntry {
      section_id: section_id.to_string(),
      content: content.to_string(),
      source: format!("{content} source"),
      embedding: values.map(|v| StoredEmbedding::new(&model(), v)),
    }
  }

  async fn store_with_agent(slug: &str) -> (SqliteStore, KnowledgeSection) {
    let store = SqliteStore::open_in_memory().unwrap();
    store.create_agent(slug, "Privacy Counsel", "Answer privacy questions").await.unwrap();
    let section = store.create_section(slug, "GDPR", None).await.unwrap();
    (store, section)
  }

  #[tokio::test]
  async fn test_agent_round_trip_and_duplicates() {
    let store = SqliteStore::open_in_memory().unwrap();
    let created = store.create_agent("privacy", "Privacy Counsel", "Be precise").await.unwrap();

    let loaded = store.agent("privacy").await.unwrap().unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.instruction, "Be precise");
    assert!(store.agent("missing").await.unwrap().is_none());

    let duplicate = store.create_agent("privacy", "Other", "").await;
    assert!(matches!(duplicate, Err(StoreError::DuplicateAgent { .. })));
  }

  #[tokio::test]
  async fn test_section_requires_existing_agent() {
    let store = SqliteStore::open_in_memory().unwrap();
    let result = store.create_section("ghost", "Title", None).await;
    assert!(matches!(result, Err(StoreError::AgentNotFound { slug }) if slug == "ghost"));
  }

  #[tokio::test]
  async fn test_entry_requires_existing_section() {
    let store = SqliteStore::open_in_memory().unwrap();
    let result = store.insert_entry(new_entry("nope", "orphan", None)).await;
    assert!(matches!(result, Err(StoreError::SectionNotFound { .. })));
  }

  #[tokio::test]
  async fn test_embedding_round_trips_with_stamp() {
    let (store, section) = store_with_agent("privacy").await;
    store.insert_entry(new_entry(&section.id, "embedded", Some(vec![0.5, -0.25]))).await.unwrap();
    store.insert_entry(new_entry(&section.id, "pending", None)).await.unwrap();

    let entries = store.entries_for_agent("privacy").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].section_title, "GDPR");

    let embedding = entries[0].entry.embedding.as_ref().unwrap();
    assert_eq!(embedding.values, vec![0.5, -0.25]);
    assert!(embedding.is_current(&model()));
    assert!(entries[1].entry.embedding.is_none());
  }

  #[tokio::test]
  async fn test_delete_section_cascades_to_entries() {
    let (store, section) = store_with_agent("privacy").await;
    store.insert_entry(new_entry(&section.id, "one", Some(vec![1.0, 0.0]))).await.unwrap();
    store.insert_entry(new_entry(&section.id, "two", None)).await.unwrap();

    assert_eq!(store.delete_section(&section.id).await.unwrap(), 2);
    assert!(store.entries_for_agent("privacy").await.unwrap().is_empty());
    assert!(store.sections("privacy").await.unwrap().is_empty());

    let again = store.delete_section(&section.id).await;
    assert!(matches!(again, Err(StoreError::SectionNotFound { .. })));
  }

  #[tokio::test]
  async fn test_delete_agent_cascades_to_sections_and_entries() {
    let (store, section) = store_with_agent("privacy").await;
    store.insert_entry(new_entry(&section.id, "one", Some(vec![1.0, 0.0]))).await.unwrap();
    store.create_agent("tax", "Tax", "").await.unwrap();
    let tax_section = store.create_section("tax", "Filing", None).await.unwrap();
    store.insert_entry(new_entry(&tax_section.id, "kept", None)).await.unwrap();

    assert_eq!(store.delete_agent("privacy").await.unwrap(), 1);
    assert!(store.agent("privacy").await.unwrap().is_none());
    assert!(matches!(store.delete_section(&section.id).await, Err(StoreError::SectionNotFound { .. })));
    assert_eq!(store.entries_for_agent("tax").await.unwrap().len(), 1);

    let again = store.delete_agent("privacy").await;
    assert!(matches!(again, Err(StoreError::AgentNotFound { .. })));
  }

  #[tokio::test]
  async fn test_sections_report_entry_counts() {
    let (store, section) = store_with_agent("privacy").await;
    store.create_section("privacy", "Empty", Some("nothing yet".to_string())).await.unwrap();
    store.insert_entry(new_entry(&section.id, "one", None)).await.unwrap();

    let sections = store.sections("privacy").await.unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].section.title, "GDPR");
    assert_eq!(sections[0].entry_count, 1);
    assert_eq!(sections[1].entry_count, 0);
    assert_eq!(sections[1].section.description.as_deref(), Some("nothing yet"));
  }

  #[tokio::test]
  async fn test_search_is_scoped_to_agent() {
    let (store, privacy) = store_with_agent("privacy").await;
    store.create_agent("tax", "Tax Advisor", "").await.unwrap();
    let tax = store.create_section("tax", "VAT", None).await.unwrap();

    store.insert_entry(new_entry(&privacy.id, "privacy fact", Some(vec![1.0, 0.0]))).await.unwrap();
    store.insert_entry(new_entry(&tax.id, "tax fact", Some(vec![1.0, 0.0]))).await.unwrap();

    let results = store.search_similar(&[1.0, 0.0], "tax", &model(), 0.1, 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entry.content, "tax fact");
  }

  #[tokio::test]
  async fn test_search_excludes_pending_and_other_models() {
    let (store, section) = store_with_agent("privacy").await;
    store.insert_entry(new_entry(&section.id, "pending", None)).await.unwrap();

    let mut stale = new_entry(&section.id, "stale", None);
    stale.embedding = Some(StoredEmbedding::new(&EmbeddingModel::new("old-model", 2), vec![1.0, 0.0]));
    store.insert_entry(stale).await.unwrap();

    store.insert_entry(new_entry(&section.id, "current", Some(vec![0.8, 0.2]))).await.unwrap();

    let results = store.search_similar(&[1.0, 0.0], "privacy", &model(), 0.1, 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entry.content, "current");
  }

  #[tokio::test]
  async fn test_set_embedding_makes_entry_searchable() {
    let (store, section) = store_with_agent("privacy").await;
    let entry = store.insert_entry(new_entry(&section.id, "later", None)).await.unwrap();
    assert!(store.search_similar(&[1.0, 0.0], "privacy", &model(), 0.1, 5).await.unwrap().is_empty());

    store.set_embedding(&entry.id, &StoredEmbedding::new(&model(), vec![1.0, 0.0])).await.unwrap();
    let results = store.search_similar(&[1.0, 0.0], "privacy", &model(), 0.1, 5).await.unwrap();
    assert_eq!(results.len(), 1);

    let missing = store.set_embedding("nope", &StoredEmbedding::new(&model(), vec![1.0, 0.0])).await;
    assert!(matches!(missing, Err(StoreError::EntryNotFound { .. })));
  }

  #[tokio::test]
  async fn test_delete_entry() {
    let (store, section) = store_with_agent("privacy").await;
    let entry = store.insert_entry(new_entry(&section.id, "gone", None)).await.unwrap();

    store.delete_entry(&entry.id).await.unwrap();
    assert!(store.entries_for_agent("privacy").await.unwrap().is_empty());
    assert!(matches!(store.delete_entry(&entry.id).await, Err(StoreError::EntryNotFound { .. })));
  }

  #[tokio::test]
  async fn test_open_creates_file_and_persists() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("knowledge.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.create_agent("privacy", "Privacy Counsel", "").await.unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    assert!(reopened.agent("privacy").await.unwrap().is_some());
  }
}

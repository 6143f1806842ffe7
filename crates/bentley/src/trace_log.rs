//! Retrieval trace storage for bentley
//!
//! Persistent, structured logging of retrieval events:
//! - JSONL disk storage, one entry per line, append-only
//! - Thread-safe async operations with internal locking
//! - Level filtering and newest-N queries for the `logs` command

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Types and Data Structures
// =========================

/// Retrieval details attached to a trace entry
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TraceContext {
  /// Agent slug the retrieval was scoped to
  #[serde(skip_serializing_if = "Option::is_none")]
  pub agent: Option<String>,

  /// Leading characters of the query
  #[serde(skip_serializing_if = "Option::is_none")]
  pub query_preview: Option<String>,

  /// Number of passages that cleared the threshold
  #[serde(skip_serializing_if = "Option::is_none")]
  pub matches: Option<usize>,

  /// Length of the formatted context in characters
  #[serde(skip_serializing_if = "Option::is_none")]
  pub context_chars: Option<usize>,

  /// Wall time of the retrieval in milliseconds
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<f64>,
}

/// A structured trace entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TraceEntry {
  pub timestamp: DateTime<Utc>,
  pub level: String,
  pub message: String,
  pub component: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub context: Option<TraceContext>,
}

struct TraceLogInner {
  path: PathBuf,
}

/// Thread-safe disk-based trace storage using JSONL format
#[derive(Clone)]
pub struct TraceLog {
  inner: Arc<tokio::sync::Mutex<TraceLogInner>>,
}

impl TraceLogInner {
  fn new(path: &Path) -> std::io::Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    // Create the file without truncating an existing one
    if !path.exists() {
      File::create(path)?;
    }

    Ok(Self { path: path.to_path_buf() })
  }

  fn append(&self, entry: &TraceEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{line}")?;
    file.flush()
  }

  fn read(&self, limit: Option<usize>, level: Option<&str>) -> std::io::Result<Vec<TraceEntry>> {
    if !self.path.exists() {
      return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&self.path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }

      // Skip malformed lines
      let Ok(entry) = serde_json::from_str::<TraceEntry>(&line) else {
        continue;
      };

      if level.is_none_or(|filter| filter == "all" || entry.level == filter) {
        entries.push(entry);
      }
    }

    // File order is chronological; keep the newest N
    if let Some(limit) = limit {
      let excess = entries.len().saturating_sub(limit);
      entries.drain(..excess);
    }

    Ok(entries)
  }
}

// Core API
// ========

impl TraceLog {
  /// Open (or create) a trace log at `path`, creating parent directories
  pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
    let inner = TraceLogInner::new(path.as_ref())?;
    Ok(Self { inner: Arc::new(tokio::sync::Mutex::new(inner)) })
  }

  /// Append an entry, returning any I/O failure
  pub async fn record(
    &self,
    level: &str,
    message: &str,
    component: &str,
    context: Option<TraceContext>,
  ) -> std::io::Result<()> {
    let entry = TraceEntry {
      timestamp: Utc::now(),
      level: level.to_string(),
      message: message.to_string(),
      component: component.to_string(),
      context,
    };

    let guard = self.inner.lock().await;
    guard.append(&entry)
  }

  /// Append an entry; I/O failures are reported through `tracing` and otherwise dropped
  pub async fn log(&self, level: &str, message: &str, component: &str, context: Option<TraceContext>) {
    if let Err(error) = self.record(level, message, component, context).await {
      tracing::warn!(%error, component, "failed to write trace entry");
    }
  }

  pub async fn info(&self, message: &str, component: &str, context: Option<TraceContext>) {
    self.log("info", message, component, context).await;
  }

  pub async fn warn(&self, message: &str, component: &str, context: Option<TraceContext>) {
    self.log("warn", message, component, context).await;
  }

  pub async fn error(&self, message: &str, component: &str, context: Option<TraceContext>) {
    self.log("error", message, component, context).await;
  }

  /// Read entries, newest `limit` in chronological order, filtered by level ("all" disables)
  pub async fn entries(&self, limit: Option<usize>, level: Option<&str>) -> std::io::Result<Vec<TraceEntry>> {
    let guard = self.inner.lock().await;
    guard.read(limit, level)
  }

  pub async fn path(&self) -> PathBuf {
    self.inner.lock().await.path.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn open_in(dir: &TempDir) -> TraceLog {
    TraceLog::open(dir.path().join("nested").join("trace.jsonl")).unwrap()
  }

  #[tokio::test]
  async fn test_open_creates_parent_directories_and_file() {
    let dir = TempDir::new().unwrap();
    let log = open_in(&dir);

    assert!(log.path().await.exists());
    assert!(log.entries(None, None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_write_failure_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let log = open_in(&dir);
    std::fs::remove_dir_all(dir.path().join("nested")).unwrap();

    assert!(log.record("info", "lost", "retrieval", None).await.is_err());
    log.info("also lost", "retrieval", None).await;
    assert!(log.entries(None, None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_entries_round_trip_with_context() {
    let dir = TempDir::new().unwrap();
    let log = open_in(&dir);

    let context = TraceContext {
      agent: Some("privacy".to_string()),
      query_preview: Some("Does GDPR cover".to_string()),
      matches: Some(2),
      context_chars: Some(120),
      duration_ms: Some(4.5),
    };
    log.info("retrieved context", "retrieval", Some(context.clone())).await;

    let entries = log.entries(None, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].component, "retrieval");
    assert_eq!(entries[0].context.as_ref(), Some(&context));
  }

  #[tokio::test]
  async fn test_level_filter_and_limit() {
    let dir = TempDir::new().unwrap();
    let log = open_in(&dir);

    log.info("first", "retrieval", None).await;
    log.warn("second", "retrieval", None).await;
    log.error("third", "retrieval", None).await;
    log.warn("fourth", "retrieval", None).await;

    let warnings = log.entries(None, Some("warn")).await.unwrap();
    assert_eq!(warnings.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(), vec!["second", "fourth"]);

    let all = log.entries(Some(2), Some("all")).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].message, "fourth");
  }

  #[tokio::test]
  async fn test_malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let log = open_in(&dir);
    log.info("valid", "retrieval", None).await;

    let path = log.path().await;
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "{{not json").unwrap();
    writeln!(file).unwrap();

    let entries = log.entries(None, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "valid");
  }
}

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use std::path::Path;

use crate::cli::display::{
  display_ingest_report, display_knowledge_report, display_match, display_repair_report, display_sections,
  display_trace_entry,
};
use crate::cli::App;
use crate::services::ingestion::ChunkInput;
use crate::services::maintenance;

async fn ensure_agent(app: &App, slug: &str) -> Result<()> {
  if app.store.agent(slug).await?.is_none() {
    bail!("Agent '{slug}' not found. Create it with `docent agent add {slug} <name>`");
  }
  Ok(())
}

/// Print the grounding context for a question
///
/// With `explain`, prints each ranked passage and its score instead, and
/// surfaces failures rather than degrading to empty.
pub async fn context(app: &App, agent: &str, query: &[String], limit: Option<usize>, explain: bool) -> Result<()> {
  ensure_agent(app, agent).await?;
  let query = query.join(" ");
  let retriever = app.retriever();

  if explain {
    let matches = retriever.retrieve(&query, agent, limit).await?;
    if matches.is_empty() {
      println!("No passages cleared the similarity threshold ({}).", retriever.settings().threshold);
      return Ok(());
    }
    for (index, scored) in matches.iter().enumerate() {
      display_match(index + 1, scored);
    }
    return Ok(());
  }

  let context = retriever.get_relevant_context(&query, agent, limit).await;
  if context.is_empty() {
    bentley::info!("No relevant knowledge found");
  } else {
    println!("{context}");
  }
  Ok(())
}

pub async fn add_agent(app: &App, slug: &str, name: &str, instruction: &str) -> Result<()> {
  let agent = app.store.create_agent(slug, name, instruction).await?;
  println!("{} Added agent {} ({})", "✓".green(), agent.slug.cyan(), agent.name.yellow());
  Ok(())
}

pub async fn remove_agent(app: &App, slug: &str) -> Result<()> {
  let removed = app.store.delete_agent(slug).await?;
  println!("{} Removed agent {} and {} entries", "✓".green(), slug.cyan(), removed);
  Ok(())
}

pub async fn list_sections(app: &App, agent: &str) -> Result<()> {
  let sections = app.store.sections(agent).await?;
  display_sections(agent, &sections);
  Ok(())
}

pub async fn remove_section(app: &App, section_id: &str) -> Result<()> {
  let removed = app.store.delete_section(section_id).await?;
  println!("{} Removed section {} and {} entries", "✓".green(), section_id.cyan(), removed);
  Ok(())
}

/// Load pre-split chunks from a JSON array of `{content, source?}` objects
pub fn load_chunks(path: &Path) -> Result<Vec<ChunkInput>> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("Failed to read chunks from {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("{} must be a JSON array of {{\"content\", \"source\"}} objects", path.display()))
}

pub async fn ingest(app: &App, agent: &str, chunks_file: &Path, title: Option<&str>) -> Result<()> {
  ensure_agent(app, agent).await?;
  let chunks = load_chunks(chunks_file)?;

  let title = match title {
    Some(title) => title.to_string(),
    None => chunks_file
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .ok_or_else(|| anyhow!("Cannot derive a title from {}; pass --title", chunks_file.display()))?,
  };

  if app.embedder.is_none() {
    bentley::warn!("GEMINI_API_KEY is not set; entries will be stored without embeddings");
  }

  let report = app.ingestor().ingest_document(agent, &title, &chunks).await?;
  display_ingest_report(&title, &report);
  Ok(())
}

pub async fn add_entry(app: &App, section_id: &str, content: &str, source: Option<&str>) -> Result<()> {
  let outcome = app.ingestor().add_entry(section_id, content, source).await?;
  println!("{} Added entry {} ({})", "✓".green(), outcome.entry.id.cyan(), outcome.entry.source.yellow());

  if let Some(error) = outcome.embedding_error {
    bentley::warn!(&format!("Entry stored without an embedding: {error}. Run `docent reembed` later."));
  }
  Ok(())
}

pub async fn remove_entry(app: &App, entry_id: &str) -> Result<()> {
  app.store.delete_entry(entry_id).await?;
  println!("{} Removed entry {}", "✓".green(), entry_id.cyan());
  Ok(())
}

pub async fn inspect(app: &App, agent: &str, show_entries: bool, json: bool) -> Result<()> {
  let model = app.embedder.as_ref().map(|embedder| embedder.model().clone());
  let report = maintenance::inspect(app.store.as_ref(), agent, model.as_ref()).await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    display_knowledge_report(&report, show_entries);
  }
  Ok(())
}

pub async fn reembed(app: &App, agent: &str, include_stale: bool) -> Result<()> {
  let batch = app
    .batch_embedder()
    .ok_or_else(|| anyhow!("No embedding backend configured. Set GEMINI_API_KEY and try again"))?;

  let report = maintenance::reembed(app.store.as_ref(), &batch, agent, include_stale).await?;
  display_repair_report(agent, &report);
  Ok(())
}

pub async fn logs(app: &App, limit: usize, level: &str) -> Result<()> {
  let entries = app.trace.entries(Some(limit), Some(level)).await?;

  if entries.is_empty() {
    println!("No logs found.");
    return Ok(());
  }

  for entry in &entries {
    display_trace_entry(entry);
  }
  Ok(())
}

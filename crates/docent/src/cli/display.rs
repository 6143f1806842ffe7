//! Display formatting utilities for CLI output

use bentley::trace_log::TraceEntry;
use colored::*;

use crate::models::{ScoredEntry, SectionSummary};
use crate::services::ingestion::IngestReport;
use crate::services::maintenance::{EmbeddingStatus, KnowledgeReport, RepairReport};

const WRAP_WIDTH: usize = 80;

/// Wrap text to fit within a specified width
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
  let mut lines = Vec::new();

  for paragraph in text.split('\n') {
    if paragraph.trim().is_empty() {
      lines.push(String::new());
      continue;
    }

    let mut current_line = String::new();
    for word in paragraph.split_whitespace() {
      if current_line.is_empty() {
        current_line = word.to_string();
      } else if current_line.chars().count() + 1 + word.chars().count() <= width {
        current_line.push(' ');
        current_line.push_str(word);
      } else {
        lines.push(std::mem::take(&mut current_line));
        current_line = word.to_string();
      }
    }

    if !current_line.is_empty() {
      lines.push(current_line);
    }
  }

  lines
}

/// One ranked passage, as shown by `context --explain`
pub fn display_match(rank: usize, scored: &ScoredEntry) {
  println!(
    "{} {} {}",
    format!("#{rank}").bold(),
    format!("{:.3}", scored.similarity).green(),
    scored.entry.source.yellow().bold()
  );
  for line in wrap_text(&scored.entry.content, WRAP_WIDTH) {
    println!("  {line}");
  }
  println!();
}

pub fn display_sections(agent_slug: &str, sections: &[SectionSummary]) {
  if sections.is_empty() {
    println!("No sections found for agent {}.", agent_slug.cyan());
    return;
  }

  println!("{} Sections of {}:", "📂".cyan(), agent_slug.cyan().bold());
  for summary in sections {
    let noun = if summary.entry_count == 1 { "entry" } else { "entries" };
    println!(
      "  {} {} {}",
      summary.section.title.blue().bold(),
      format!("({} {noun})", summary.entry_count).dimmed(),
      summary.section.id.dimmed()
    );
    if let Some(description) = &summary.section.description {
      println!("    {}", description.dimmed());
    }
  }
}

pub fn display_ingest_report(title: &str, report: &IngestReport) {
  println!(
    "{} Ingested {}: {} of {} chunks stored ({} embedded, {} pending, {} too short)",
    "✓".green(),
    title.yellow(),
    report.entries_inserted,
    report.chunks_found,
    report.embedded,
    report.pending,
    report.skipped
  );
  println!("  section: {}", report.section_id.dimmed());
  display_errors(&report.errors);
}

pub fn display_knowledge_report(report: &KnowledgeReport, show_entries: bool) {
  println!("{} Knowledge for {}", "🔎".cyan(), report.agent_slug.cyan().bold());
  println!("  total entries:     {}", report.total_entries);
  println!("  with embedding:    {}", report.with_embedding.to_string().green());
  println!("  without embedding: {}", colored_count(report.without_embedding, Color::Yellow));
  println!("  stale:             {}", colored_count(report.stale, Color::Red));

  if !show_entries {
    return;
  }

  println!();
  for entry in &report.entries {
    let status = match entry.status {
      EmbeddingStatus::Current => "current".green(),
      EmbeddingStatus::Missing => "missing".yellow(),
      EmbeddingStatus::Stale => "stale".red(),
    };
    println!("{} [{}] {} / {}", entry.id.dimmed(), status, entry.section_title.blue(), entry.source.yellow());
    println!("  {}", entry.preview);
  }
}

pub fn display_repair_report(agent_slug: &str, report: &RepairReport) {
  if report.total == 0 {
    println!("{} Nothing to re-embed for {}", "✓".green(), agent_slug.cyan());
    return;
  }

  println!("{} Re-embedded {}/{} entries for {}", "✓".green(), report.fixed, report.total, agent_slug.cyan());
  display_errors(&report.errors);
}

pub fn display_trace_entry(entry: &TraceEntry) {
  let level = match entry.level.as_str() {
    "error" => entry.level.red().bold(),
    "warn" => entry.level.yellow().bold(),
    "info" => entry.level.blue().bold(),
    _ => entry.level.normal(),
  };
  println!("{} [{}] {}", entry.timestamp.to_rfc3339().cyan(), level, entry.message);

  let Some(context) = &entry.context else {
    return;
  };

  let mut parts = Vec::new();
  if let Some(agent) = &context.agent {
    parts.push(format!("agent: {}", agent.magenta()));
  }
  if let Some(matches) = context.matches {
    parts.push(format!("matches: {matches}"));
  }
  if let Some(chars) = context.context_chars {
    parts.push(format!("context_chars: {chars}"));
  }
  if let Some(duration) = context.duration_ms {
    parts.push(format!("duration: {}", format!("{duration:.1}ms").bright_green()));
  }
  if !parts.is_empty() {
    println!("  {}", parts.join(", ").dimmed());
  }
}

fn display_errors(errors: &[String]) {
  if errors.is_empty() {
    return;
  }

  println!("  {} {} error(s):", "⚠".yellow(), errors.len());
  for error in errors {
    println!("    {}", error.red());
  }
}

fn colored_count(count: usize, color: Color) -> ColoredString {
  if count == 0 {
    count.to_string().normal()
  } else {
    count.to_string().color(color)
  }
}

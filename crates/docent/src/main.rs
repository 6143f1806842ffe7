use anyhow::Result;
use bentley::Verbosity;
use clap::{Parser, Subcommand};
use docent::cli::{commands, App};
use docent::config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docent")]
#[command(
  about = "Docent - Agent-Scoped Knowledge Retrieval\nGrounding context for chat agents from their own knowledge sections"
)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), ", courtesy of Blizz and Kernelle Software"))]
struct Cli {
  /// Path to a YAML config file
  #[arg(long, global = true, env = "DOCENT_CONFIG")]
  config: Option<PathBuf>,

  /// Show verbose and debug output
  #[arg(short, long, global = true, conflicts_with = "quiet")]
  verbose: bool,

  /// Only show warnings and errors
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Command,
}

// violet ignore chunk
#[derive(Subcommand)]
enum Command {
  /// Print the knowledge context an agent would receive for a question
  Context {
    /// Agent slug
    agent: String,
    /// The question (space-separated)
    #[arg(required = true)]
    query: Vec<String>,
    /// Maximum number of passages
    #[arg(short, long)]
    limit: Option<usize>,
    /// Show ranked passages with similarity scores
    #[arg(short, long)]
    explain: bool,
  },
  /// Manage agents
  Agent {
    #[command(subcommand)]
    command: AgentCommand,
  },
  /// Manage knowledge sections
  Section {
    #[command(subcommand)]
    command: SectionCommand,
  },
  /// Ingest a pre-chunked document as a new section
  Ingest {
    /// Agent slug
    agent: String,
    /// JSON array of {"content", "source"} objects
    chunks: PathBuf,
    /// Section title (defaults to the file name)
    #[arg(short, long)]
    title: Option<String>,
  },
  /// Manage individual knowledge entries
  Entry {
    #[command(subcommand)]
    command: EntryCommand,
  },
  /// Report embedding health of an agent's knowledge
  Inspect {
    /// Agent slug
    agent: String,
    /// List every entry with its status
    #[arg(short, long)]
    entries: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
  },
  /// Embed entries that are missing an embedding
  Reembed {
    /// Agent slug
    agent: String,
    /// Also replace embeddings made by a different model
    #[arg(short, long)]
    stale: bool,
  },
  /// Query retrieval trace logs
  Logs {
    /// Maximum number of log entries to return
    #[arg(short, long, default_value = "50")]
    limit: usize,
    /// Filter by log level (info, warn, error, all)
    #[arg(long, default_value = "all")]
    level: String,
  },
}

#[derive(Subcommand)]
enum AgentCommand {
  /// Create an agent
  Add {
    /// Unique, URL-safe identifier
    slug: String,
    /// Display name
    name: String,
    /// System instruction for the agent
    #[arg(short, long, default_value = "")]
    instruction: String,
  },
  /// Delete an agent with all of its sections and entries
  Rm {
    /// Agent slug
    slug: String,
  },
}

#[derive(Subcommand)]
enum SectionCommand {
  /// List an agent's sections with entry counts
  List {
    /// Agent slug
    agent: String,
  },
  /// Delete a section and all of its entries
  Rm {
    /// Section id
    id: String,
  },
}

#[derive(Subcommand)]
enum EntryCommand {
  /// Add a hand-written entry to a section
  Add {
    /// Section id
    section: String,
    /// Entry text
    content: String,
    /// Source label (defaults to "Manual Entry")
    #[arg(short, long)]
    source: Option<String>,
  },
  /// Delete an entry
  Rm {
    /// Entry id
    id: String,
  },
}

async fn handle(app: &App, command: Command) -> Result<()> {
  match command {
    Command::Context { agent, query, limit, explain } => {
      commands::context(app, &agent, &query, limit, explain).await
    }
    Command::Agent { command } => match command {
      AgentCommand::Add { slug, name, instruction } => commands::add_agent(app, &slug, &name, &instruction).await,
      AgentCommand::Rm { slug } => commands::remove_agent(app, &slug).await,
    },
    Command::Section { command } => match command {
      SectionCommand::List { agent } => commands::list_sections(app, &agent).await,
      SectionCommand::Rm { id } => commands::remove_section(app, &id).await,
    },
    Command::Ingest { agent, chunks, title } => commands::ingest(app, &agent, &chunks, title.as_deref()).await,
    Command::Entry { command } => match command {
      EntryCommand::Add { section, content, source } => {
        commands::add_entry(app, &section, &content, source.as_deref()).await
      }
      EntryCommand::Rm { id } => commands::remove_entry(app, &id).await,
    },
    Command::Inspect { agent, entries, json } => commands::inspect(app, &agent, entries, json).await,
    Command::Reembed { agent, stale } => commands::reembed(app, &agent, stale).await,
    Command::Logs { limit, level } => commands::logs(app, limit, &level).await,
  }
}

#[cfg(not(tarpaulin_include))]
fn init_logging(verbosity: Verbosity) {
  let default_filter = match verbosity {
    Verbosity::Verbose => "docent=debug",
    _ => "docent=warn",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let verbosity = if cli.verbose {
    Verbosity::Verbose
  } else if cli.quiet {
    Verbosity::Quiet
  } else {
    Verbosity::Normal
  };
  bentley::set_verbosity(verbosity);
  init_logging(verbosity);

  let config = Config::load(cli.config.as_deref())?;
  let app = App::open(config)?;
  handle(&app, cli.command).await
}

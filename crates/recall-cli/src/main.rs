// ============================================================================
// chat-recall — chat history memory server and inspection tool
// ============================================================================
// Usage:
//   chat-recall serve                         Serve tools over stdio (JSON-RPC)
//   chat-recall init                          Create the history collection
//   chat-recall ask "QUESTION" [--provider P] Ask a provider and store the answer
//   chat-recall search "QUERY" [--limit N]    Semantic search over past chats
//   chat-recall recent [--limit N]            Newest stored chats
//   chat-recall stats                         Total and per-provider counts
//   chat-recall tools                         Print the advertised tool schemas
// ============================================================================

use std::path::PathBuf;

use anyhow::Result;
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use recall_core::gateway::DEFAULT_SEARCH_LIMIT;
use recall_core::{BackendKind, RecallConfig, RecallContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Chat history memory for LLM assistants
#[derive(Parser)]
#[command(name = "chat-recall", version, about = "Ask LLMs and recall past conversations")]
struct Cli {
    /// History backend: qdrant or local (overrides RECALL_BACKEND)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Path to the local database file (default: ~/.chat-recall/history.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tool gateway over stdin/stdout
    Serve,

    /// Create the history collection and indexes if missing
    Init,

    /// Ask a provider and store the exchange
    Ask {
        question: String,

        /// openai, anthropic or google
        #[arg(long, default_value = "openai")]
        provider: String,
    },

    /// Search past conversations by meaning
    Search {
        query: String,

        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Show the newest stored conversations
    Recent {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show conversation counts per provider
    Stats,

    /// Print tool definitions as JSON
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal; the process environment is still read
        if !e.not_found() {
            eprintln!("Warning: failed to load .env: {}", e);
        }
    }

    // stdout carries protocol frames in serve mode, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("recall_core=info".parse()?)
                .add_directive("chat_recall=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = RecallConfig::from_env()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(path) = cli.db_path {
        config.db_path = Some(path);
    }

    let context = RecallContext::from_config(config).await?;

    match cli.command {
        Commands::Serve => cmd_serve(&context).await,
        Commands::Init => cmd_init(&context).await,
        Commands::Ask { question, provider } => cmd_ask(&context, &question, &provider).await,
        Commands::Search { query, limit } => cmd_search(&context, &query, limit).await,
        Commands::Recent { limit } => cmd_recent(&context, limit).await,
        Commands::Stats => cmd_stats(&context).await,
        Commands::Tools => cmd_tools(&context),
    }
}

async fn cmd_serve(context: &RecallContext) -> Result<()> {
    info!("Chat history server running on stdio");
    context.mcp_server().serve_stdio().await?;
    Ok(())
}

async fn cmd_init(context: &RecallContext) -> Result<()> {
    context.history.ensure_collection().await?;

    println!("=== Chat History Ready ===");
    println!("Backend:    {}", context.history.describe());
    println!("Dimensions: {}", context.history.dims());
    println!("Reachable:  {}", context.history.health_check().await?);

    Ok(())
}

async fn cmd_ask(context: &RecallContext, question: &str, provider: &str) -> Result<()> {
    let output = context.gateway().ask_llm(question, provider).await;
    println!("{}", output.joined());
    if output.is_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_search(context: &RecallContext, query: &str, limit: usize) -> Result<()> {
    if limit == 0 {
        anyhow::bail!("Invalid limit: 0. Expected a positive integer.");
    }

    let output = context.gateway().search_chat_history(query, limit).await;
    println!("{}", output.joined());
    if output.is_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_recent(context: &RecallContext, limit: usize) -> Result<()> {
    let chats = context.history.recent(limit).await?;

    if chats.is_empty() {
        println!("No conversations stored yet.");
        return Ok(());
    }

    println!("{:<22}  {:<10}  {}", "TIMESTAMP", "PROVIDER", "QUESTION");
    println!("{}", "-".repeat(80));

    for chat in &chats {
        let question = chat.query.chars().take(44).collect::<String>();
        println!(
            "{:<22}  {:<10}  {}",
            chat.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            chat.provider.as_str(),
            question
        );
    }

    println!();
    println!("{} conversation(s)", chats.len());

    Ok(())
}

async fn cmd_stats(context: &RecallContext) -> Result<()> {
    let output = context.gateway().get_chat_stats().await;
    println!("{}", output.joined());
    if output.is_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_tools(context: &RecallContext) -> Result<()> {
    let tools = context.gateway().tool_definitions();
    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

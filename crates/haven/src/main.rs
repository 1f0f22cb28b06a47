// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Haven - memory engine for a wellness companion.
//!
//! This is the binary entry point: it loads configuration, initializes
//! tracing and the [`app::App`], runs one command and disposes the app.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod doctor;

use clap::{Parser, Subcommand};
use haven_config::model::HavenConfig;
use haven_core::error::HavenError;
use haven_core::types::UserId;
use haven_memory::extractor::{DomainEvent, UrgeLevel};
use haven_memory::{Memory, MemoryType};

use crate::app::App;

/// Haven - memory engine for a wellness companion.
#[derive(Parser, Debug)]
#[command(name = "haven", version, about, long_about = None)]
struct Cli {
    /// User whose memories to operate on.
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the memory context that would be injected for a message.
    Recall {
        query: String,
        /// Maximum memories to include (defaults to retrieval.max_results).
        #[arg(short)]
        k: Option<usize>,
    },
    /// Store a memory directly.
    Remember {
        content: String,
        #[arg(long = "type", default_value = "personal_detail", value_parser = parse_memory_type)]
        memory_type: MemoryType,
        #[arg(long, default_value_t = 5)]
        importance: i64,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Record a mood check-in.
    Checkin {
        mood: String,
        #[arg(long, default_value = "none")]
        urge: UrgeLevel,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record a journal entry.
    Journal { text: String },
    /// List stored memories, oldest first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a memory by id.
    Forget { id: String },
    /// List insights, or annotate one.
    Insights {
        /// Insight id to annotate.
        #[arg(long, requires = "note")]
        annotate: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Print the effective configuration.
    Config,
    /// Check store and embedding provider health.
    Doctor {
        #[arg(long)]
        plain: bool,
    },
}

fn parse_memory_type(s: &str) -> Result<MemoryType, String> {
    MemoryType::from_str_value(s).ok_or_else(|| {
        let valid: Vec<&str> = MemoryType::ALL.iter().map(MemoryType::as_str).collect();
        format!("unknown memory type `{s}` (expected one of: {})", valid.join(", "))
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match haven_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            haven_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    let Some(command) = cli.command else {
        println!("haven: use --help for available commands");
        return;
    };

    if let Commands::Config = command {
        match render_config(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let app = match App::init(config).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: failed to initialize: {e}");
            std::process::exit(1);
        }
    };

    let user = UserId(cli.user);
    let outcome = run(&app, &user, command).await;

    if let Err(e) = app.dispose().await {
        tracing::warn!(error = %e, "shutdown did not complete cleanly");
    }
    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

/// Runs one command. `Ok(false)` means the command ran but found a problem.
async fn run(app: &App, user: &UserId, command: Commands) -> Result<bool, HavenError> {
    match command {
        Commands::Recall { query, k } => {
            let context = app.recall(user, &query, k).await;
            if context.is_empty() {
                println!("(no memories)");
            } else {
                println!("{context}");
            }
        }
        Commands::Remember {
            content,
            memory_type,
            importance,
            tags,
        } => {
            let memory = app
                .remember(user, &content, memory_type, importance, &tags)
                .await?;
            println!("saved {}", memory.id);
        }
        Commands::Checkin { mood, urge, note } => {
            let saved = app.check_in(user, &mood, urge, note).await?;
            print_saved(&saved);
        }
        Commands::Journal { text } => {
            let saved = app.record(user, DomainEvent::JournalEntry { text }).await?;
            print_saved(&saved);
        }
        Commands::List { json } => {
            let memories = app.list(user).await?;
            if json {
                let text = serde_json::to_string_pretty(&memories)
                    .map_err(|e| HavenError::Internal(format!("failed to serialize memories: {e}")))?;
                println!("{text}");
            } else {
                for memory in &memories {
                    println!("{}", list_line(memory));
                }
            }
        }
        Commands::Forget { id } => {
            if app.forget(user, &id).await? {
                println!("forgot {id}");
            } else {
                println!("no memory with id {id}");
                return Ok(false);
            }
        }
        Commands::Insights {
            annotate: Some(id),
            note,
        } => {
            if app.annotate_insight(user, &id, note).await? {
                println!("annotated {id}");
            } else {
                println!("no insight with id {id}");
                return Ok(false);
            }
        }
        Commands::Insights { annotate: None, .. } => {
            for insight in app.insights(user).await? {
                println!(
                    "{}  {}  {}",
                    insight.id,
                    insight.date.format("%Y-%m-%d"),
                    insight.content
                );
                if let Some(note) = &insight.user_note {
                    println!("    note: {note}");
                }
            }
        }
        Commands::Doctor { plain } => return Ok(doctor::run_doctor(app, plain).await),
        Commands::Config => {}
    }
    Ok(true)
}

fn print_saved(memories: &[Memory]) {
    for memory in memories {
        println!("saved {} ({})", memory.id, memory.memory_type.as_str());
    }
}

fn list_line(memory: &Memory) -> String {
    format!(
        "{}  {:<18} {:>2}  {}  {}",
        memory.id,
        memory.memory_type.as_str(),
        memory.importance,
        memory.date.format("%Y-%m-%d"),
        memory.content
    )
}

/// The effective configuration as TOML, with the API key masked.
fn render_config(config: &HavenConfig) -> Result<String, HavenError> {
    let mut shown = config.clone();
    if shown.embedding.api_key.is_some() {
        shown.embedding.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| HavenError::Config(format!("failed to render configuration: {e}")))
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("haven={log_level},haven_memory={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

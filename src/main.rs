//! # docchat CLI
//!
//! The `docchat` binary is the primary interface for the retrieval engine.
//! It provides commands for database initialization, project management,
//! document ingestion, grounded chat, and cited-span inspection.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat project create <name>` | Create a project |
//! | `docchat project list` | List projects with document counts |
//! | `docchat project delete <id>` | Delete a project and its index |
//! | `docchat ingest <project> <file>` | Extract, chunk, embed, and index a document |
//! | `docchat chat <project> "<message>"` | Ask a grounded question with citations |
//! | `docchat delete <project> <doc>` | Delete a document everywhere |
//! | `docchat show <doc> --start N --end M` | Print a document with a span highlighted |
//! | `docchat rebuild <project>` | Regenerate the index from the snippet store |
//! | `docchat check <project>` | Report store/index inconsistencies |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docchat::engine::Engine;
use docchat::extract;
use docchat::{config, db, migrate, store};

/// docchat CLI — a project-scoped document retrieval engine for grounded
/// chat with exact source citations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "docchat — project-scoped document retrieval for grounded chat",
    version,
    long_about = "docchat ingests documents into per-project collections, chunks them into \
    overlapping passages with exact character-offset provenance, ranks them by cosine \
    similarity against chat queries, and folds the best passages into an LLM prompt so \
    every answer cites the exact span it came from."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (projects,
    /// documents, snippets). Idempotent — running it multiple times is safe.
    Init,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Ingest a document into a project.
    ///
    /// Extracts text (plain, Markdown, PDF, or DOCX), chunks it into
    /// overlapping passages, embeds them, appends them to the snippet
    /// store, and updates the project's persisted index. Re-ingesting a
    /// byte-identical body is skipped.
    Ingest {
        /// Project UUID.
        project: String,

        /// One or more files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask a grounded question against a project's documents.
    ///
    /// Embeds the message, ranks stored snippets by cosine similarity,
    /// folds the best passages into the prompt, and prints the answer with
    /// one citation line per passage used.
    Chat {
        /// Project UUID.
        project: String,

        /// The question to ask.
        message: String,
    },

    /// Delete a document from a project.
    ///
    /// Removes its index nodes, snippet rows, and the document row — all
    /// or nothing. Prior chat answers keep their citation text.
    Delete {
        /// Project UUID.
        project: String,

        /// Document UUID.
        document: String,
    },

    /// Print a document, optionally highlighting a cited span.
    Show {
        /// Document UUID.
        document: String,

        /// Span start (character offset, inclusive).
        #[arg(long, requires = "end")]
        start: Option<usize>,

        /// Span end (character offset, exclusive).
        #[arg(long, requires = "start")]
        end: Option<usize>,
    },

    /// Regenerate a project's persisted index from the snippet store.
    ///
    /// The snippet store is authoritative; use this after index corruption
    /// or deletion. Existing index files are replaced.
    Rebuild {
        /// Project UUID.
        project: String,
    },

    /// Check a project for store/index inconsistencies.
    Check {
        /// Project UUID.
        project: String,
    },
}

/// Project management subcommands.
#[derive(Subcommand)]
enum ProjectAction {
    /// Create a new project.
    Create {
        /// Human-readable project name.
        name: String,
    },
    /// List all projects.
    List,
    /// Rename a project.
    Rename {
        /// Project UUID.
        id: String,
        /// New project name.
        name: String,
    },
    /// Delete a project, all its documents, and its persisted index.
    Delete {
        /// Project UUID.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg).await?;
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let engine = Engine::from_config(cfg).await?;
    migrate::run_migrations(engine.pool()).await?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Project { action } => match action {
            ProjectAction::Create { name } => {
                let project = engine.create_project(&name).await?;
                println!("Created project {} ({})", project.name, project.id);
            }
            ProjectAction::List => {
                let projects = engine.list_projects().await?;
                if projects.is_empty() {
                    println!("No projects.");
                }
                for project in projects {
                    let documents = store::list_documents(engine.pool(), &project.id).await?;
                    println!(
                        "{}  {}  ({} document{})",
                        project.id,
                        project.name,
                        documents.len(),
                        if documents.len() == 1 { "" } else { "s" }
                    );
                }
            }
            ProjectAction::Rename { id, name } => {
                store::rename_project(engine.pool(), &id, &name).await?;
                println!("Renamed project {id} to {name}");
            }
            ProjectAction::Delete { id } => {
                engine.delete_project(&id).await?;
                println!("Deleted project {id}");
            }
        },
        Commands::Ingest { project, files } => {
            for file in files {
                let bytes = std::fs::read(&file)?;
                let file_name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".to_string());
                let content_type = extract::content_type_for(&file_name);
                let report = engine
                    .ingest(&project, &file_name, &bytes, content_type)
                    .await?;
                if report.skipped {
                    println!(
                        "Skipped {}: identical content already ingested as document {}",
                        file_name, report.document_id
                    );
                } else {
                    println!(
                        "Ingested document {} ({} snippet{}, {} embedded{})",
                        report.document_id,
                        report.snippets,
                        if report.snippets == 1 { "" } else { "s" },
                        report.embedded,
                        if report.pending > 0 {
                            format!(", {} pending", report.pending)
                        } else {
                            String::new()
                        }
                    );
                }
            }
        }
        Commands::Chat { project, message } => {
            let outcome = engine.chat(&project, &message).await?;
            println!("{}", outcome.answer);
            if !outcome.passages.is_empty() {
                println!();
                println!("Sources:");
                for (i, passage) in outcome.passages.iter().enumerate() {
                    println!(
                        "  [{}] document {} chars {}..{} (similarity {:.3})",
                        i + 1,
                        passage.document_id,
                        passage.span.start,
                        passage.span.end,
                        passage.similarity
                    );
                }
            }
        }
        Commands::Delete { project, document } => {
            engine.delete_document(&project, &document).await?;
            println!("Deleted document {document}");
        }
        Commands::Show {
            document,
            start,
            end,
        } => match (start, end) {
            (Some(start), Some(end)) => {
                let rendered = engine.highlight(&document, start, end).await?;
                println!("{rendered}");
            }
            _ => {
                let doc = store::get_document(engine.pool(), &document).await?;
                println!("{}", doc.body);
            }
        },
        Commands::Rebuild { project } => {
            let nodes = engine.rebuild_index(&project).await?;
            println!("Rebuilt index for project {project} ({nodes} nodes)");
        }
        Commands::Check { project } => {
            let anomalies = engine.check(&project).await?;
            if anomalies.is_empty() {
                println!("OK: store and index are consistent.");
            } else {
                for anomaly in &anomalies {
                    println!("ANOMALY: {anomaly}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

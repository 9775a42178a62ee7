//! # fsearch CLI
//!
//! Index local folders, check their status, search, and run the HTTP API.
//!
//! ```bash
//! fsearch --config ./config/fsearch.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fsearch init` | Create the SQLite database and run migrations |
//! | `fsearch index <folder>` | Index a folder under the local root (foreground) |
//! | `fsearch status <folder>...` | Reconciled index status per folder |
//! | `fsearch search "<query>"` | Reranked search, one hit per file |
//! | `fsearch delete <folder>` | Delete a folder's chunks and status |
//! | `fsearch reset` | Drop every chunk and status record |
//! | `fsearch serve` | Start the HTTP server |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use folder_search::app::AppContext;
use folder_search::config;
use folder_search::logging;
use folder_search::pipeline::RunOutcome;
use folder_search::server;

/// Folder indexing and reranked search over local disks and Synology NAS
/// shares.
#[derive(Parser)]
#[command(name = "fsearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema. Idempotent.
    Init,

    /// Index a folder under the local root and wait for completion.
    Index {
        /// Folder path relative to `[local].root`.
        folder: String,
    },

    /// Print the reconciled status of one or more folders.
    Status {
        #[arg(required = true)]
        folders: Vec<String>,
    },

    /// Search indexed content.
    Search {
        query: String,

        /// Number of distinct files to return.
        #[arg(short = 'k', long)]
        limit: Option<usize>,
    },

    /// Delete a folder's index.
    Delete { folder: String },

    /// Drop every indexed chunk and status record.
    Reset,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Serve = cli.command {
        let ctx = Arc::new(AppContext::open(cfg).await?);
        if !ctx.is_primary() {
            anyhow::bail!(
                "another fsearch process already owns {}",
                ctx.config.db.path.display()
            );
        }
        server::run_server(ctx, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received, shutting down");
        })
        .await?;
        return Ok(());
    }

    let ctx = AppContext::open(cfg).await?;
    let result = run_command(&ctx, cli.command).await;
    ctx.shutdown().await;
    result
}

async fn run_command(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    let local = ctx.sessions.local();

    match command {
        Commands::Init => {
            println!("Database initialized at {}", ctx.config.db.path.display());
        }
        Commands::Index { folder } => match ctx.index_now(local.as_ref(), &folder).await? {
            Some(RunOutcome::Completed(report)) => {
                println!(
                    "Indexed {}: {} files seen, {} indexed, {} skipped, {} chunks",
                    folder,
                    report.files_seen,
                    report.files_indexed,
                    report.files_skipped,
                    report.chunk_count
                );
            }
            Some(RunOutcome::Cancelled) => println!("Indexing of {} was cancelled", folder),
            None => println!("Indexing already in progress for folder: {}", folder),
        },
        Commands::Status { folders } => {
            let statuses = ctx.statuses(local.as_ref(), &folders).await?;
            for folder in &folders {
                if let Some(status) = statuses.get(folder) {
                    println!("{}\t{}", status, folder);
                }
            }
        }
        Commands::Search { query, limit } => {
            let results = ctx.search(&query, limit).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, hit) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (chunk {})",
                    i + 1,
                    hit.relevance_score,
                    hit.file_path,
                    hit.chunk_number
                );
                let snippet: String = hit.content_snippet.chars().take(160).collect();
                println!("    {}", snippet.replace('\n', " "));
            }
        }
        Commands::Delete { folder } => {
            let deleted = ctx.delete_index(local.as_ref(), &folder).await?;
            println!("Deleted {} chunks for {}", deleted, folder);
        }
        Commands::Reset => {
            ctx.reset().await?;
            println!("Index reset.");
        }
        Commands::Serve => unreachable!("handled before context dispatch"),
    }

    Ok(())
}

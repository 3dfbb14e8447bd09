//! # paracheck CLI
//!
//! ## Usage
//!
//! ```bash
//! paracheck --config ./config/paracheck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `paracheck init` | Create the SQLite database and run schema migrations |
//! | `paracheck upload <file>` | Extract paragraphs, score them, store the document |
//! | `paracheck report <id>` | Per-paragraph similarity with high-risk markers |
//! | `paracheck documents` | List documents, newest first |
//! | `paracheck edit <id> <index> <text>` | Replace one paragraph's text |
//! | `paracheck recheck <id>` | Recompute similarity from current texts |
//! | `paracheck rewrite <text>` | Rewrite text with the configured generator |
//! | `paracheck version save/list/get` | Rewrite version history |
//! | `paracheck export <id>` | Write the rebuilt `.docx` |
//! | `paracheck delete <id>` | Delete a document with its paragraphs and versions |
//! | `paracheck words add/enable/disable/list` | Manage the sensitive-word list |
//! | `paracheck serve` | Start the HTTP server |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use paracheck::models::{DocumentStatus, NewVersion};
use paracheck::rewrite::RewriteRequest;
use paracheck::store::DocumentFilter;
use paracheck::{commands, config, migrate, server};

/// paracheck: paragraph-level duplication checking and versioned rewriting
/// for uploaded documents.
#[derive(Parser)]
#[command(name = "paracheck", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/paracheck.toml")]
    config: PathBuf,

    /// Debug logging (overrides RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Upload a document (.docx, .txt, .md, .pdf) and check it.
    Upload {
        file: PathBuf,
        /// Owner user id.
        #[arg(long, default_value_t = 0)]
        user: i64,
    },

    /// Show the similarity report of a document.
    Report { id: i64 },

    /// List documents.
    Documents {
        #[arg(long)]
        owner: Option<i64>,
        /// Title substring.
        #[arg(long)]
        title: Option<String>,
        /// UPLOADED, CHECKING, CHECKED, REWRITING or COMPLETED.
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        size: Option<i64>,
    },

    /// Replace the text of one paragraph.
    Edit {
        id: i64,
        index: i64,
        text: String,
        #[arg(long, default_value_t = 0)]
        user: i64,
    },

    /// Recompute similarity from the current paragraph texts.
    Recheck {
        id: i64,
        #[arg(long, default_value_t = 0)]
        user: i64,
    },

    /// Rewrite text with the configured generation backend.
    Rewrite {
        text: String,
        /// ACADEMIC, FLUENCY, EXPAND or LOGIC_ENHANCE.
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        document: Option<i64>,
        #[arg(long)]
        paragraph: Option<i64>,
        #[arg(long, default_value_t = 0)]
        user: i64,
    },

    /// Rewrite version history.
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// Write the rebuilt .docx of a document.
    Export {
        id: i64,
        /// Output path (defaults to the title with a .docx extension).
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        user: i64,
    },

    /// Delete a document with its paragraphs and versions.
    Delete {
        id: i64,
        #[arg(long, default_value_t = 0)]
        user: i64,
    },

    /// Sensitive-word list.
    Words {
        #[command(subcommand)]
        action: WordsAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum VersionAction {
    /// Save a new version of a document.
    Save {
        document: i64,
        /// Version content; read from --file when absent.
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        remark: Option<String>,
        #[arg(long, default_value_t = 0)]
        user: i64,
    },
    /// List versions of a document, newest first.
    List { document: i64 },
    /// Show one version.
    Get { id: i64 },
}

#[derive(Subcommand)]
enum WordsAction {
    Add {
        word: String,
        #[arg(long)]
        category: Option<String>,
        /// LOW, MEDIUM or HIGH.
        #[arg(long)]
        level: Option<String>,
    },
    /// Turn matching back on for a word.
    Enable { word: String },
    /// Keep a word listed but stop matching it.
    Disable { word: String },
    List,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Upload { file, user } => {
            commands::run_upload(&cfg, &file, user).await?;
        }
        Commands::Report { id } => {
            commands::run_report(&cfg, id).await?;
        }
        Commands::Documents {
            owner,
            title,
            status,
            page,
            size,
        } => {
            let status = status
                .map(|s| s.parse::<DocumentStatus>())
                .transpose()?;
            let filter = DocumentFilter {
                owner_id: owner,
                title,
                status,
                page,
                size,
            };
            commands::run_documents(&cfg, &filter).await?;
        }
        Commands::Edit {
            id,
            index,
            text,
            user,
        } => {
            commands::run_edit(&cfg, id, index, &text, user).await?;
        }
        Commands::Recheck { id, user } => {
            commands::run_recheck(&cfg, id, user).await?;
        }
        Commands::Rewrite {
            text,
            style,
            document,
            paragraph,
            user,
        } => {
            let request = RewriteRequest {
                document_id: document,
                paragraph_id: paragraph,
                text,
                style,
            };
            commands::run_rewrite(&cfg, &request, user).await?;
        }
        Commands::Version { action } => match action {
            VersionAction::Save {
                document,
                content,
                file,
                style,
                remark,
                user,
            } => {
                let content = match (content, file) {
                    (Some(c), _) => c,
                    (None, Some(path)) => std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                    (None, None) => anyhow::bail!("either --content or --file is required"),
                };
                let new = NewVersion {
                    document_id: document,
                    style,
                    content,
                    remark,
                    created_by: user,
                };
                commands::run_version_save(&cfg, &new).await?;
            }
            VersionAction::List { document } => {
                commands::run_version_list(&cfg, document).await?;
            }
            VersionAction::Get { id } => {
                commands::run_version_get(&cfg, id).await?;
            }
        },
        Commands::Export { id, output, user } => {
            commands::run_export(&cfg, id, output.as_deref(), user).await?;
        }
        Commands::Delete { id, user } => {
            commands::run_delete(&cfg, id, user).await?;
        }
        Commands::Words { action } => match action {
            WordsAction::Add {
                word,
                category,
                level,
            } => {
                commands::run_words_add(&cfg, &word, category.as_deref(), level.as_deref())
                    .await?;
            }
            WordsAction::Enable { word } => {
                commands::run_words_set_enabled(&cfg, &word, true).await?;
            }
            WordsAction::Disable { word } => {
                commands::run_words_set_enabled(&cfg, &word, false).await?;
            }
            WordsAction::List => {
                commands::run_words_list(&cfg).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

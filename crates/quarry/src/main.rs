//! # Quarry CLI (`quarry`)
//!
//! The `quarry` binary is the command-line interface to Quarry. It
//! covers database initialization, document ingestion, knowledge-base
//! management, search, and prompt augmentation.
//!
//! ## Usage
//!
//! ```bash
//! quarry --config ./config/quarry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quarry init` | Create the SQLite database and run schema migrations |
//! | `quarry add <path>` | Ingest a txt, md, pdf, or docx file |
//! | `quarry list` | List all documents |
//! | `quarry get <id>` | Show a document and its chunks |
//! | `quarry delete <id>` | Delete a document and its chunks |
//! | `quarry kb <subcommand>` | Manage knowledge bases |
//! | `quarry search "<query>"` | Hybrid, vector, or keyword search |
//! | `quarry augment "<prompt>"` | Build a context-augmented prompt |
//!
//! ## Examples
//!
//! ```bash
//! quarry init
//! quarry add ./docs/handbook.md
//! quarry search "deployment checklist" --strategy hybrid
//! quarry kb create "platform docs"
//! quarry kb add <kb-id> <doc-id>
//! quarry search "rollback" --kb <kb-id>
//! quarry augment "How do we roll back a deploy?"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quarry::config::{self, Config};
use quarry::embedding::ProviderEmbedder;
use quarry::migrate;
use quarry::service::RagService;
use quarry::sqlite_store::SqliteStore;
use quarry_core::models::{KnowledgeBaseUpdate, SearchConfig, SearchStrategy};

/// Quarry — a local-first retrieval-augmented generation toolkit.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/quarry.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry — local-first document retrieval and prompt augmentation",
    version,
    long_about = "Quarry ingests documents (txt, md, pdf, docx) into SQLite, chunks and embeds \
    them, and answers queries with hybrid vector + BM25 retrieval, optional reranking, and \
    citation extraction. Retrieved context can be folded into prompts for downstream models."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/quarry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables.
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Ingest a document from a file.
    ///
    /// The file type is detected from the extension (txt, md, pdf,
    /// docx). The document is chunked and embedded before it is stored;
    /// if embedding fails, nothing is written.
    Add {
        /// Path to the file to ingest.
        path: PathBuf,

        /// Document title. Defaults to the file name without extension.
        #[arg(long)]
        title: Option<String>,

        /// Owner id recorded on the document.
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// List all documents.
    List,

    /// Show a document's metadata and chunks.
    Get {
        /// Document id.
        id: String,
    },

    /// Delete a document and all its chunks.
    ///
    /// Knowledge-base memberships referencing it are left in place and
    /// simply stop contributing chunks to scoped searches.
    Delete {
        /// Document id.
        id: String,
    },

    /// Manage knowledge bases (named document groupings that scope search).
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Search indexed documents.
    ///
    /// Runs the retrieval pipeline: optional query expansion, the
    /// chosen strategy, optional reranking, and citation extraction.
    Search {
        /// The search query string.
        query: String,

        /// Search strategy: `vector`, `keyword`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        strategy: String,

        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict the search to one knowledge base.
        #[arg(long)]
        kb: Option<String>,

        /// Drop results below this relevance.
        #[arg(long)]
        min_relevance: Option<f32>,

        /// Skip the reranking pass.
        #[arg(long)]
        no_rerank: bool,

        /// Expand the query with known synonyms before retrieval.
        #[arg(long)]
        expand: bool,
    },

    /// Build a context-augmented prompt.
    ///
    /// Searches with the prompt as the query and prepends the retrieved
    /// passages as numbered context blocks.
    Augment {
        /// The prompt to augment.
        prompt: String,

        /// Search strategy: `vector`, `keyword`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        strategy: String,

        /// Maximum number of context passages.
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict retrieval to one knowledge base.
        #[arg(long)]
        kb: Option<String>,
    },
}

/// Knowledge-base subcommands.
#[derive(Subcommand)]
enum KbAction {
    /// Create a knowledge base.
    Create {
        /// Display name.
        name: String,

        /// Free-form description.
        #[arg(long, default_value = "")]
        description: String,

        /// Owner id recorded on the knowledge base.
        #[arg(long, default_value = "local")]
        user: String,

        /// Mark the knowledge base as public.
        #[arg(long)]
        public: bool,
    },

    /// List all knowledge bases.
    List,

    /// Show one knowledge base and its member documents.
    Show {
        /// Knowledge-base id.
        id: String,
    },

    /// Update name, description, or visibility.
    Update {
        /// Knowledge-base id.
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        public: Option<bool>,
    },

    /// Delete a knowledge base. Member documents survive.
    Delete {
        /// Knowledge-base id.
        id: String,
    },

    /// Add a document to a knowledge base. Adding an existing member
    /// is a no-op.
    Add {
        /// Knowledge-base id.
        kb_id: String,
        /// Document id.
        doc_id: String,
    },

    /// Remove a document from a knowledge base.
    Remove {
        /// Knowledge-base id.
        kb_id: String,
        /// Document id.
        doc_id: String,
    },
}

async fn build_service(cfg: &Config) -> Result<RagService> {
    let pool = quarry::db::connect(&cfg.db).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let embedder = Arc::new(ProviderEmbedder::from_config(&cfg.embedding)?);
    Ok(RagService::new(
        store,
        embedder,
        &cfg.chunking,
        &cfg.retrieval,
    ))
}

fn search_config(
    cfg: &Config,
    strategy: &str,
    top_k: Option<usize>,
    min_relevance: Option<f32>,
    rerank: bool,
    expand_query: bool,
) -> Result<SearchConfig> {
    let strategy = SearchStrategy::parse(strategy).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown search strategy: {}. Use vector, keyword, or hybrid.",
            strategy
        )
    })?;
    Ok(SearchConfig {
        strategy,
        top_k: top_k.unwrap_or(cfg.retrieval.top_k),
        rerank,
        expand_query,
        min_relevance,
    })
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = quarry::db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Add { path, title, user } => {
            let service = build_service(&cfg).await?;
            let doc = service.add_file(&path, title, &user).await?;
            println!(
                "Added document {} ({} chunks): {}",
                doc.id,
                doc.chunks.len(),
                doc.title
            );
        }
        Commands::List => {
            let service = build_service(&cfg).await?;
            let docs = service.list_documents().await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{}  {}  [{}]  {} chunks",
                    doc.id,
                    doc.title,
                    doc.doc_type.as_str(),
                    doc.chunks.len()
                );
            }
        }
        Commands::Get { id } => {
            let service = build_service(&cfg).await?;
            let doc = service.get_document(&id).await?;
            println!("id:        {}", doc.id);
            println!("title:     {}", doc.title);
            println!("type:      {}", doc.doc_type.as_str());
            println!("size:      {} bytes", doc.size);
            println!("user:      {}", doc.user_id);
            println!("uploaded:  {}", doc.uploaded_at.to_rfc3339());
            println!("chunks:    {}", doc.chunks.len());
            for chunk in &doc.chunks {
                println!(
                    "  [{}] chars {}..{}  {}",
                    chunk.chunk_index,
                    chunk.start_offset,
                    chunk.end_offset,
                    snippet(&chunk.content, 80)
                );
            }
        }
        Commands::Delete { id } => {
            let service = build_service(&cfg).await?;
            service.delete_document(&id).await?;
            println!("Deleted document {}.", id);
        }
        Commands::Kb { action } => {
            let service = build_service(&cfg).await?;
            match action {
                KbAction::Create {
                    name,
                    description,
                    user,
                    public,
                } => {
                    let kb = service
                        .create_knowledge_base(&name, &description, &user, public, Vec::new())
                        .await?;
                    println!("Created knowledge base {}: {}", kb.id, kb.name);
                }
                KbAction::List => {
                    let kbs = service.list_knowledge_bases().await?;
                    if kbs.is_empty() {
                        println!("No knowledge bases.");
                    }
                    for kb in kbs {
                        println!(
                            "{}  {}  {} documents{}",
                            kb.id,
                            kb.name,
                            kb.document_ids.len(),
                            if kb.is_public { "  (public)" } else { "" }
                        );
                    }
                }
                KbAction::Show { id } => {
                    let kb = service.get_knowledge_base(&id).await?;
                    println!("id:           {}", kb.id);
                    println!("name:         {}", kb.name);
                    println!("description:  {}", kb.description);
                    println!("owner:        {}", kb.user_id);
                    println!("public:       {}", kb.is_public);
                    println!("documents:    {}", kb.document_ids.len());
                    for doc_id in &kb.document_ids {
                        println!("  {}", doc_id);
                    }
                }
                KbAction::Update {
                    id,
                    name,
                    description,
                    public,
                } => {
                    let kb = service
                        .update_knowledge_base(
                            &id,
                            KnowledgeBaseUpdate {
                                name,
                                description,
                                is_public: public,
                                ..Default::default()
                            },
                        )
                        .await?;
                    println!("Updated knowledge base {}: {}", kb.id, kb.name);
                }
                KbAction::Delete { id } => {
                    service.delete_knowledge_base(&id).await?;
                    println!("Deleted knowledge base {}.", id);
                }
                KbAction::Add { kb_id, doc_id } => {
                    service
                        .add_document_to_knowledge_base(&kb_id, &doc_id)
                        .await?;
                    println!("Added {} to {}.", doc_id, kb_id);
                }
                KbAction::Remove { kb_id, doc_id } => {
                    service
                        .remove_document_from_knowledge_base(&kb_id, &doc_id)
                        .await?;
                    println!("Removed {} from {}.", doc_id, kb_id);
                }
            }
        }
        Commands::Search {
            query,
            strategy,
            top_k,
            kb,
            min_relevance,
            no_rerank,
            expand,
        } => {
            let service = build_service(&cfg).await?;
            let config = search_config(&cfg, &strategy, top_k, min_relevance, !no_rerank, expand)?;
            let results = service.search(&query, &config, kb.as_deref()).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {}  ({})",
                    i + 1,
                    result.relevance(),
                    result.title.as_deref().unwrap_or("(untitled)"),
                    result.chunk_id
                );
                println!("   {}", snippet(&result.content, 160));
                for citation in &result.citations {
                    println!(
                        "   ↳ [{:.2}] {}",
                        citation.confidence,
                        snippet(&citation.text, 100)
                    );
                }
            }
        }
        Commands::Augment {
            prompt,
            strategy,
            top_k,
            kb,
        } => {
            let service = build_service(&cfg).await?;
            let config = search_config(&cfg, &strategy, top_k, None, true, false)?;
            let augmented = service.augment(&prompt, &config, kb.as_deref()).await?;
            println!("{}", augmented);
        }
    }

    Ok(())
}

mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use invoice_qa_core::{
    discover_pdf_files, EmbeddingBackend, InvoiceAssistant, QaConfig, QaOptions, StoreBackend,
    DEFAULT_CHAT_MODEL, DEFAULT_MODEL_DIR, DEFAULT_OPENAI_BASE_URL, DEFAULT_PERSIST_DIR,
};
use server::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "invoice-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Chat completion model
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Directory of the local vector collection
    #[arg(long, env = "VECTOR_DB_DIR", default_value = DEFAULT_PERSIST_DIR)]
    persist_dir: PathBuf,

    /// Directory with the all-MiniLM-L6-v2 sentence-transformer files
    #[arg(long, env = "EMBEDDING_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    embedding_model_dir: PathBuf,

    /// Embed with hashed word and trigram features instead of the sentence model
    #[arg(long, env = "HASHED_EMBEDDINGS")]
    hashed_embeddings: bool,

    /// Qdrant base URL; the local collection is used when unset
    #[arg(long)]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, default_value = "invoice_chunks")]
    qdrant_collection: String,

    /// Number of chunks retrieved per question
    #[arg(long, default_value = "4")]
    top_k: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
        /// Where uploaded invoices are written before ingestion.
        #[arg(long, default_value = "./temp_uploads")]
        upload_dir: PathBuf,
    },
    /// Ingest one PDF, or every PDF under a folder.
    Ingest {
        #[arg(long)]
        path: PathBuf,
    },
    /// Ask a question about the ingested invoices.
    Ask {
        #[arg(long)]
        query: String,
    },
}

impl Cli {
    fn qa_config(&self) -> QaConfig {
        let store = match &self.qdrant_url {
            Some(url) => StoreBackend::Qdrant {
                url: url.clone(),
                collection: self.qdrant_collection.clone(),
            },
            None => StoreBackend::Local,
        };
        let embedding = if self.hashed_embeddings {
            EmbeddingBackend::NgramHash
        } else {
            EmbeddingBackend::SentenceModel {
                model_dir: self.embedding_model_dir.clone(),
            }
        };

        QaConfig {
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            chat_model: self.chat_model.clone(),
            persist_dir: self.persist_dir.clone(),
            store,
            embedding,
            options: QaOptions {
                top_k: self.top_k,
                ..QaOptions::default()
            },
            ..QaConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.qa_config();
    let assistant = InvoiceAssistant::from_config(&config)
        .await
        .context("failed to initialise the invoice assistant")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "invoice-qa boot"
    );

    match cli.command {
        Command::Serve { bind, upload_dir } => {
            let state = AppState {
                assistant: Arc::new(assistant),
                upload_dir,
            };
            server::serve(state, bind).await?;
        }
        Command::Ingest { path } => {
            if path.is_dir() {
                let files = discover_pdf_files(&path);
                info!(folder = %path.display(), files = files.len(), "ingesting folder");

                let report = assistant.ingest_many(&files).await;
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                let chunks: usize = report.ingested.iter().map(|doc| doc.chunk_count).sum();
                println!(
                    "{} of {} files ingested ({} chunks, {} skipped)",
                    report.ingested.len(),
                    files.len(),
                    chunks,
                    report.skipped_files.len()
                );
            } else {
                let report = assistant
                    .ingest(&path)
                    .await
                    .with_context(|| format!("failed to ingest {}", path.display()))?;
                println!(
                    "{} ingested: {} chunks, sha256={}",
                    report.source_name, report.chunk_count, report.document_checksum
                );
            }
        }
        Command::Ask { query } => {
            let answer = assistant
                .ask(&query)
                .await
                .context("failed to answer query")?;

            println!("query: {}", answer.query);
            println!("answer: {}", answer.answer);
            for (rank, source) in answer.sources.iter().enumerate() {
                match &source.provenance {
                    Some(provenance) => println!(
                        "[{}] score={:.4} source={} chunk={}",
                        rank + 1,
                        source.score,
                        provenance.source_name,
                        provenance.chunk_index
                    ),
                    None => println!("[{}] score={:.4}", rank + 1, source.score),
                }
                println!("  chunk_text:\n{}", source.text);
            }
        }
    }

    Ok(())
}

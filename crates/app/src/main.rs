use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_rag_core::{
    build_context, ingest_file, ingest_folder_best_effort, AnswerGenerator, BatchedEmbedder,
    CharacterTrigramEmbedder, ChatCompletionGenerator, ChunkingConfig, DocumentExtractor,
    DocumentStore, HttpOcrEngine, RetrievalPipeline, SearchError, VectorIndex,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory for persisted documents and the vector index.
    #[arg(long, env = "DOC_RAG_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Word budget per chunk.
    #[arg(long, default_value = "512")]
    chunk_size: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a document, or every supported document under a folder.
    Ingest {
        /// A PDF/image file, or a folder to scan recursively.
        #[arg(long)]
        path: PathBuf,
    },
    /// Rebuild the vector index from every ingested document.
    BuildIndex,
    /// Retrieve the most relevant chunks and generate an answer.
    Query {
        /// Natural-language question.
        #[arg(long)]
        query: String,
        /// Number of chunks to retrieve.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Skip the answer-generation step and print sources only.
        #[arg(long, default_value_t = false)]
        no_answer: bool,
    },
    /// List ingested documents.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let chunking = ChunkingConfig {
        chunk_size: cli.chunk_size,
    };

    // Every component is constructed once here and handed to the pipeline
    // explicitly; nothing is lazily initialized behind the scenes.
    let extractor = DocumentExtractor::new(HttpOcrEngine::from_env());
    let store = Arc::new(
        DocumentStore::open(&cli.data_dir.join("processed").join("documents.json"))
            .map_err(|error| anyhow::anyhow!(error.to_string()))?,
    );
    let index = Arc::new(
        VectorIndex::open(&cli.data_dir.join("index"))
            .map_err(|error| anyhow::anyhow!(error.to_string()))?,
    );
    let pipeline = RetrievalPipeline::new(
        Arc::clone(&store),
        Arc::clone(&index),
        BatchedEmbedder::new(CharacterTrigramEmbedder::default()),
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "doc-rag boot"
    );

    match cli.command {
        Command::Ingest { path } => {
            // Extraction and OCR block; keep them off the async reactor.
            let outcome = tokio::task::block_in_place(|| ingest_path(
                &extractor, &store, &path, chunking,
            ))?;
            for line in outcome {
                println!("{line}");
            }
        }
        Command::BuildIndex => {
            let report = pipeline
                .build_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!(
                "indexed {} chunks from {} documents ({:.2} MiB on disk)",
                report.total_chunks,
                report.documents_indexed,
                report.index_size_bytes as f64 / (1024.0 * 1024.0)
            );
        }
        Command::Query {
            query,
            top_k,
            no_answer,
        } => {
            let hits = pipeline
                .query(&query, top_k)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            for hit in &hits {
                println!(
                    "[{}] page={} chunk={} score={:.4}",
                    hit.filename, hit.page, hit.chunk_id, hit.score
                );
                println!("  {}", preview(&hit.text));
            }

            if !no_answer {
                let generator = ChatCompletionGenerator::from_env();
                match generator.generate(&query, &build_context(&hits)).await {
                    Ok(answer) => println!("\nanswer:\n{answer}"),
                    Err(SearchError::GenerationUnavailable(reason)) => {
                        warn!(%reason, "answer generation unavailable; sources reported above");
                    }
                    Err(error) => return Err(anyhow::anyhow!(error.to_string())),
                }
            }
        }
        Command::List => {
            let documents = store.list();
            println!("{} document(s)", documents.len());
            for document in documents {
                println!(
                    "{} {} pages={} chunks={} ingested_at={}",
                    document.doc_id,
                    document.filename,
                    document.page_count,
                    document.chunks.len(),
                    document.ingested_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}

fn ingest_path(
    extractor: &DocumentExtractor<HttpOcrEngine>,
    store: &DocumentStore,
    path: &Path,
    chunking: ChunkingConfig,
) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();

    if path.is_dir() {
        let report = ingest_folder_best_effort(extractor, store, path, chunking)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }
        lines.push(format!(
            "ingested {} document(s), skipped {}",
            report.documents.len(),
            report.skipped_files.len()
        ));
        for document in report.documents {
            lines.push(format!(
                "  {} {} ({} chunks)",
                document.doc_id,
                document.filename,
                document.chunks.len()
            ));
        }
    } else {
        let document = ingest_file(extractor, store, path, chunking)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        lines.push(format!(
            "ingested {} {} ({} pages, {} chunks)",
            document.doc_id,
            document.filename,
            document.page_count,
            document.chunks.len()
        ));
    }

    Ok(lines)
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() <= MAX {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX).collect();
    format!("{truncated}...")
}

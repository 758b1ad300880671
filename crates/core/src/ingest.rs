use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::{input_kind, DocumentExtractor, OcrEngine};
use crate::models::Document;
use crate::store::DocumentStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;
use walkdir::WalkDir;

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn generate_doc_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("doc_{}", &hex[..12])
}

/// Ingests one document: extract pages (OCR fallback included), chunk them,
/// and append the durable record to the store. Returns the stored document.
pub fn ingest_file<O: OcrEngine>(
    extractor: &DocumentExtractor<O>,
    store: &DocumentStore,
    path: &Path,
    config: ChunkingConfig,
) -> Result<Document, IngestError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?
        .to_string();

    let checksum = digest_file(path)?;
    let pages = extractor.extract(path)?;
    let chunks = chunk_pages(&pages, config);

    let document = Document {
        doc_id: generate_doc_id(),
        filename,
        source_path: path.to_string_lossy().to_string(),
        page_count: pages.len(),
        checksum,
        ingested_at: Utc::now(),
        chunks,
    };

    info!(
        doc_id = %document.doc_id,
        pages = document.page_count,
        chunks = document.chunks.len(),
        "ingested document"
    );

    store.append(document.clone())?;
    Ok(document)
}

/// Recursively finds files with a supported extension under `folder`,
/// sorted for deterministic ingestion order.
pub fn discover_supported_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && input_kind(entry.path()).is_ok() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Ingests every supported file under `folder`, best effort: a file that
/// fails is reported and skipped, never fatal to the rest of the batch.
pub fn ingest_folder_best_effort<O: OcrEngine>(
    extractor: &DocumentExtractor<O>,
    store: &DocumentStore,
    folder: &Path,
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    let files = discover_supported_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no supported documents found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match ingest_file(extractor, store, &path, config) {
            Ok(document) => documents.push(document),
            Err(error) => skipped_files.push(SkippedFile {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}

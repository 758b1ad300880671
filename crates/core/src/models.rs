use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One retrieval granule: a contiguous segment of a single page's text.
///
/// A chunk's position within [`Document::chunks`] is its `chunk_id`; that
/// position is stable for the document's lifetime and is what index metadata
/// points back to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
}

/// Durable record of one ingested document. The document store owns these;
/// the chunk list is the source of truth for chunk text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub filename: String,
    pub source_path: String,
    pub page_count: usize,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
}

/// Pointer record stored alongside one indexed vector. Position *i* in the
/// metadata sequence corresponds to position *i* in the vector sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub doc_id: String,
    pub filename: String,
    pub page: u32,
    pub chunk_id: usize,
}

/// One ranked retrieval result with its text re-resolved from the document
/// store. `text` is empty when the index metadata went stale (document
/// removed or truncated after the last build).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub doc_id: String,
    pub filename: String,
    pub page: u32,
    pub chunk_id: usize,
    pub score: f32,
}

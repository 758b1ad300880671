pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use answer::{build_context, AnswerGenerator, ChatCompletionGenerator, GeneratorConfig};
pub use chunking::{chunk_pages, ChunkingConfig};
pub use embeddings::{
    BatchedEmbedder, CharacterTrigramEmbedder, TextEmbedder, DEFAULT_EMBEDDING_BATCH_SIZE,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, SearchError};
pub use extractor::{
    input_kind, DocumentExtractor, HttpOcrEngine, InputKind, OcrEndpointConfig, OcrEngine,
    PageText,
};
pub use index::{IndexHit, VectorIndex};
pub use ingest::{
    digest_file, discover_supported_files, ingest_file, ingest_folder_best_effort,
    IngestionReport, SkippedFile,
};
pub use models::{Chunk, ChunkMeta, Document, RetrievedChunk};
pub use orchestrator::{IndexBuildReport, RetrievalPipeline};
pub use store::DocumentStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("index build input rejected: {0}")]
    EmptyIndexInput(String),

    #[error("no documents in the store to index")]
    NoDocuments,

    #[error("index is empty; build it before searching")]
    IndexEmpty,

    #[error("query dimension mismatch: index holds {expected}-dim vectors, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index persistence failed: {0}")]
    Persist(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("answer generation unavailable: {0}")]
    GenerationUnavailable(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

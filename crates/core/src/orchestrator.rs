use crate::embeddings::{BatchedEmbedder, TextEmbedder};
use crate::error::SearchError;
use crate::index::VectorIndex;
use crate::models::{ChunkMeta, RetrievedChunk};
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Ties embedder, vector index, and document store together. All three are
/// injected at construction; nothing here is lazily created or global.
pub struct RetrievalPipeline<M: TextEmbedder> {
    store: Arc<DocumentStore>,
    index: Arc<VectorIndex>,
    embedder: BatchedEmbedder<M>,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexBuildReport {
    pub documents_indexed: usize,
    pub total_chunks: usize,
    pub index_size_bytes: u64,
}

impl<M: TextEmbedder + Send + Sync> RetrievalPipeline<M> {
    pub fn new(
        store: Arc<DocumentStore>,
        index: Arc<VectorIndex>,
        embedder: BatchedEmbedder<M>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    /// Rebuilds the index from every document currently in the store: chunk
    /// lists are flattened in store order, `chunk_id` is the position within
    /// each document, and all chunk texts go through one batched embed call.
    ///
    /// This is the single point establishing the correspondence between
    /// index metadata and the document store; re-run it whenever ingested
    /// documents change.
    pub fn build_index_blocking(&self) -> Result<IndexBuildReport, SearchError> {
        let documents = self.store.list();
        if documents.is_empty() {
            return Err(SearchError::NoDocuments);
        }

        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        for document in &documents {
            for (chunk_id, chunk) in document.chunks.iter().enumerate() {
                // Empty chunks (blank pages) embed to the zero vector, which
                // has no unit norm and sits closer to every query than any
                // dissimilar real chunk. They stay in the store so positions
                // keep their meaning, but they are never indexed.
                if chunk.text.is_empty() {
                    continue;
                }
                texts.push(chunk.text.clone());
                metadata.push(ChunkMeta {
                    doc_id: document.doc_id.clone(),
                    filename: document.filename.clone(),
                    page: chunk.page,
                    chunk_id,
                });
            }
        }

        info!(
            documents = documents.len(),
            chunks = texts.len(),
            "embedding chunks for index build"
        );
        let vectors = self.embedder.embed(&texts)?;
        self.index.build(vectors, metadata)?;

        Ok(IndexBuildReport {
            documents_indexed: documents.len(),
            total_chunks: texts.len(),
            index_size_bytes: self.index.size_on_disk(),
        })
    }

    /// Async front for [`Self::build_index_blocking`]; embedding is CPU-bound
    /// so it is moved off the async reactor.
    pub async fn build_index(&self) -> Result<IndexBuildReport, SearchError> {
        tokio::task::block_in_place(|| self.build_index_blocking())
    }

    /// Searches the index and resolves each hit's text from the document
    /// store by `(doc_id, chunk_id)`. Results keep the index's ranking
    /// order. A hit whose document is gone or whose chunk position is out of
    /// range resolves to empty text rather than an error; the index may be
    /// stale until the next build.
    pub fn retrieve(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let hits = self.index.search(query_vector, top_k)?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let text = self.resolve_chunk_text(&hit.meta);
                RetrievedChunk {
                    text,
                    doc_id: hit.meta.doc_id,
                    filename: hit.meta.filename,
                    page: hit.meta.page,
                    chunk_id: hit.meta.chunk_id,
                    score: hit.score,
                }
            })
            .collect())
    }

    fn resolve_chunk_text(&self, meta: &ChunkMeta) -> String {
        match self.store.get(&meta.doc_id) {
            Some(document) => match document.chunks.get(meta.chunk_id) {
                Some(chunk) => chunk.text.clone(),
                None => {
                    debug!(
                        doc_id = %meta.doc_id,
                        chunk_id = meta.chunk_id,
                        "stale index metadata: chunk position out of range"
                    );
                    String::new()
                }
            },
            None => {
                debug!(doc_id = %meta.doc_id, "stale index metadata: document missing");
                String::new()
            }
        }
    }

    /// The query path: embed the query text, then retrieve.
    pub fn query_blocking(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let query_vector = self.embedder.embed_query(query)?;
        self.retrieve(&query_vector, top_k)
    }

    pub async fn query(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        tokio::task::block_in_place(|| self.query_blocking(query, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{chunk_pages, ChunkingConfig};
    use crate::embeddings::CharacterTrigramEmbedder;
    use crate::extractor::PageText;
    use crate::models::{Chunk, Document};
    use chrono::Utc;
    use tempfile::tempdir;

    fn pipeline(dir: &std::path::Path) -> RetrievalPipeline<CharacterTrigramEmbedder> {
        let store = Arc::new(DocumentStore::open(&dir.join("documents.json")).unwrap());
        let index = Arc::new(VectorIndex::open(&dir.join("index")).unwrap());
        RetrievalPipeline::new(
            store,
            index,
            BatchedEmbedder::new(CharacterTrigramEmbedder::default()),
        )
    }

    fn document(doc_id: &str, filename: &str, chunks: Vec<Chunk>) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            filename: filename.to_string(),
            source_path: format!("/tmp/{filename}"),
            page_count: chunks.iter().map(|c| c.page).max().unwrap_or(0) as usize,
            checksum: "checksum".to_string(),
            ingested_at: Utc::now(),
            chunks,
        }
    }

    #[test]
    fn build_refused_for_empty_store() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let result = pipeline.build_index_blocking();
        assert!(matches!(result, Err(SearchError::NoDocuments)));
    }

    #[test]
    fn chunk_ids_restart_per_document() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .store
            .append(document(
                "doc_a",
                "a.pdf",
                vec![
                    Chunk {
                        text: "alpha text about turbines".to_string(),
                        page: 1,
                    },
                    Chunk {
                        text: "beta text about pumps".to_string(),
                        page: 2,
                    },
                ],
            ))
            .unwrap();
        pipeline
            .store
            .append(document(
                "doc_b",
                "b.pdf",
                vec![Chunk {
                    text: "gamma text about valves".to_string(),
                    page: 1,
                }],
            ))
            .unwrap();

        let report = pipeline.build_index_blocking().unwrap();
        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.total_chunks, 3);

        let hits = pipeline.query_blocking("gamma text about valves", 3).unwrap();
        assert_eq!(hits[0].doc_id, "doc_b");
        assert_eq!(hits[0].chunk_id, 0);
        assert_eq!(hits[0].text, "gamma text about valves");
    }

    #[test]
    fn retrieval_preserves_index_ranking_and_resolves_text() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .store
            .append(document(
                "doc_a",
                "a.pdf",
                vec![
                    Chunk {
                        text: "the quick brown fox jumps over the lazy dog".to_string(),
                        page: 1,
                    },
                    Chunk {
                        text: "completely unrelated treatise on medieval pottery".to_string(),
                        page: 2,
                    },
                ],
            ))
            .unwrap();
        pipeline.build_index_blocking().unwrap();

        let hits = pipeline
            .query_blocking("quick brown fox jumps", 2)
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page, 1);
        assert!(hits[0].text.contains("quick brown fox"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn stale_metadata_resolves_to_empty_text_not_error() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        // Store knows one document with a single chunk, but the index was
        // built against a larger chunk list and a second, now-removed
        // document.
        pipeline
            .store
            .append(document(
                "doc_a",
                "a.pdf",
                vec![Chunk {
                    text: "only remaining chunk".to_string(),
                    page: 1,
                }],
            ))
            .unwrap();

        let embedder = BatchedEmbedder::new(CharacterTrigramEmbedder::default());
        let vectors = embedder
            .embed(&[
                "only remaining chunk".to_string(),
                "chunk that was truncated away".to_string(),
                "chunk from a removed document".to_string(),
            ])
            .unwrap();
        pipeline
            .index
            .build(
                vectors,
                vec![
                    ChunkMeta {
                        doc_id: "doc_a".to_string(),
                        filename: "a.pdf".to_string(),
                        page: 1,
                        chunk_id: 0,
                    },
                    ChunkMeta {
                        doc_id: "doc_a".to_string(),
                        filename: "a.pdf".to_string(),
                        page: 1,
                        chunk_id: 5,
                    },
                    ChunkMeta {
                        doc_id: "doc_gone".to_string(),
                        filename: "gone.pdf".to_string(),
                        page: 1,
                        chunk_id: 0,
                    },
                ],
            )
            .unwrap();

        let hits = pipeline.query_blocking("anything at all", 3).unwrap();
        assert_eq!(hits.len(), 3);

        let by_chunk = |doc: &str, chunk: usize| {
            hits.iter()
                .find(|h| h.doc_id == doc && h.chunk_id == chunk)
                .unwrap()
                .clone()
        };
        assert_eq!(by_chunk("doc_a", 0).text, "only remaining chunk");
        assert_eq!(by_chunk("doc_a", 5).text, "");
        assert_eq!(by_chunk("doc_gone", 0).text, "");
    }

    #[test]
    fn blank_page_chunks_are_never_indexed() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        // Page 1 came back blank from extraction and OCR; page 2 has text.
        pipeline
            .store
            .append(document(
                "doc_a",
                "a.pdf",
                vec![
                    Chunk {
                        text: String::new(),
                        page: 1,
                    },
                    Chunk {
                        text: "maintenance procedure for the hydraulic pump".to_string(),
                        page: 2,
                    },
                ],
            ))
            .unwrap();

        let report = pipeline.build_index_blocking().unwrap();
        assert_eq!(report.total_chunks, 1);

        // Even a query dissimilar to the real chunk must not surface the
        // blank one: a zero vector would sit at distance 1 from every unit
        // query and outrank any genuinely unrelated text.
        let hits = pipeline
            .query_blocking("entirely unrelated gardening almanac", 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, 1);
        assert!(!hits[0].text.is_empty());
    }

    #[test]
    fn store_with_only_blank_chunks_refuses_build() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .store
            .append(document(
                "doc_blank",
                "blank.pdf",
                vec![Chunk {
                    text: String::new(),
                    page: 1,
                }],
            ))
            .unwrap();

        let result = pipeline.build_index_blocking();
        assert!(matches!(result, Err(SearchError::EmptyIndexInput(_))));
    }

    #[test]
    fn two_page_scan_end_to_end() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        // Page 1: plain extractable text well past the word budget. Page 2:
        // short text as OCR of an image page would produce.
        let page_one: String = (0..120)
            .map(|i| format!("Sentence number {i} talks about subject {}", i % 9))
            .collect::<Vec<_>>()
            .join(". ");
        let pages = vec![
            PageText {
                page: 1,
                text: page_one,
            },
            PageText {
                page: 2,
                text: "Handwritten maintenance note recovered by recognition".to_string(),
            },
        ];

        let chunks = chunk_pages(&pages, ChunkingConfig::default());
        let page_one_chunks = chunks.iter().filter(|c| c.page == 1).count();
        let page_two_chunks = chunks.iter().filter(|c| c.page == 2).count();
        assert!(page_one_chunks >= 2);
        assert_eq!(page_two_chunks, 1);

        pipeline
            .store
            .append(document("doc_scan", "scan.pdf", chunks))
            .unwrap();
        pipeline.build_index_blocking().unwrap();

        let hits = pipeline
            .query_blocking("Sentence number 3 talks about subject 3", 3)
            .unwrap();
        assert_eq!(hits[0].page, 1);
        assert!(!hits[0].text.is_empty());
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_entry_points_run_off_the_reactor() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .store
            .append(document(
                "doc_a",
                "a.pdf",
                vec![Chunk {
                    text: "asynchronous smoke test chunk".to_string(),
                    page: 1,
                }],
            ))
            .unwrap();

        pipeline.build_index().await.unwrap();
        let hits = pipeline.query("asynchronous smoke test", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}

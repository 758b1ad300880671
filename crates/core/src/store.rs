use crate::error::IngestError;
use crate::models::Document;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// Persistent mapping from document id to its metadata and chunk list.
/// Source of truth for chunk text: index metadata points back into it, so a
/// document's chunk ordering must never change after the document was
/// indexed.
///
/// Appends are durable-then-visible: the JSON file is rewritten (temp file +
/// rename) before the document appears to readers.
pub struct DocumentStore {
    path: PathBuf,
    documents: RwLock<Vec<Document>>,
}

impl DocumentStore {
    /// Opens the store backed by the given JSON file, loading any documents
    /// already recorded there.
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let documents = if path.exists() {
            let raw = fs::read_to_string(path)?;
            let documents: Vec<Document> = serde_json::from_str(&raw)?;
            info!(count = documents.len(), path = %path.display(), "loaded document store");
            documents
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            documents: RwLock::new(documents),
        })
    }

    /// Records a document durably and makes it visible to readers, returning
    /// its id. Insertion order is preserved; it is the order index builds
    /// traverse.
    pub fn append(&self, document: Document) -> Result<String, IngestError> {
        let doc_id = document.doc_id.clone();
        let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());

        let mut next = documents.clone();
        next.push(document);
        self.persist(&next)?;
        *documents = next;

        Ok(doc_id)
    }

    pub fn get(&self, doc_id: &str) -> Option<Document> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|document| document.doc_id == doc_id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Document> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, documents: &[Document]) -> Result<(), IngestError> {
        let serialized = serde_json::to_string_pretty(documents)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        if let Err(error) = fs::rename(&tmp, &self.path) {
            warn!(path = %self.path.display(), %error, "store rename failed");
            let _ = fs::remove_file(&tmp);
            return Err(IngestError::Io(error));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use chrono::Utc;
    use tempfile::tempdir;

    fn document(id: &str, chunk_count: usize) -> Document {
        Document {
            doc_id: id.to_string(),
            filename: format!("{id}.pdf"),
            source_path: format!("/tmp/{id}.pdf"),
            page_count: 1,
            checksum: "checksum".to_string(),
            ingested_at: Utc::now(),
            chunks: (0..chunk_count)
                .map(|i| Chunk {
                    text: format!("chunk {i} of {id}"),
                    page: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn append_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(&dir.path().join("documents.json")).unwrap();

        let doc_id = store.append(document("doc_a", 3)).unwrap();
        let loaded = store.get(&doc_id).expect("document should exist");

        assert_eq!(loaded.chunks.len(), 3);
        assert_eq!(loaded.filename, "doc_a.pdf");
        assert!(store.get("doc_missing").is_none());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(&dir.path().join("documents.json")).unwrap();

        store.append(document("doc_z", 1)).unwrap();
        store.append(document("doc_a", 1)).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|d| d.doc_id).collect();
        assert_eq!(ids, vec!["doc_z".to_string(), "doc_a".to_string()]);
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("documents.json");

        {
            let store = DocumentStore::open(&path).unwrap();
            store.append(document("doc_a", 2)).unwrap();
        }

        let reopened = DocumentStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("doc_a").unwrap().chunks.len(), 2);
    }
}

use crate::error::SearchError;
use crate::models::ChunkMeta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

const INDEX_FILE: &str = "index.json";
const METADATA_FILE: &str = "metadata.json";

/// One published generation of the index. Immutable once built; vectors and
/// metadata always have identical length and ordering.
#[derive(Debug)]
struct IndexSnapshot {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedVectors {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub meta: ChunkMeta,
    pub score: f32,
}

/// Exact nearest-neighbor index over chunk vectors.
///
/// Rebuild-only: `build` replaces the whole snapshot atomically, so readers
/// never observe a vector count that disagrees with the metadata count.
/// Searches take the currently published snapshot and run with unbounded
/// read concurrency; builds are serialized by a dedicated lock.
pub struct VectorIndex {
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: Mutex<()>,
    index_path: PathBuf,
    metadata_path: PathBuf,
}

impl VectorIndex {
    /// Opens the index rooted at `dir`, restoring a persisted snapshot when
    /// both artifacts load cleanly. Any read or parse error discards both
    /// and starts empty rather than failing.
    pub fn open(dir: &Path) -> Result<Self, SearchError> {
        fs::create_dir_all(dir).map_err(|error| SearchError::Persist(error.to_string()))?;

        let index = Self {
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
            index_path: dir.join(INDEX_FILE),
            metadata_path: dir.join(METADATA_FILE),
        };

        match index.load_persisted() {
            Ok(Some(snapshot)) => {
                info!(vectors = snapshot.vectors.len(), "restored persisted index");
                *index.snapshot.write().unwrap_or_else(|e| e.into_inner()) =
                    Some(Arc::new(snapshot));
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "failed to load persisted index, starting empty");
            }
        }

        Ok(index)
    }

    fn load_persisted(&self) -> Result<Option<IndexSnapshot>, SearchError> {
        if !self.index_path.exists() || !self.metadata_path.exists() {
            return Ok(None);
        }

        let raw_vectors = fs::read_to_string(&self.index_path)
            .map_err(|error| SearchError::Persist(error.to_string()))?;
        let raw_metadata = fs::read_to_string(&self.metadata_path)
            .map_err(|error| SearchError::Persist(error.to_string()))?;

        let persisted: PersistedVectors = serde_json::from_str(&raw_vectors)?;
        let metadata: Vec<ChunkMeta> = serde_json::from_str(&raw_metadata)?;

        if persisted.vectors.len() != metadata.len() {
            return Err(SearchError::Persist(format!(
                "persisted artifacts disagree: {} vectors, {} metadata entries",
                persisted.vectors.len(),
                metadata.len()
            )));
        }

        Ok(Some(IndexSnapshot {
            dimension: persisted.dimension,
            vectors: persisted.vectors,
            metadata,
        }))
    }

    /// Replaces the index with the given vectors and parallel metadata.
    /// Requires equal, non-zero lengths. The new snapshot is published
    /// atomically; persistence failure is returned as an error but leaves
    /// the in-memory index valid for the current process.
    pub fn build(&self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkMeta>) -> Result<(), SearchError> {
        if vectors.is_empty() || vectors.len() != metadata.len() {
            return Err(SearchError::EmptyIndexInput(format!(
                "{} vectors, {} metadata entries",
                vectors.len(),
                metadata.len()
            )));
        }

        let _guard = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());

        let dimension = vectors[0].len();
        let snapshot = Arc::new(IndexSnapshot {
            dimension,
            vectors,
            metadata,
        });

        info!(vectors = snapshot.vectors.len(), dimension, "built vector index");
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&snapshot));

        self.persist(&snapshot)
    }

    fn persist(&self, snapshot: &IndexSnapshot) -> Result<(), SearchError> {
        let vectors = serde_json::to_string(&PersistedVectors {
            dimension: snapshot.dimension,
            vectors: snapshot.vectors.clone(),
        })?;
        let metadata = serde_json::to_string(&snapshot.metadata)?;

        write_atomic(&self.index_path, &vectors)
            .map_err(|error| SearchError::Persist(error.to_string()))?;
        write_atomic(&self.metadata_path, &metadata)
            .map_err(|error| SearchError::Persist(error.to_string()))?;
        Ok(())
    }

    /// Brute-force exact search: squared L2 distance from the query to every
    /// stored vector, smallest first, ties kept in insertion order. Scores
    /// are `1 / (1 + distance)`.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<IndexHit>, SearchError> {
        let snapshot = {
            let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        let snapshot = snapshot.ok_or(SearchError::IndexEmpty)?;
        if snapshot.vectors.is_empty() {
            return Err(SearchError::IndexEmpty);
        }
        if query.len() != snapshot.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: snapshot.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = snapshot
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, squared_l2(query, vector)))
            .collect();

        // Stable sort keeps insertion order for equal distances.
        scored.sort_by(|left, right| left.1.total_cmp(&right.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(position, distance)| IndexHit {
                meta: snapshot.metadata[position].clone(),
                score: 1.0 / (1.0 + distance),
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|snapshot| snapshot.vectors.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte size of the persisted index artifact; 0 when none exists.
    pub fn size_on_disk(&self) -> u64 {
        fs::metadata(&self.index_path)
            .map(|meta| meta.len())
            .unwrap_or(0)
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum()
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    if let Err(error) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(error);
    }
    Ok(())
}

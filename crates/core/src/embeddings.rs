use crate::error::SearchError;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Default number of texts sent to the model per call. Bounds peak memory;
/// it must never change the output.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// An embedding model. The dimension is fixed when the model is constructed
/// and every returned vector has unit L2 norm.
pub trait TextEmbedder {
    fn dimensions(&self) -> usize;

    /// Embeds one batch of texts. Each text's vector depends only on that
    /// text, never on its neighbors in the batch.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;
}

/// Deterministic local model: hashed character trigram counts, unit-norm.
/// No weights to load and no network, which keeps query embedding cheap.
#[derive(Debug, Clone, Copy)]
pub struct CharacterTrigramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterTrigramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterTrigramEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

impl TextEmbedder for CharacterTrigramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

pub fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Batching front of an embedding model. Splits input into fixed-size
/// batches, re-normalizes every vector, and aborts the whole call if any
/// batch fails; no partial output is ever returned.
pub struct BatchedEmbedder<M: TextEmbedder> {
    model: M,
    batch_size: usize,
}

impl<M: TextEmbedder> BatchedEmbedder<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(model: M, batch_size: usize) -> Self {
        Self {
            model,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.model.dimensions()
    }

    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self.model.embed_batch(batch)?;
            if batch_vectors.len() != batch.len() {
                return Err(SearchError::EmbeddingFailure(format!(
                    "model returned {} vectors for a batch of {}",
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            for mut vector in batch_vectors {
                normalize(&mut vector);
                vectors.push(vector);
            }
        }

        Ok(vectors)
    }

    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::EmbeddingFailure("model returned no vector".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingModel;

    impl TextEmbedder for FailingModel {
        fn dimensions(&self) -> usize {
            4
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            Err(SearchError::EmbeddingFailure("model offline".to_string()))
        }
    }

    fn texts(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("text number {i} about topic {}", i % 7)).collect()
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterTrigramEmbedder::default();
        let first = embedder.embed_one("hydraulic pressure and flow");
        let second = embedder.embed_one("hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn vectors_have_unit_norm() {
        let embedder = BatchedEmbedder::new(CharacterTrigramEmbedder::default());
        let vectors = embedder.embed(&texts(5)).unwrap();

        for vector in vectors {
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let embedder = BatchedEmbedder::new(CharacterTrigramEmbedder::default());
        assert!(embedder.embed(&[]).unwrap().is_empty());
    }

    #[test]
    fn batching_does_not_change_output() {
        let input = texts(70);
        let one_batch =
            BatchedEmbedder::with_batch_size(CharacterTrigramEmbedder::default(), 1024);
        let tiny_batches = BatchedEmbedder::with_batch_size(CharacterTrigramEmbedder::default(), 3);

        assert_eq!(
            one_batch.embed(&input).unwrap(),
            tiny_batches.embed(&input).unwrap()
        );
    }

    #[test]
    fn model_failure_aborts_whole_call() {
        let embedder = BatchedEmbedder::new(FailingModel);
        let result = embedder.embed(&texts(3));
        assert!(matches!(result, Err(SearchError::EmbeddingFailure(_))));
    }

    #[test]
    fn dimension_is_fixed_at_construction() {
        let embedder = BatchedEmbedder::new(CharacterTrigramEmbedder { dimensions: 32 });
        assert_eq!(embedder.dimensions(), 32);
        let vector = embedder.embed_query("abc").unwrap();
        assert_eq!(vector.len(), 32);
    }
}

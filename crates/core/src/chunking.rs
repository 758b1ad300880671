use crate::extractor::PageText;
use crate::models::Chunk;

/// Number of trailing sentences carried into the next chunk when the word
/// budget overflows.
const OVERLAP_SENTENCES: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Word budget per chunk, counted as whitespace-delimited tokens.
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 512 }
    }
}

/// Splits every page's text into overlapping chunks. Deterministic pure
/// function of its input; pages are chunked independently and chunks never
/// cross a page boundary.
///
/// Sentence boundaries are the literal `". "` delimiter. This is a heuristic,
/// not real sentence segmentation (abbreviations and decimals break it), and
/// is kept as-is for parity with the indexed corpus.
pub fn chunk_pages(pages: &[PageText], config: ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        chunk_page(page, config, &mut chunks);
    }
    chunks
}

fn chunk_page(page: &PageText, config: ChunkingConfig, chunks: &mut Vec<Chunk>) {
    if page.text.trim().is_empty() {
        // Extraction and OCR both came back blank. Keep one empty chunk so
        // the page still has a retrieval granule with a stable position.
        chunks.push(Chunk {
            text: String::new(),
            page: page.page,
        });
        return;
    }

    let sentences: Vec<&str> = page.text.split(". ").collect();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for sentence in sentences {
        let sentence_words = word_count(sentence);

        if current_words + sentence_words > config.chunk_size && !current.is_empty() {
            chunks.push(Chunk {
                text: join_sentences(&current),
                page: page.page,
            });

            // Seed the next chunk with up to the last two sentences of the
            // one just closed, plus the sentence that overflowed the budget.
            let overlap_start = current.len().saturating_sub(OVERLAP_SENTENCES);
            let mut next: Vec<&str> = current[overlap_start..].to_vec();
            next.push(sentence);
            current_words = next.iter().map(|s| word_count(s)).sum();
            current = next;
        } else {
            current.push(sentence);
            current_words += sentence_words;
        }
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            text: join_sentences(&current),
            page: page.page,
        });
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn join_sentences(sentences: &[&str]) -> String {
    let mut text = sentences.join(". ");
    text.push('.');
    text
}

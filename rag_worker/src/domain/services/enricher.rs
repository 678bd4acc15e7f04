use std::collections::HashMap;

use super::helpers::{is_stop_word, split_sentences, tokenize};
use crate::domain::entities::{chunk::Chunk, document::Enrichment};

/// Computes the keywords and summary of a document from its chunks
pub trait Enricher: Send + Sync {
    fn enrich(&self, chunks: &[Chunk]) -> Enrichment;
}

/// Keywords are the most frequent words that are not stop words,
/// the summary is made of the first sentences of the document.
#[derive(Debug, Clone)]
pub struct KeywordEnricher {
    max_keywords: usize,
    summary_sentences: usize,
}

impl Default for KeywordEnricher {
    fn default() -> Self {
        Self::new(10, 3)
    }
}

impl KeywordEnricher {
    pub fn new(max_keywords: usize, summary_sentences: usize) -> Self {
        Self {
            max_keywords,
            summary_sentences,
        }
    }

    fn keywords(&self, chunks: &[Chunk]) -> Vec<String> {
        // word -> (count, first position)
        let mut frequencies: HashMap<String, (usize, usize)> = HashMap::new();
        let mut position = 0;

        for chunk in chunks {
            for word in tokenize(&chunk.text) {
                position += 1;
                if word.chars().count() < 3
                    || is_stop_word(&word)
                    || word.chars().all(char::is_numeric)
                {
                    continue;
                }
                frequencies.entry(word).or_insert((0, position)).0 += 1;
            }
        }

        let mut frequencies: Vec<(String, (usize, usize))> = frequencies.into_iter().collect();
        frequencies.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        });

        frequencies
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect()
    }

    fn summary(&self, chunks: &[Chunk]) -> String {
        // Chunks may overlap: the first chunk holds the start of the document
        let text = match chunks.first() {
            Some(chunk) => &chunk.text,
            None => return String::new(),
        };

        split_sentences(text)
            .into_iter()
            .take(self.summary_sentences)
            .collect::<Vec<String>>()
            .join(" ")
    }
}

impl Enricher for KeywordEnricher {
    fn enrich(&self, chunks: &[Chunk]) -> Enrichment {
        Enrichment {
            keywords: self.keywords(chunks),
            summary: self.summary(chunks),
        }
    }
}

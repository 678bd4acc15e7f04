use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use super::helpers::is_stop_word;
use crate::domain::entities::{chunk::Chunk, graph::normalize_label};

/// An entity named in a document, with the chunks mentioning it
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    pub chunk_ids: Vec<Uuid>,
}

pub trait EntityExtractor: Send + Sync {
    /// Entities of a document, most mentioned first
    fn extract(&self, chunks: &[Chunk]) -> Vec<ExtractedEntity>;

    /// Entity labels named in a free text, such as a query
    fn extract_labels(&self, text: &str) -> Vec<String>;
}

static CAPITALIZED_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\p{Lu}[\p{L}\p{N}'-]*(?:[ \t]+\p{Lu}[\p{L}\p{N}'-]*)*")
        .expect("Invalid capitalized phrase regex")
});

/// Heuristic extractor: sequences of capitalized words are entities
///
/// Leading stop words are dropped ("The Rust Foundation" is "Rust Foundation").
/// A single word entity must be mentioned at least `min_single_word_mentions` times
/// in the document, to skip most words capitalized at the start of a sentence.
#[derive(Debug, Clone)]
pub struct CapitalizedPhraseExtractor {
    max_entities: usize,
    min_single_word_mentions: usize,
}

impl Default for CapitalizedPhraseExtractor {
    fn default() -> Self {
        Self::new(50, 2)
    }
}

impl CapitalizedPhraseExtractor {
    pub fn new(max_entities: usize, min_single_word_mentions: usize) -> Self {
        Self {
            max_entities,
            min_single_word_mentions,
        }
    }

    fn phrases(text: &str) -> Vec<String> {
        CAPITALIZED_PHRASE_RE
            .find_iter(text)
            .filter_map(|phrase| {
                let words: Vec<&str> = phrase
                    .as_str()
                    .split_whitespace()
                    .skip_while(|word| is_stop_word(&word.to_lowercase()))
                    .collect();
                let phrase = words.join(" ");

                (phrase.chars().count() >= 3).then_some(phrase)
            })
            .collect()
    }
}

struct Candidate {
    name: String,
    mentions: usize,
    first_seen: usize,
    chunk_ids: Vec<Uuid>,
}

impl EntityExtractor for CapitalizedPhraseExtractor {
    fn extract(&self, chunks: &[Chunk]) -> Vec<ExtractedEntity> {
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut seen = 0;

        for chunk in chunks {
            for phrase in Self::phrases(&chunk.text) {
                seen += 1;
                let candidate = candidates
                    .entry(normalize_label(&phrase))
                    .or_insert_with(|| Candidate {
                        name: phrase.clone(),
                        mentions: 0,
                        first_seen: seen,
                        chunk_ids: vec![],
                    });
                candidate.mentions += 1;
                if !candidate.chunk_ids.contains(&chunk.id) {
                    candidate.chunk_ids.push(chunk.id);
                }
            }
        }

        let mut candidates: Vec<Candidate> = candidates
            .into_values()
            .filter(|candidate| {
                candidate.name.contains(' ') || candidate.mentions >= self.min_single_word_mentions
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.mentions
                .cmp(&a.mentions)
                .then(a.first_seen.cmp(&b.first_seen))
        });

        candidates
            .into_iter()
            .take(self.max_entities)
            .map(|candidate| ExtractedEntity {
                name: candidate.name,
                chunk_ids: candidate.chunk_ids,
            })
            .collect()
    }

    fn extract_labels(&self, text: &str) -> Vec<String> {
        let mut labels: Vec<String> = vec![];

        for phrase in Self::phrases(text) {
            let label = normalize_label(&phrase);
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        labels
    }
}

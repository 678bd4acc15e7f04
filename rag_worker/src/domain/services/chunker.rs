use std::sync::Arc;

use common::helper::error_chain_fmt;

use super::helpers::{char_offset, sentence_spans};
use crate::{
    configuration::{ChunkerKind, ChunkingSettings},
    domain::entities::{
        chunk::{Chunk, ChunkMetadata},
        parsed_document::ParsedDocument,
    },
};

/// Splits a parsed document into ordered chunks
pub trait Chunker: Send + Sync {
    fn name(&self) -> &str;
    fn chunk(&self, document: &ParsedDocument) -> Vec<Chunk>;
}

pub fn build_chunker(settings: &ChunkingSettings) -> Result<Arc<dyn Chunker>, ChunkerError> {
    let chunker: Arc<dyn Chunker> = match settings.kind {
        ChunkerKind::Fixed => Arc::new(FixedSizeChunker::try_new(
            settings.chunk_size,
            settings.chunk_overlap,
        )?),
        ChunkerKind::Sentence => Arc::new(SentenceChunker::try_new(settings.chunk_size)?),
    };

    Ok(chunker)
}

/// Windows of `chunk_size` chars, each one starting `chunk_size - overlap` chars after the previous one
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    pub fn try_new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                overlap,
                chunk_size,
            });
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Char ranges of the windows over `length` chars
    fn windows(&self, length: usize) -> Vec<(usize, usize)> {
        let step = self.chunk_size - self.overlap;
        let mut windows = vec![];
        let mut start = 0;

        while start < length {
            let end = (start + self.chunk_size).min(length);
            windows.push((start, end));
            if end == length {
                break;
            }
            start += step;
        }

        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn chunk(&self, document: &ParsedDocument) -> Vec<Chunk> {
        let chars: Vec<char> = document.content.chars().collect();

        self.windows(chars.len())
            .into_iter()
            .enumerate()
            .map(|(ordinal, (start, end))| {
                Chunk::new(
                    document.id,
                    document.workspace_id,
                    ordinal as u32,
                    chars[start..end].iter().collect(),
                    ChunkMetadata {
                        start_offset: start,
                        end_offset: end,
                        chunker: self.name().to_string(),
                    },
                )
            })
            .collect()
    }
}

/// Groups consecutive sentences in chunks of at most `chunk_size` chars
///
/// A sentence longer than `chunk_size` is cut in fixed windows.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
}

impl SentenceChunker {
    pub fn try_new(chunk_size: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::InvalidChunkSize);
        }

        Ok(Self { chunk_size })
    }

    /// Char ranges of the chunks
    fn spans(&self, content: &str) -> Vec<(usize, usize)> {
        let sentences: Vec<(usize, usize)> = sentence_spans(content)
            .into_iter()
            .map(|(start, end)| (char_offset(content, start), char_offset(content, end)))
            .collect();

        let mut spans: Vec<(usize, usize)> = vec![];
        let mut current: Option<(usize, usize)> = None;

        for (start, end) in sentences {
            if end - start > self.chunk_size {
                if let Some(span) = current.take() {
                    spans.push(span);
                }
                let mut window_start = start;
                while window_start < end {
                    let window_end = (window_start + self.chunk_size).min(end);
                    spans.push((window_start, window_end));
                    window_start = window_end;
                }
                continue;
            }

            current = match current {
                Some((current_start, _)) if end - current_start <= self.chunk_size => {
                    Some((current_start, end))
                }
                Some(span) => {
                    spans.push(span);
                    Some((start, end))
                }
                None => Some((start, end)),
            };
        }

        if let Some(span) = current {
            spans.push(span);
        }

        spans
    }
}

impl Chunker for SentenceChunker {
    fn name(&self) -> &str {
        "sentence"
    }

    fn chunk(&self, document: &ParsedDocument) -> Vec<Chunk> {
        let chars: Vec<char> = document.content.chars().collect();

        self.spans(&document.content)
            .into_iter()
            .enumerate()
            .map(|(ordinal, (start, end))| {
                let text: String = chars[start..end].iter().collect();
                Chunk::new(
                    document.id,
                    document.workspace_id,
                    ordinal as u32,
                    text.trim().to_string(),
                    ChunkMetadata {
                        start_offset: start,
                        end_offset: end,
                        chunker: self.name().to_string(),
                    },
                )
            })
            .collect()
    }
}

#[derive(thiserror::Error)]
pub enum ChunkerError {
    #[error("Chunk size must be strictly positive")]
    InvalidChunkSize,
    #[error("Chunk overlap ({overlap}) must be smaller than the chunk size ({chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },
}

impl std::fmt::Debug for ChunkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

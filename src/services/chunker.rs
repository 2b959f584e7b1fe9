//! Recursive separator text splitter.
//!
//! Text is split on the coarsest separator present (paragraphs, then lines,
//! then words, then characters), and adjacent pieces are merged back into
//! chunks of at most `chunk_size` characters with up to `chunk_overlap`
//! characters shared between neighbours.

use std::collections::VecDeque;

use crate::error::ConfigError;
use crate::models::{Document, DocumentChunk};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "CHUNK_OVERLAP".to_string(),
                message: format!(
                    "overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
                ),
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    /// Split a document, recording each chunk's character offset.
    ///
    /// A chunk starts no earlier than `chunk_overlap` characters before the
    /// previous chunk's end, and strictly after the previous chunk's start.
    pub fn split_document(&self, document: &Document) -> Vec<DocumentChunk> {
        let text = document.content.as_str();
        let byte_offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut chunks = Vec::new();
        let mut previous: Option<(usize, usize)> = None;

        for (i, content) in self.split_text(text).into_iter().enumerate() {
            let from_char = match previous {
                Some((start, len)) => (start + len)
                    .saturating_sub(self.chunk_overlap)
                    .max(start + 1),
                None => 0,
            };
            let from_byte = byte_offsets.get(from_char).copied().unwrap_or(text.len());

            let start_index = match text[from_byte..].find(content.as_str()) {
                Some(found) => from_char + char_len(&text[from_byte..from_byte + found]),
                None => from_char,
            };
            previous = Some((start_index, char_len(&content)));

            chunks.push(DocumentChunk::from_document(
                document,
                content,
                i as u32,
                start_index,
            ));
        }
        chunks
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut chunks, piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, window.iter().copied().collect());
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if !window.is_empty() {
            push_trimmed(&mut chunks, window.iter().copied().collect());
        }
        chunks
    }
}

/// Split so that each separator stays at the start of the piece that follows it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(separator) {
        if i > start {
            pieces.push(&text[start..i]);
        }
        start = i;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: String) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(word: &str, words: usize) -> String {
        vec![word; words].join(" ")
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 20).is_ok());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = TextSplitter::default();
        assert_eq!(splitter.split_text("  hello world \n"), vec!["hello world"]);
        assert!(splitter.split_text("   \n\n ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = format!(
            "{}\n\n{}\n{}",
            paragraph("alpha", 20),
            paragraph("beta", 15),
            "x".repeat(120)
        );
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn test_neighbouring_chunks_overlap() {
        let splitter = TextSplitter::new(30, 10).unwrap();
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = splitter.split_text(text);
        assert!(chunks.len() >= 2);
        let first_tail = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].contains(first_tail));
    }

    #[test]
    fn test_start_index_points_at_chunk() {
        let splitter = TextSplitter::new(40, 10).unwrap();
        let content = format!(
            "Título uno.\n\n{}\n\n{}",
            paragraph("ñandú", 12),
            paragraph("zeta", 10)
        );
        let doc = Document::new(content.clone(), "/docs/a.txt");
        let chunks = splitter.split_document(&doc);

        assert!(chunks.len() > 2);
        let chars: Vec<char> = content.chars().collect();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index as usize, i);
            let len = chunk.content.chars().count();
            let at: String = chars[chunk.start_index..chunk.start_index + len]
                .iter()
                .collect();
            assert_eq!(at, chunk.content);
        }
        assert!(chunks.windows(2).all(|w| w[0].start_index < w[1].start_index));
    }

    #[test]
    fn test_start_index_with_repeated_text() {
        let splitter = TextSplitter::new(100, 20).unwrap();
        let doc = Document::new("word ".repeat(60), "/docs/words.txt");
        let starts: Vec<usize> = splitter
            .split_document(&doc)
            .iter()
            .map(|c| c.start_index)
            .collect();
        assert_eq!(starts, vec![0, 80, 160, 240]);
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(
            split_keeping_separator("a b  c", " "),
            vec!["a", " b", " ", " c"]
        );
        assert_eq!(split_keeping_separator("añ", ""), vec!["a", "ñ"]);
    }
}

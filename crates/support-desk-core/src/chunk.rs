//! Fixed-size, overlapping text chunker.
//!
//! Splits document text into windows of at most `size` characters where
//! each consecutive pair of windows shares exactly `overlap` characters.
//! Lengths are counted in Unicode scalar values, so a window never ends
//! inside a multi-byte character.
//!
//! # Algorithm
//!
//! 1. `step = size - overlap` (requires `overlap < size`).
//! 2. Window `i` covers chars `[i * step, min(i * step + size, len))`.
//! 3. Stop after the first window that reaches the end of the text.
//!
//! Because every non-final window is exactly `size` chars long, the next
//! window starts `overlap` chars before it ends. The final window may be
//! shorter but is always longer than `overlap`, so dropping the first
//! `overlap` chars of every window after the first reproduces the input
//! exactly (see [`reassemble`]).
//!
//! # Example
//!
//! ```rust
//! use support_desk_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(10, 4).unwrap();
//! let spans: Vec<&str> = chunker.spans("abcdefghijklmnop").map(|s| s.text).collect();
//! assert_eq!(spans, vec!["abcdefghij", "ghijklmnop"]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{DeskError, Result};
use crate::models::{Chunk, Document};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. Fails with [`DeskError::Configuration`] when
    /// `size` is zero or `overlap >= size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(DeskError::config("chunk size must be > 0"));
        }
        if overlap >= size {
            return Err(DeskError::config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily iterate over the windows of `text`.
    ///
    /// The iterator is `Clone`; cloning it (or calling `spans` again)
    /// restarts the sequence. Empty text yields nothing.
    pub fn spans<'a>(&self, text: &'a str) -> Spans<'a> {
        Spans {
            text,
            size: self.size,
            step: self.size - self.overlap,
            byte_pos: 0,
            char_pos: 0,
            index: 0,
            done: text.is_empty(),
        }
    }

    /// Materialize the chunks of a document with deterministic ids.
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        self.spans(&doc.text)
            .map(|span| make_chunk(&doc.id, span))
            .collect()
    }
}

/// One window produced by [`Chunker::spans`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    pub index: usize,
    /// Offset of the first char of `text`, in chars.
    pub start: usize,
    pub text: &'a str,
}

/// Iterator over the windows of a text. See [`Chunker::spans`].
#[derive(Debug, Clone)]
pub struct Spans<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    byte_pos: usize,
    char_pos: usize,
    index: usize,
    done: bool,
}

impl<'a> Iterator for Spans<'a> {
    type Item = Span<'a>;

    fn next(&mut self) -> Option<Span<'a>> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.byte_pos..];
        let end = byte_offset(rest, self.size);
        let span = Span {
            index: self.index,
            start: self.char_pos,
            text: &rest[..end],
        };

        if end == rest.len() {
            self.done = true;
        } else {
            self.byte_pos += byte_offset(rest, self.step);
            self.char_pos += self.step;
        }
        self.index += 1;
        Some(span)
    }
}

impl std::iter::FusedIterator for Spans<'_> {}

/// Byte length of the first `chars` characters of `s` (or all of `s`).
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Rebuild the original text from consecutive chunks of one document.
///
/// Chunks must be in index order and produced with the given `overlap`.
pub fn reassemble<'a, I>(chunks: I, overlap: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for (i, text) in chunks.into_iter().enumerate() {
        if i == 0 {
            out.push_str(text);
        } else {
            let skip = byte_offset(text, overlap);
            out.push_str(&text[skip..]);
        }
    }
    out
}

/// Deterministic chunk id: a name-based UUID of `document_id:index`.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", document_id, index).as_bytes(),
    )
    .to_string()
}

fn make_chunk(document_id: &str, span: Span<'_>) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(span.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, span.index),
        document_id: document_id.to_string(),
        chunk_index: span.index as i64,
        start: span.start,
        text: span.text.to_string(),
        hash,
    }
}

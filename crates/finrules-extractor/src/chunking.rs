//! Sentence-aware text chunking
//!
//! Text is cut into windows of `target_size` characters. Before cutting, the
//! window is searched backwards for a sentence terminator followed by
//! whitespace; a terminator in the second half of the window moves the cut
//! there. The next window starts `overlap` characters before the cut, so
//! adjacent chunks share context.
//!
//! All offsets are character offsets, not byte offsets.

use finrules_domain::Chunk;

/// Characters that end a sentence when followed by whitespace
pub const SENTENCE_TERMINATORS: [char; 5] = ['.', '!', '?', '؟', '۔'];

/// A chunk of text with its character range in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Trimmed chunk text
    pub text: String,
    /// First character of the window
    pub start: usize,
    /// One past the last character of the window
    pub end: usize,
}

/// Splits text into overlapping, sentence-aware chunks
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    target_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; a zero target size is treated as 1
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size: target_size.max(1),
            overlap,
        }
    }

    /// Chunk texts in order, whitespace-only chunks dropped
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.spans(text).into_iter().map(|s| s.text).collect()
    }

    /// Chunks with their source ranges
    pub fn spans(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        self.windows(&chars)
            .filter_map(|(start, end)| {
                let window: String = chars[start..end].iter().collect();
                let trimmed = window.trim();
                (!trimmed.is_empty()).then(|| TextSpan {
                    text: trimmed.to_string(),
                    start,
                    end,
                })
            })
            .collect()
    }

    /// Chunks of a document, ready for indexing
    ///
    /// Text that fits in one window becomes a single `{document_id}_full`
    /// chunk; otherwise chunks are numbered `{document_id}_{index}`.
    pub fn chunk_document(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        if text.chars().count() <= self.target_size {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            return vec![Chunk::whole(document_id, trimmed)];
        }

        self.spans(text)
            .into_iter()
            .enumerate()
            .map(|(index, span)| Chunk::new(document_id, index, span.text, span.start, span.end))
            .collect()
    }

    fn windows<'a>(&self, chars: &'a [char]) -> Windows<'a> {
        Windows {
            chars,
            target_size: self.target_size,
            overlap: self.overlap,
            start: 0,
            done: chars.is_empty(),
        }
    }
}

/// Raw `(start, end)` windows, before trimming
struct Windows<'a> {
    chars: &'a [char],
    target_size: usize,
    overlap: usize,
    start: usize,
    done: bool,
}

impl Windows<'_> {
    /// Cut point just after the last terminator in the second half of the window
    fn sentence_cut(&self, end: usize) -> Option<usize> {
        let midpoint = self.start + self.target_size / 2;
        (midpoint..end).rev().find_map(|i| {
            let terminator = SENTENCE_TERMINATORS.contains(&self.chars[i]);
            let followed_by_space = self.chars.get(i + 1).is_some_and(|c| c.is_whitespace());
            (terminator && followed_by_space).then_some(i + 1)
        })
    }
}

impl Iterator for Windows<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = self.chars.len();
        let start = self.start;
        let end = (start + self.target_size).min(len);
        let cut = if end < len {
            self.sentence_cut(end).unwrap_or(end)
        } else {
            end
        };

        if cut >= len {
            self.done = true;
        } else {
            // Always move forward, even when the overlap reaches back past `start`
            self.start = cut.saturating_sub(self.overlap).max(start + 1);
        }

        Some((start, cut))
    }
}


use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Configuration for the character splitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,
    /// Separator the text is first split on
    pub separator: String,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separator: "\n".to_string(),
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` on the separator and merge the pieces into chunks
///
/// Pieces are packed greedily while the joined length stays within
/// `chunk_size`. When a chunk is emitted, leading pieces are dropped until at
/// most `chunk_overlap` characters carry over. A single piece longer than
/// `chunk_size` becomes its own chunk. Chunks are trimmed and empty ones
/// dropped.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let separator = config.separator.as_str();
    let separator_len = char_len(separator);

    let splits: Vec<&str> = if separator.is_empty() {
        vec![text]
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    };

    let join = |pieces: &VecDeque<&str>| -> Option<String> {
        let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for split in splits {
        let len = char_len(split);
        let joiner = if current.is_empty() { 0 } else { separator_len };

        if total + len + joiner > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    "Created a chunk of size {}, which is longer than the specified {}",
                    total, config.chunk_size
                );
            }

            if !current.is_empty() {
                chunks.extend(join(&current));

                while total > config.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { separator_len }
                            > config.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { separator_len };
                }
            }
        }

        let joiner = if current.is_empty() { 0 } else { separator_len };
        current.push_back(split);
        total += len + joiner;
    }

    chunks.extend(join(&current));
    chunks
}

/// Split a document into pages on form feed characters
///
/// Returns `(page number, text)` pairs with 1-based page numbers. Blank pages
/// keep their number so later pages are not renumbered.
#[inline]
pub fn split_pages(document: &str) -> Vec<(i32, String)> {
    document
        .split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(index, page)| (index as i32 + 1, page.to_string()))
        .collect()
}

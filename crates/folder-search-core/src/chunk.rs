//! Fixed-size sliding-window text chunker.
//!
//! Splits a file's text into overlapping windows measured in characters
//! (Unicode scalar values, never bytes) and assigns each window a
//! deterministic identifier derived from the file path and its 1-based
//! position. Re-chunking unchanged content therefore yields identical IDs,
//! which lets the vector index overwrite in place and lets a folder's chunks
//! be found again by ID prefix.
//!
//! # Algorithm
//!
//! 1. `step = size - overlap`.
//! 2. Window *i* covers `[i·step, min(i·step + size, len))`.
//! 3. Stop after the first window that reaches the end of the text, so no
//!    window is fully contained in its predecessor.
//! 4. Empty text yields no chunks.
//!
//! # Example
//!
//! ```rust
//! use folder_search_core::chunk::{chunk_file, ChunkParams};
//!
//! let text = "a".repeat(600);
//! let chunks = chunk_file("notes/a.txt", &text, &ChunkParams::default());
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].id, "notes/a.txt-chunk-2");
//! ```

use crate::models::{Chunk, ChunkMetadata};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Build the identifier of the `n`-th (1-based) chunk of `file_path`.
pub fn chunk_id(file_path: &str, chunk_number: u32) -> String {
    format!("{}-chunk-{}", file_path, chunk_number)
}

/// Split `text` into overlapping windows.
///
/// `overlap` must be smaller than `size`; an overlap that would stall the
/// window is clamped so the window always advances by at least one
/// character.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<String> {
    if text.is_empty() || params.size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = params.size.saturating_sub(params.overlap).max(1);
    let mut windows = Vec::with_capacity(chars.len() / step + 1);
    let mut start = 0;

    loop {
        let end = (start + params.size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

/// Chunk a file's content and attach IDs and metadata.
pub fn chunk_file(file_path: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    chunk_text(text, params)
        .into_iter()
        .enumerate()
        .map(|(i, document)| {
            let chunk_number = (i + 1) as u32;
            Chunk {
                id: chunk_id(file_path, chunk_number),
                document,
                metadata: ChunkMetadata {
                    file_path: file_path.to_string(),
                    chunk_number,
                },
            }
        })
        .collect()
}

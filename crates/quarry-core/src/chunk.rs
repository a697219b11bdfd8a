//! Fixed-size overlapping text chunker.
//!
//! Splits document text into [`DocumentChunk`]s of `chunk_size`
//! characters, each window starting `chunk_size - overlap` characters
//! after the previous one. Chunk *i* covers
//! `[i·(C−O), min(i·(C−O) + C, len))` in character offsets, and the
//! split stops once a chunk reaches the end of the text.
//!
//! Offsets are character offsets, not byte offsets; slicing always
//! lands on UTF-8 boundaries. The split is deterministic and stamps
//! every chunk with the total chunk count once it completes.
//!
//! Empty text produces no chunks — rejecting empty content is the
//! document store's job, not the chunker's.

use crate::models::{chunk_id, DocumentChunk};

/// Default chunk window, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between adjacent chunks, in characters.
pub const DEFAULT_OVERLAP: usize = 50;

/// Split text into overlapping chunks for a document.
///
/// # Guarantees
///
/// - Chunk offsets monotonically increase and their union covers
///   `[0, len)` for non-empty text.
/// - Adjacent chunks overlap by exactly `overlap` characters (except
///   the final chunk, which may be shorter than `chunk_size`).
/// - `total_chunks` on every chunk equals the returned length.
/// - Identical input yields identical output.
///
/// A zero `chunk_size` yields no chunks, and an `overlap` at or above
/// `chunk_size` is clamped so the window still advances; configuration
/// loading rejects both shapes before well-behaved callers reach here.
pub fn split_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    if chunk_size == 0 || text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the text,
    // so char-offset windows can slice without re-scanning.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut windows: Vec<(usize, usize)> = Vec::new();
    let mut index = 0usize;
    loop {
        let start = index * step;
        if start >= len {
            break;
        }
        let end = (start + chunk_size).min(len);
        windows.push((start, end));
        if end == len {
            break;
        }
        index += 1;
    }

    let total = windows.len();
    windows
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| DocumentChunk {
            id: chunk_id(document_id, i),
            document_id: document_id.to_string(),
            content: text[bounds[start]..bounds[end]].to_string(),
            start_offset: start,
            end_offset: end,
            embedding: None,
            chunk_index: i,
            total_chunks: total,
        })
        .collect()
}

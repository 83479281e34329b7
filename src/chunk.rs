//! Paragraph-boundary text chunker with overlapping hard splits.
//!
//! Splits a record body into [`Chunk`]s that respect `max_tokens`. Paragraphs
//! (`\n\n`) are packed together while they fit. A paragraph that is too large
//! on its own is hard-split on spaces, and each piece after the first repeats
//! up to `overlap_tokens` of the previous piece's tail so that a sentence cut
//! at a boundary is still retrievable from either side. Harvested bodies are
//! flattened to one line, so in practice most records take the hard-split
//! path.
//!
//! Each chunk gets a fresh UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks, respecting `max_tokens` per chunk.
/// Returns chunks with contiguous indices starting at 0.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 2);

    if text.trim().is_empty() {
        return vec![make_chunk(document_id, 0, text.trim())];
    }

    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(document_id, chunk_index, &current_buf));
            chunk_index += 1;
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            for piece in hard_split(trimmed, max_chars, overlap_chars) {
                chunks.push(make_chunk(document_id, chunk_index, piece));
                chunk_index += 1;
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(document_id, chunk_index, &current_buf));
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text.trim()));
    }

    chunks
}

/// Cut `text` into pieces of at most `max_chars` bytes, preferring to break
/// after a space or newline, with `overlap_chars` carried into the next piece.
fn hard_split(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<&str> {
    let len = text.len();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < len {
        let mut limit = floor_char_boundary(text, start + max_chars);
        if limit <= start {
            limit = ceil_char_boundary(text, start + 1);
        }

        let end = if limit < len {
            text[start..limit]
                .rfind(|c: char| c == ' ' || c == '\n')
                .map(|pos| start + pos + 1)
                .filter(|&e| e > start)
                .unwrap_or(limit)
        } else {
            len
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        if end >= len {
            break;
        }

        // Step back into the previous piece, then forward to a word start.
        let back = floor_char_boundary(text, end.saturating_sub(overlap_chars));
        let next = text[back..end]
            .find(' ')
            .map(|pos| back + pos + 1)
            .filter(|&n| n < end)
            .unwrap_or(back);
        start = if overlap_chars > 0 && next > start {
            next
        } else {
            end
        };
    }

    pieces
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

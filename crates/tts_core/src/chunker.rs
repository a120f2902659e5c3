//! Sentence-aware text splitting
//!
//! Splits text that is too long for a provider into ordered chunks that each
//! fit the provider's limit. Sentence boundaries are preferred; units that are
//! still too long are cut into fixed-size pieces by code point.
//!
//! ```
//! use tts_core::chunker::split;
//!
//! let chunks = split(&"a".repeat(25), 10).unwrap();
//! assert_eq!(chunks, vec!["a".repeat(10), "a".repeat(10), "a".repeat(5)]);
//! ```

use thiserror::Error;

use crate::error::GeneratedError;
use crate::telemetry::{EventName, TelemetryEvent, TelemetrySink};

/// Characters that end a sentence when followed by whitespace
const SENTENCE_TERMINATORS: &[char] = &[
    '.', '!', '?', '…', '‼', '⁇', '。', '！', '？', '．', '؟', '۔', '।', '॥', '።',
];

/// Errors produced by [`split`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// The limit was zero
    #[error("max_length must be a positive integer, got {0}")]
    InvalidMaxLength(usize),
}

impl From<ChunkError> for GeneratedError {
    fn from(err: ChunkError) -> Self {
        Self::validation(err.to_string())
    }
}

/// Split `text` into chunks of at most `max_length` characters
///
/// Leading and trailing whitespace is ignored. Empty input yields no chunks;
/// input that already fits yields exactly one chunk.
pub fn split(text: &str, max_length: usize) -> Result<Vec<String>, ChunkError> {
    if max_length == 0 {
        return Err(ChunkError::InvalidMaxLength(max_length));
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if char_len(trimmed) <= max_length {
        return Ok(vec![trimmed.to_string()]);
    }

    let units = sentence_units(trimmed)
        .into_iter()
        .flat_map(|unit| hard_split(unit, max_length));

    Ok(pack(units, max_length))
}

/// Same as [`split`], reporting a `text.split` event when more than one chunk
/// is produced
pub fn split_observed(
    text: &str,
    max_length: usize,
    telemetry: &dyn TelemetrySink,
) -> Result<Vec<String>, ChunkError> {
    let chunks = split(text, max_length)?;

    if chunks.len() > 1 {
        let total: usize = chunks.iter().map(|chunk| char_len(chunk)).sum();
        telemetry.emit(
            &TelemetryEvent::new(EventName::TextSplit)
                .measurement("chunk_count", chunks.len())
                .measurement("original_length", char_len(text))
                .measurement("max_length", max_length)
                .measurement("total_chunk_length", total),
        );
    }

    Ok(chunks)
}

/// Length in Unicode scalar values
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Cut text after every terminator that is followed by whitespace
fn sentence_units(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&ch) {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                let unit = text[start..next_idx].trim();
                if !unit.is_empty() {
                    units.push(unit);
                }
                start = idx + ch.len_utf8();
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        units.push(tail);
    }
    units
}

/// Cut a unit into pieces of exactly `max_length` characters, the last piece
/// holding the remainder. Whitespace at piece edges is dropped so no piece is
/// blank.
fn hard_split(unit: &str, max_length: usize) -> Vec<String> {
    if char_len(unit) <= max_length {
        return vec![unit.to_string()];
    }

    let chars: Vec<char> = unit.chars().collect();
    chars
        .chunks(max_length)
        .map(|piece| piece.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Greedily pack units into chunks, joining units inside a chunk with one space
fn pack(units: impl Iterator<Item = String>, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units {
        let unit_len = char_len(&unit);
        if unit_len == 0 {
            continue;
        }

        if current.is_empty() && unit_len <= max_length {
            current = unit;
            current_len = unit_len;
        } else if !current.is_empty() && current_len + 1 + unit_len <= max_length {
            current.push(' ');
            current.push_str(&unit);
            current_len += 1 + unit_len;
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = unit;
            current_len = unit_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

//! Audio reassembly
//!
//! Joins per-chunk audio by appending bytes. No container awareness: the
//! result is only playable for formats whose streams can be concatenated
//! (MP3, raw PCM, μ-law).

use crate::error::{ErrorCode, GeneratedError};
use crate::types::{AudioData, AudioFormat};

/// Concatenate `segments` in order
///
/// Empty input yields an empty buffer in `format`; a single segment is
/// returned unchanged.
///
/// # Errors
///
/// Returns `invalid_provider_result` when a segment's format differs from the
/// first segment's. No partial output is produced.
pub fn concatenate(
    format: AudioFormat,
    mut segments: Vec<AudioData>,
) -> Result<AudioData, GeneratedError> {
    match segments.len() {
        0 => return Ok(AudioData::empty(format)),
        1 => return Ok(segments.remove(0)),
        _ => {},
    }

    let first = &segments[0];
    if let Some((index, odd)) = segments
        .iter()
        .enumerate()
        .find(|(_, segment)| segment.format() != first.format())
    {
        return Err(GeneratedError::new(
            ErrorCode::InvalidProviderResult,
            format!(
                "Cannot concatenate audio: segment {index} is {}, expected {}",
                odd.format(),
                first.format()
            ),
        ));
    }

    let capacity = segments.iter().map(AudioData::size_bytes).sum();
    let joined = AudioData::new(AudioData::join_bytes(segments.iter(), capacity), first.format());
    Ok(match first.sample_rate() {
        Some(rate) => joined.with_sample_rate(rate),
        None => joined,
    })
}

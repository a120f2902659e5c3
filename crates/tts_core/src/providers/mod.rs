//! Vendor integrations
//!
//! One [`TtsProvider`] implementation per [`ProviderId`].

pub mod azure;
pub mod elevenlabs;
pub mod google;
pub mod openai;
pub mod playht;
pub mod polly;
mod sigv4;

use std::sync::Arc;

pub use azure::AzureProvider;
pub use elevenlabs::ElevenLabsProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use playht::PlayHtProvider;
pub use polly::PollyProvider;

use crate::ports::TtsProvider;
use crate::types::ProviderId;

/// The built-in implementation for `id`
#[must_use]
pub fn builtin(id: ProviderId) -> Arc<dyn TtsProvider> {
    match id {
        ProviderId::OpenAi => Arc::new(OpenAiProvider::new()),
        ProviderId::ElevenLabs => Arc::new(ElevenLabsProvider::new()),
        ProviderId::Google => Arc::new(GoogleProvider::new()),
        ProviderId::Azure => Arc::new(AzureProvider::new()),
        ProviderId::Polly => Arc::new(PollyProvider::new()),
        ProviderId::PlayHt => Arc::new(PlayHtProvider::new()),
    }
}

/// Locale prefix of a `xx-YY-Name` style voice id
pub(crate) fn voice_locale(voice: &str) -> Option<&str> {
    let (idx, _) = voice.match_indices('-').nth(1)?;
    let locale = &voice[..idx];
    locale
        .split('-')
        .all(|part| (2..=3).contains(&part.len()) && part.chars().all(|c| c.is_ascii_alphabetic()))
        .then_some(locale)
}

//! PlayHT provider
//!
//! Registered so that requests naming it validate and report a clear error.
//! Synthesis is not implemented.

use async_trait::async_trait;

use crate::error::GeneratedError;
use crate::ports::{ProviderContext, ProviderParams, TtsProvider};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceInfo,
};

const MAX_TEXT_LENGTH: usize = 20_000;

/// PlayHT placeholder
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayHtProvider;

impl PlayHtProvider {
    /// Create the provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TtsProvider for PlayHtProvider {
    fn id(&self) -> ProviderId {
        ProviderId::PlayHt
    }

    async fn generate(
        &self,
        _params: &ProviderParams,
        _ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError> {
        Err(GeneratedError::not_implemented("PlayHT synthesis is not implemented")
            .with_provider(self.id()))
    }

    fn models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo::new("Play3.0-mini", "Play 3.0 mini", MaxTextLength::Limited(MAX_TEXT_LENGTH)),
            ModelInfo::new("PlayDialog", "Play Dialog", MaxTextLength::Limited(MAX_TEXT_LENGTH)),
        ]
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn languages(&self) -> Vec<LanguageInfo> {
        vec![LanguageInfo::new("en-US", "English (US)")]
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming_supported: false,
            supported_formats: vec![
                AudioFormat::Mp3,
                AudioFormat::Wav,
                AudioFormat::Ogg,
                AudioFormat::Flac,
                AudioFormat::Ulaw,
            ],
            supported_sample_rates: vec![8_000, 16_000, 24_000, 44_100, 48_000],
            max_text_length: MaxTextLength::Limited(MAX_TEXT_LENGTH),
        }
    }
}

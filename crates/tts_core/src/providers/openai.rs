//! OpenAI speech provider
//!
//! Calls `POST {base}/audio/speech` with bearer authentication and returns the
//! raw audio body.
//!
//! # Supported formats
//! - mp3, opus, aac, flac, wav, pcm (24 kHz)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::GeneratedError;
use crate::http;
use crate::ports::{ProviderContext, ProviderParams, TtsProvider, check_membership, validate_common};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceGender, VoiceInfo,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "nova";
const MAX_TEXT_LENGTH: usize = 4096;
const OUTPUT_SAMPLE_RATE: u32 = 24_000;

const MODELS: &[&str] = &["tts-1", "tts-1-hd", "gpt-4o-mini-tts"];
const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer", "verse",
];

/// OpenAI text-to-speech
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiProvider;

impl OpenAiProvider {
    /// Create the provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Vendor `response_format` for an output format
    const fn response_format(format: AudioFormat) -> Option<&'static str> {
        match format {
            AudioFormat::Mp3 => Some("mp3"),
            AudioFormat::Opus => Some("opus"),
            AudioFormat::Aac => Some("aac"),
            AudioFormat::Flac => Some("flac"),
            AudioFormat::Wav => Some("wav"),
            AudioFormat::Pcm => Some("pcm"),
            AudioFormat::Ogg | AudioFormat::Ulaw => None,
        }
    }
}

/// OpenAI TTS request body
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

/// OpenAI API error response
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiError>(body)
        .ok()
        .map(|api_error| api_error.error.message)
}

#[async_trait]
impl TtsProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    #[instrument(skip(self, params, ctx), fields(text_len = params.text().len()))]
    async fn generate(
        &self,
        params: &ProviderParams,
        ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError> {
        debug!("Synthesizing speech with OpenAI TTS");

        let api_key = ctx.require_api_key(self.id())?;
        let format = params.format().unwrap_or(AudioFormat::Mp3);
        let response_format = Self::response_format(format).ok_or_else(|| {
            GeneratedError::validation(format!("openai does not support format {format}"))
                .with_provider(self.id())
        })?;

        let speed = params.speed();
        let request = SpeechRequest {
            model: ctx.model(params, DEFAULT_MODEL),
            input: params.text(),
            voice: ctx.voice(params, DEFAULT_VOICE),
            response_format,
            speed: if (speed - 1.0).abs() < f64::EPSILON {
                None
            } else {
                Some(speed)
            },
            instructions: params.str("instructions"),
        };

        let url = format!("{}/audio/speech", ctx.base_url(DEFAULT_BASE_URL));
        let builder = ctx.http.post(url).bearer_auth(api_key).json(&request);

        let response = http::send(ctx, self.id(), builder, error_message).await?;
        let audio = http::read_audio(self.id(), response, format).await?;
        Ok(audio.with_sample_rate(OUTPUT_SAMPLE_RATE))
    }

    fn check_credentials(&self, ctx: &ProviderContext) -> Result<(), GeneratedError> {
        ctx.require_api_key(self.id()).map(|_| ())
    }

    fn validate_params(&self, params: &ProviderParams) -> Result<(), String> {
        validate_common(self, params)?;
        check_membership("voice", params.voice(), VOICES)?;
        check_membership("model", params.model(), MODELS)?;

        let speed = params.speed();
        if !(0.25..=4.0).contains(&speed) {
            return Err(format!("speed must be between 0.25 and 4.0, got {speed}"));
        }
        Ok(())
    }

    fn models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo::new("tts-1", "TTS 1", MaxTextLength::Limited(MAX_TEXT_LENGTH)),
            ModelInfo::new("tts-1-hd", "TTS 1 HD", MaxTextLength::Limited(MAX_TEXT_LENGTH)),
            ModelInfo::new(
                "gpt-4o-mini-tts",
                "GPT-4o mini TTS",
                MaxTextLength::Limited(MAX_TEXT_LENGTH),
            ),
        ]
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        // OpenAI has no voices endpoint; voices speak every supported language
        let languages = &["en", "de", "es", "fr", "it", "pt", "ja", "zh"];
        vec![
            VoiceInfo::new("alloy", "Alloy")
                .with_description("Neutral and balanced voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Neutral),
            VoiceInfo::new("ash", "Ash")
                .with_description("Clear and direct voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("ballad", "Ballad")
                .with_description("Soft and melodic voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("coral", "Coral")
                .with_description("Warm and friendly voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("echo", "Echo")
                .with_description("Warm and conversational voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("fable", "Fable")
                .with_description("British-accented storyteller voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("onyx", "Onyx")
                .with_description("Deep and authoritative voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("nova", "Nova")
                .with_description("Friendly and upbeat voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("sage", "Sage")
                .with_description("Calm and measured voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("shimmer", "Shimmer")
                .with_description("Clear and expressive voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("verse", "Verse")
                .with_description("Versatile, expressive voice")
                .with_languages(languages)
                .with_gender(VoiceGender::Male),
        ]
    }

    fn languages(&self) -> Vec<LanguageInfo> {
        vec![
            LanguageInfo::new("en", "English"),
            LanguageInfo::new("de", "German"),
            LanguageInfo::new("es", "Spanish"),
            LanguageInfo::new("fr", "French"),
            LanguageInfo::new("it", "Italian"),
            LanguageInfo::new("pt", "Portuguese"),
            LanguageInfo::new("ja", "Japanese"),
            LanguageInfo::new("zh", "Chinese"),
        ]
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming_supported: false,
            supported_formats: vec![
                AudioFormat::Mp3,
                AudioFormat::Opus,
                AudioFormat::Aac,
                AudioFormat::Flac,
                AudioFormat::Wav,
                AudioFormat::Pcm,
            ],
            supported_sample_rates: vec![OUTPUT_SAMPLE_RATE],
            max_text_length: MaxTextLength::Limited(MAX_TEXT_LENGTH),
        }
    }
}

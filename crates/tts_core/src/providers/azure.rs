//! Azure Cognitive Services speech provider
//!
//! Sends SSML to the regional `cognitiveservices/v1` endpoint. The output
//! format is selected with the `X-Microsoft-OutputFormat` header.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::voice_locale;
use crate::error::GeneratedError;
use crate::http;
use crate::ports::{ProviderContext, ProviderParams, TtsProvider, validate_common};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceGender, VoiceInfo,
};

const DEFAULT_VOICE: &str = "en-US-JennyNeural";
const DEFAULT_LANGUAGE: &str = "en-US";
const OUTPUT_FORMAT_HEADER: &str = "X-Microsoft-OutputFormat";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Azure neural text-to-speech
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureProvider;

impl AzureProvider {
    /// Create the provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Output format header value and the sample rate it produces
    fn output_format(format: AudioFormat, sample_rate: Option<u32>) -> Option<(&'static str, u32)> {
        let rate = sample_rate.unwrap_or(24_000);
        let selected = match format {
            AudioFormat::Mp3 => match rate {
                16_000 => ("audio-16khz-32kbitrate-mono-mp3", 16_000),
                48_000 => ("audio-48khz-96kbitrate-mono-mp3", 48_000),
                _ => ("audio-24khz-48kbitrate-mono-mp3", 24_000),
            },
            AudioFormat::Pcm => match rate {
                8_000 => ("raw-8khz-16bit-mono-pcm", 8_000),
                16_000 => ("raw-16khz-16bit-mono-pcm", 16_000),
                22_050 => ("raw-22050hz-16bit-mono-pcm", 22_050),
                44_100 => ("raw-44100hz-16bit-mono-pcm", 44_100),
                48_000 => ("raw-48khz-16bit-mono-pcm", 48_000),
                _ => ("raw-24khz-16bit-mono-pcm", 24_000),
            },
            AudioFormat::Wav => match rate {
                16_000 => ("riff-16khz-16bit-mono-pcm", 16_000),
                48_000 => ("riff-48khz-16bit-mono-pcm", 48_000),
                _ => ("riff-24khz-16bit-mono-pcm", 24_000),
            },
            AudioFormat::Ogg | AudioFormat::Opus => match rate {
                16_000 => ("ogg-16khz-16bit-mono-opus", 16_000),
                48_000 => ("ogg-48khz-16bit-mono-opus", 48_000),
                _ => ("ogg-24khz-16bit-mono-opus", 24_000),
            },
            AudioFormat::Ulaw => ("raw-8khz-8bit-mono-mulaw", 8_000),
            _ => return None,
        };
        Some(selected)
    }

    fn endpoint(ctx: &ProviderContext) -> Result<String, GeneratedError> {
        if let Some(base) = ctx.settings.base_url.as_deref() {
            return Ok(format!("{}/cognitiveservices/v1", base.trim_end_matches('/')));
        }
        let region = ctx
            .settings
            .region
            .as_deref()
            .filter(|region| !region.is_empty())
            .ok_or_else(|| {
                GeneratedError::validation("Missing region for azure").with_provider(ProviderId::Azure)
            })?;
        Ok(format!(
            "https://{region}.tts.speech.microsoft.com/cognitiveservices/v1"
        ))
    }
}

/// Escape the five XML special characters
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Wrap `text` in an SSML document for `voice`
///
/// Text, voice and language are all escaped. A prosody element is added when
/// the speaking rate or pitch differs from the neutral value. Rate is a
/// multiplier (1.5 becomes `150%`), pitch is in semitones.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn build_ssml(text: &str, voice: &str, language: &str, speed: f64, pitch: f64) -> String {
    let escaped = escape_xml(text);
    let voice = escape_xml(voice);
    let language = escape_xml(language);

    let mut prosody = Vec::new();
    if (speed - 1.0).abs() > 0.01 {
        prosody.push(format!("rate=\"{}%\"", (speed * 100.0).round() as i64));
    }
    if pitch.abs() > 0.01 {
        prosody.push(format!("pitch=\"{:+}st\"", pitch.round() as i64));
    }

    let content = if prosody.is_empty() {
        escaped
    } else {
        format!("<prosody {}>{escaped}</prosody>", prosody.join(" "))
    };

    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{language}'>\
         <voice name='{voice}'>{content}</voice></speak>"
    )
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
        return Some(api_error.error.message);
    }
    let body = body.trim();
    (!body.is_empty() && !body.starts_with('<') && body.len() <= 500).then(|| body.to_string())
}

#[async_trait]
impl TtsProvider for AzureProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Azure
    }

    #[instrument(skip(self, params, ctx), fields(text_len = params.text().len()))]
    async fn generate(
        &self,
        params: &ProviderParams,
        ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError> {
        let api_key = ctx.require_api_key(self.id())?;
        let url = Self::endpoint(ctx)?;
        let format = params.format().unwrap_or(AudioFormat::Mp3);
        let (output_format, sample_rate) = Self::output_format(format, params.sample_rate())
            .ok_or_else(|| {
                GeneratedError::validation(format!("azure does not support format {format}"))
                    .with_provider(self.id())
            })?;

        let voice = ctx.voice(params, DEFAULT_VOICE);
        let language = params
            .language()
            .or_else(|| voice_locale(voice))
            .unwrap_or(DEFAULT_LANGUAGE);
        let ssml = build_ssml(params.text(), voice, language, params.speed(), params.pitch());

        let builder = ctx
            .http
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header(OUTPUT_FORMAT_HEADER, output_format)
            .body(ssml);

        let response = http::send(ctx, self.id(), builder, error_message).await?;
        let audio = http::read_audio(self.id(), response, format).await?;
        Ok(audio.with_sample_rate(sample_rate))
    }

    fn check_credentials(&self, ctx: &ProviderContext) -> Result<(), GeneratedError> {
        ctx.require_api_key(self.id())?;
        Self::endpoint(ctx).map(|_| ())
    }

    fn validate_params(&self, params: &ProviderParams) -> Result<(), String> {
        validate_common(self, params)?;

        let speed = params.speed();
        if !(0.5..=2.0).contains(&speed) {
            return Err(format!("speed must be between 0.5 and 2.0, got {speed}"));
        }
        Ok(())
    }

    fn models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo::new("neural", "Neural voices", MaxTextLength::Unbounded)]
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("en-US-JennyNeural", "Jenny")
                .with_languages(&["en-US"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("en-US-GuyNeural", "Guy")
                .with_languages(&["en-US"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("en-US-AriaNeural", "Aria")
                .with_languages(&["en-US"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("en-GB-SoniaNeural", "Sonia")
                .with_languages(&["en-GB"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("de-DE-KatjaNeural", "Katja")
                .with_languages(&["de-DE"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("de-DE-ConradNeural", "Conrad")
                .with_languages(&["de-DE"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("fr-FR-DeniseNeural", "Denise")
                .with_languages(&["fr-FR"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("es-ES-ElviraNeural", "Elvira")
                .with_languages(&["es-ES"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("en-US-AvaMultilingualNeural", "Ava (multilingual)")
                .with_description("Speaks the language of the input text")
                .with_languages(&["en-US", "de-DE", "fr-FR", "es-ES", "it-IT", "ja-JP"])
                .with_gender(VoiceGender::Female),
        ]
    }

    fn languages(&self) -> Vec<LanguageInfo> {
        [
            ("en-US", "English (US)"),
            ("en-GB", "English (UK)"),
            ("de-DE", "German"),
            ("fr-FR", "French"),
            ("es-ES", "Spanish"),
            ("it-IT", "Italian"),
            ("ja-JP", "Japanese"),
            ("zh-CN", "Chinese (Mandarin)"),
        ]
        .into_iter()
        .map(|(code, name)| LanguageInfo::new(code, name))
        .collect()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming_supported: false,
            supported_formats: vec![
                AudioFormat::Mp3,
                AudioFormat::Wav,
                AudioFormat::Pcm,
                AudioFormat::Ogg,
                AudioFormat::Opus,
                AudioFormat::Ulaw,
            ],
            supported_sample_rates: vec![8_000, 16_000, 22_050, 24_000, 44_100, 48_000],
            max_text_length: MaxTextLength::Unbounded,
        }
    }
}

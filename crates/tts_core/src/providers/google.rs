//! Google Cloud Text-to-Speech provider
//!
//! Uses the REST `text:synthesize` endpoint with an API key. Audio comes back
//! base64-encoded in `audioContent`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::voice_locale;
use crate::error::{ErrorCode, GeneratedError};
use crate::http;
use crate::ports::{ProviderContext, ProviderParams, TtsProvider, validate_common};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceGender, VoiceInfo,
};

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";
const DEFAULT_VOICE: &str = "en-US-Neural2-C";
const DEFAULT_LANGUAGE: &str = "en-US";
const MAX_TEXT_LENGTH: usize = 5000;

/// Google Cloud text-to-speech
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleProvider;

impl GoogleProvider {
    /// Create the provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    const fn audio_encoding(format: AudioFormat) -> Option<&'static str> {
        match format {
            AudioFormat::Mp3 => Some("MP3"),
            AudioFormat::Wav => Some("LINEAR16"),
            AudioFormat::Ogg | AudioFormat::Opus => Some("OGG_OPUS"),
            AudioFormat::Ulaw => Some("MULAW"),
            _ => None,
        }
    }

    /// Language code from the request, else the voice name prefix
    fn language_code<'a>(params: &'a ProviderParams, voice: &'a str) -> &'a str {
        params
            .language()
            .or_else(|| voice_locale(voice))
            .unwrap_or(DEFAULT_LANGUAGE)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hertz: Option<u32>,
    speaking_rate: f64,
    pitch: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
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
    serde_json::from_str::<ApiError>(body)
        .ok()
        .map(|api_error| api_error.error.message)
}

#[async_trait]
impl TtsProvider for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    #[instrument(skip(self, params, ctx), fields(text_len = params.text().len()))]
    async fn generate(
        &self,
        params: &ProviderParams,
        ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError> {
        let api_key = ctx.require_api_key(self.id())?;
        let format = params.format().unwrap_or(AudioFormat::Mp3);
        let audio_encoding = Self::audio_encoding(format).ok_or_else(|| {
            GeneratedError::validation(format!("google does not support format {format}"))
                .with_provider(self.id())
        })?;

        let voice = ctx.voice(params, DEFAULT_VOICE);
        let request = SynthesizeRequest {
            input: SynthesisInput {
                text: params.text(),
            },
            voice: VoiceSelection {
                language_code: Self::language_code(params, voice),
                name: voice,
            },
            audio_config: AudioConfig {
                audio_encoding,
                sample_rate_hertz: params.sample_rate(),
                speaking_rate: params.speed(),
                pitch: params.pitch(),
            },
        };

        let url = format!("{}/v1/text:synthesize", ctx.base_url(DEFAULT_BASE_URL));
        let builder = ctx
            .http
            .post(url)
            .query(&[("key", api_key)])
            .json(&request);

        let response = http::send(ctx, self.id(), builder, error_message).await?;
        let body: SynthesizeResponse = response.json().await.map_err(|e| {
            GeneratedError::new(
                ErrorCode::InvalidProviderResult,
                format!("Unexpected response from google: {e}"),
            )
            .with_provider(self.id())
        })?;

        let bytes = STANDARD.decode(body.audio_content.as_bytes()).map_err(|e| {
            GeneratedError::new(
                ErrorCode::InvalidProviderResult,
                format!("audioContent is not valid base64: {e}"),
            )
            .with_provider(self.id())
        })?;

        let audio = AudioData::new(bytes, format);
        Ok(match params.sample_rate() {
            Some(rate) => audio.with_sample_rate(rate),
            None => audio,
        })
    }

    fn check_credentials(&self, ctx: &ProviderContext) -> Result<(), GeneratedError> {
        ctx.require_api_key(self.id()).map(|_| ())
    }

    fn validate_params(&self, params: &ProviderParams) -> Result<(), String> {
        validate_common(self, params)?;

        let speed = params.speed();
        if !(0.25..=4.0).contains(&speed) {
            return Err(format!("speed must be between 0.25 and 4.0, got {speed}"));
        }
        let pitch = params.pitch();
        if !(-20.0..=20.0).contains(&pitch) {
            return Err(format!("pitch must be between -20.0 and 20.0, got {pitch}"));
        }
        Ok(())
    }

    fn models(&self) -> Vec<ModelInfo> {
        // Google selects the model through the voice family
        [
            ("Standard", "Standard voices"),
            ("Wavenet", "WaveNet voices"),
            ("Neural2", "Neural2 voices"),
            ("Studio", "Studio voices"),
        ]
        .into_iter()
        .map(|(id, name)| ModelInfo::new(id, name, MaxTextLength::Limited(MAX_TEXT_LENGTH)))
        .collect()
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("en-US-Neural2-C", "US English Neural2 C")
                .with_languages(&["en-US"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("en-US-Neural2-D", "US English Neural2 D")
                .with_languages(&["en-US"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("en-US-Wavenet-F", "US English WaveNet F")
                .with_languages(&["en-US"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("en-GB-Neural2-B", "British English Neural2 B")
                .with_languages(&["en-GB"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("de-DE-Neural2-A", "German Neural2 A")
                .with_languages(&["de-DE"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("fr-FR-Neural2-B", "French Neural2 B")
                .with_languages(&["fr-FR"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("es-ES-Neural2-A", "Spanish Neural2 A")
                .with_languages(&["es-ES"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("ja-JP-Neural2-B", "Japanese Neural2 B")
                .with_languages(&["ja-JP"])
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
            ("pt-BR", "Portuguese (Brazil)"),
            ("ja-JP", "Japanese"),
            ("ko-KR", "Korean"),
            ("cmn-CN", "Mandarin Chinese"),
            ("hi-IN", "Hindi"),
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
                AudioFormat::Ogg,
                AudioFormat::Opus,
                AudioFormat::Ulaw,
            ],
            supported_sample_rates: vec![8_000, 16_000, 22_050, 24_000, 44_100, 48_000],
            max_text_length: MaxTextLength::Limited(MAX_TEXT_LENGTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedSettings;
    use crate::telemetry::NoopSink;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_context(mock_server: &MockServer) -> ProviderContext {
        ProviderContext::new(
            reqwest::Client::new(),
            ResolvedSettings::with_api_key("g-key").base_url(mock_server.uri()),
            Arc::new(NoopSink),
        )
    }

    #[tokio::test]
    async fn generate_decodes_audio_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/text:synthesize"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "input": {"text": "Guten Tag"},
                "voice": {"languageCode": "de-DE", "name": "de-DE-Neural2-A"},
                "audioConfig": {"audioEncoding": "MP3", "sampleRateHertz": 24000}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "audioContent": STANDARD.encode([1u8, 2, 3, 4])
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let params = ProviderParams::with_text("Guten Tag")
            .set("voice", "de-DE-Neural2-A")
            .set("sample_rate", 24_000);
        let audio = GoogleProvider
            .generate(&params, &create_test_context(&mock_server))
            .await
            .unwrap();

        assert_eq!(audio.data(), &[1, 2, 3, 4]);
        assert_eq!(audio.sample_rate(), Some(24_000));
    }

    #[tokio::test]
    async fn invalid_base64_is_invalid_provider_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "audioContent": "***"
            })))
            .mount(&mock_server)
            .await;

        let err = GoogleProvider
            .generate(&ProviderParams::with_text("Hi"), &create_test_context(&mock_server))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidProviderResult);
    }

    #[tokio::test]
    async fn error_body_message_is_used() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}
            })))
            .mount(&mock_server)
            .await;

        let err = GoogleProvider
            .generate(&ProviderParams::with_text("Hi"), &create_test_context(&mock_server))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::HttpError);
        assert_eq!(err.status, Some(403));
        assert_eq!(err.message, "API key not valid");
    }

    #[test]
    fn language_code_from_voice_or_param() {
        let params = ProviderParams::with_text("x");
        assert_eq!(GoogleProvider::language_code(&params, "fr-FR-Neural2-B"), "fr-FR");
        assert_eq!(GoogleProvider::language_code(&params, "plain"), "en-US");

        let explicit = ProviderParams::with_text("x").set("language", "en-GB");
        assert_eq!(GoogleProvider::language_code(&explicit, "fr-FR-Neural2-B"), "en-GB");
    }

    #[test]
    fn validation_checks_ranges() {
        let params = ProviderParams::with_text("x").set("pitch", 25.0);
        assert!(GoogleProvider.validate_params(&params).is_err());
        let params = ProviderParams::with_text("x").set("format", "aac");
        assert!(GoogleProvider.validate_params(&params).is_err());
        assert!(GoogleProvider.validate_params(&ProviderParams::with_text("x")).is_ok());
    }
}

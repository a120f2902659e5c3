//! ElevenLabs speech provider
//!
//! `POST {base}/v1/text-to-speech/{voice_id}?output_format=...` authenticated
//! with the `xi-api-key` header. The input limit depends on the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::GeneratedError;
use crate::http;
use crate::ports::{ProviderContext, ProviderParams, TtsProvider, check_membership, validate_common};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceGender, VoiceInfo,
};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
/// Rachel, one of the premade voices
const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8N7gTa";

/// Models with their per-request character limit
const MODELS: &[(&str, &str, usize)] = &[
    ("eleven_v3", "Eleven v3", 5_000),
    ("eleven_multilingual_v2", "Eleven Multilingual v2", 10_000),
    ("eleven_flash_v2_5", "Eleven Flash v2.5", 40_000),
    ("eleven_turbo_v2_5", "Eleven Turbo v2.5", 40_000),
];

const PCM_SAMPLE_RATES: &[u32] = &[16_000, 22_050, 24_000, 44_100];

/// ElevenLabs text-to-speech
#[derive(Debug, Clone, Copy, Default)]
pub struct ElevenLabsProvider;

impl ElevenLabsProvider {
    /// Create the provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn model_limit(model: &str) -> Option<usize> {
        MODELS
            .iter()
            .find(|(id, _, _)| *id == model)
            .map(|(_, _, limit)| *limit)
    }

    /// Vendor `output_format` for a format and sample rate
    fn output_format(format: AudioFormat, sample_rate: Option<u32>) -> Option<(String, u32)> {
        match format {
            AudioFormat::Mp3 => Some(("mp3_44100_128".to_string(), 44_100)),
            AudioFormat::Pcm => {
                let rate = sample_rate
                    .filter(|rate| PCM_SAMPLE_RATES.contains(rate))
                    .unwrap_or(24_000);
                Some((format!("pcm_{rate}"), rate))
            },
            AudioFormat::Ulaw => Some(("ulaw_8000".to_string(), 8_000)),
            AudioFormat::Opus => Some(("opus_48000_128".to_string(), 48_000)),
            _ => None,
        }
    }

    const fn accept_header(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Ulaw => "audio/basic",
            AudioFormat::Opus => "audio/opus",
            _ => "audio/pcm",
        }
    }
}

/// Voice settings sent with every request
#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_speaker_boost: Option<bool>,
    speed: f64,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    detail: Value,
}

/// `{"detail": {"message": ...}}` or `{"detail": "..."}`
fn error_message(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ApiError>(body).ok()?.detail;
    match detail {
        Value::String(message) => Some(message),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsProvider {
    fn id(&self) -> ProviderId {
        ProviderId::ElevenLabs
    }

    #[instrument(skip(self, params, ctx), fields(text_len = params.text().len()))]
    async fn generate(
        &self,
        params: &ProviderParams,
        ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError> {
        let api_key = ctx.require_api_key(self.id())?;
        let format = params.format().unwrap_or(AudioFormat::Mp3);
        let (output_format, sample_rate) = Self::output_format(format, params.sample_rate())
            .ok_or_else(|| {
                GeneratedError::validation(format!("elevenlabs does not support format {format}"))
                    .with_provider(self.id())
            })?;

        let voice_id = ctx.voice(params, DEFAULT_VOICE);
        let model_id = ctx.model(params, DEFAULT_MODEL);
        debug!(voice_id, model_id, output_format = %output_format, "Synthesizing speech with ElevenLabs");

        let request = SpeechRequest {
            text: params.text(),
            model_id,
            voice_settings: VoiceSettings {
                stability: params.f64("stability").unwrap_or(0.5),
                similarity_boost: params.f64("similarity_boost").unwrap_or(0.75),
                style: params.f64("style"),
                use_speaker_boost: params.get("use_speaker_boost").and_then(Value::as_bool),
                speed: params.speed(),
            },
            language_code: params.language(),
        };

        let url = format!(
            "{}/v1/text-to-speech/{voice_id}",
            ctx.base_url(DEFAULT_BASE_URL)
        );
        let builder = ctx
            .http
            .post(url)
            .query(&[("output_format", output_format.as_str())])
            .header("xi-api-key", api_key)
            .header("Accept", Self::accept_header(format))
            .json(&request);

        let response = http::send(ctx, self.id(), builder, error_message).await?;
        let audio = http::read_audio(self.id(), response, format).await?;
        Ok(audio.with_sample_rate(sample_rate))
    }

    fn check_credentials(&self, ctx: &ProviderContext) -> Result<(), GeneratedError> {
        ctx.require_api_key(self.id()).map(|_| ())
    }

    fn validate_params(&self, params: &ProviderParams) -> Result<(), String> {
        let known: Vec<&str> = MODELS.iter().map(|(id, _, _)| *id).collect();
        check_membership("model", params.model(), &known)?;
        validate_common(self, params)?;

        for key in ["stability", "similarity_boost", "style"] {
            if let Some(value) = params.f64(key) {
                if !(0.0..=1.0).contains(&value) {
                    return Err(format!("{key} must be between 0.0 and 1.0, got {value}"));
                }
            }
        }
        Ok(())
    }

    fn max_text_length(&self, params: &ProviderParams) -> MaxTextLength {
        let model = params.model().unwrap_or(DEFAULT_MODEL);
        Self::model_limit(model)
            .or_else(|| Self::model_limit(DEFAULT_MODEL))
            .map_or(MaxTextLength::Unbounded, MaxTextLength::Limited)
    }

    fn models(&self) -> Vec<ModelInfo> {
        MODELS
            .iter()
            .map(|(id, name, limit)| ModelInfo::new(*id, *name, MaxTextLength::Limited(*limit)))
            .collect()
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("21m00Tcm4TlvDq8N7gTa", "Rachel")
                .with_description("Calm narration")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("EXAVITQu4vr4xnSDxMaL", "Bella")
                .with_description("Soft and young")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("AZnzlk1XvdvUeBnXmlld", "Domi")
                .with_description("Strong and confident")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("MF3mGyEYCl7XYWbV9V6O", "Elli")
                .with_description("Emotional range")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Female),
            VoiceInfo::new("pNInz6obpgDQGcFmaJgB", "Adam")
                .with_description("Deep narration")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("ErXwobaYiN019PkySvjV", "Antoni")
                .with_description("Well-rounded")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("TxGEqnHWrfWFTfGW9XjX", "Josh")
                .with_description("Young and deep")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Male),
            VoiceInfo::new("VR6AewLTigWG4xSOukaG", "Arnold")
                .with_description("Crisp")
                .with_languages(&["en"])
                .with_gender(VoiceGender::Male),
        ]
    }

    fn languages(&self) -> Vec<LanguageInfo> {
        [
            ("en", "English"),
            ("de", "German"),
            ("es", "Spanish"),
            ("fr", "French"),
            ("it", "Italian"),
            ("pt", "Portuguese"),
            ("pl", "Polish"),
            ("nl", "Dutch"),
            ("hi", "Hindi"),
            ("ja", "Japanese"),
            ("ko", "Korean"),
            ("zh", "Chinese"),
            ("ar", "Arabic"),
            ("tr", "Turkish"),
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
                AudioFormat::Pcm,
                AudioFormat::Ulaw,
                AudioFormat::Opus,
            ],
            supported_sample_rates: vec![8_000, 16_000, 22_050, 24_000, 44_100],
            max_text_length: MaxTextLength::Limited(10_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedSettings;
    use crate::error::ErrorCode;
    use crate::telemetry::NoopSink;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_context(mock_server: &MockServer) -> ProviderContext {
        ProviderContext::new(
            reqwest::Client::new(),
            ResolvedSettings::with_api_key("xi-test").base_url(mock_server.uri()),
            Arc::new(NoopSink),
        )
    }

    #[tokio::test]
    async fn generate_posts_to_voice_endpoint() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/pNInz6obpgDQGcFmaJgB"))
            .and(query_param("output_format", "pcm_22050"))
            .and(header("xi-api-key", "xi-test"))
            .and(body_partial_json(serde_json::json!({
                "text": "Hello",
                "model_id": "eleven_flash_v2_5",
                "voice_settings": {"stability": 0.3}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 64]))
            .expect(1)
            .mount(&mock_server)
            .await;

        let params = ProviderParams::with_text("Hello")
            .set("voice", "pNInz6obpgDQGcFmaJgB")
            .set("model", "eleven_flash_v2_5")
            .set("format", "pcm")
            .set("sample_rate", 22_050)
            .set("stability", 0.3);
        let audio = ElevenLabsProvider
            .generate(&params, &create_test_context(&mock_server))
            .await
            .unwrap();

        assert_eq!(audio.size_bytes(), 64);
        assert_eq!(audio.format(), AudioFormat::Pcm);
        assert_eq!(audio.sample_rate(), Some(22_050));
    }

    #[tokio::test]
    async fn generate_extracts_detail_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": {"status": "invalid_api_key", "message": "Invalid API key"}
            })))
            .mount(&mock_server)
            .await;

        let err = ElevenLabsProvider
            .generate(&ProviderParams::with_text("Hi"), &create_test_context(&mock_server))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::HttpError);
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Invalid API key");
    }

    #[test]
    fn detail_may_be_a_plain_string() {
        assert_eq!(
            error_message(r#"{"detail": "Not found"}"#),
            Some("Not found".to_string())
        );
        assert_eq!(error_message("not json"), None);
    }

    #[test]
    fn limit_depends_on_model() {
        let provider = ElevenLabsProvider;
        let with_model = |model: &str| ProviderParams::with_text("x").set("model", model);

        assert_eq!(
            provider.max_text_length(&with_model("eleven_v3")),
            MaxTextLength::Limited(5_000)
        );
        assert_eq!(
            provider.max_text_length(&with_model("eleven_multilingual_v2")),
            MaxTextLength::Limited(10_000)
        );
        assert_eq!(
            provider.max_text_length(&with_model("eleven_turbo_v2_5")),
            MaxTextLength::Limited(40_000)
        );
        assert_eq!(
            provider.max_text_length(&ProviderParams::with_text("x")),
            MaxTextLength::Limited(10_000)
        );
    }

    #[test]
    fn validation_uses_model_limit() {
        let text = "a".repeat(6_000);
        let v3 = ProviderParams::with_text(text.clone()).set("model", "eleven_v3");
        let flash = ProviderParams::with_text(text).set("model", "eleven_flash_v2_5");

        assert!(ElevenLabsProvider.validate_params(&v3).is_err());
        assert!(ElevenLabsProvider.validate_params(&flash).is_ok());
    }

    #[test]
    fn validation_rejects_unknown_model_and_bad_settings() {
        let unknown = ProviderParams::with_text("x").set("model", "eleven_v0");
        assert!(ElevenLabsProvider.validate_params(&unknown).is_err());

        let bad = ProviderParams::with_text("x").set("stability", 1.5);
        assert!(ElevenLabsProvider.validate_params(&bad).is_err());
    }

    #[test]
    fn output_format_mapping() {
        assert_eq!(
            ElevenLabsProvider::output_format(AudioFormat::Mp3, Some(22_050)),
            Some(("mp3_44100_128".to_string(), 44_100))
        );
        assert_eq!(
            ElevenLabsProvider::output_format(AudioFormat::Pcm, Some(11_025)),
            Some(("pcm_24000".to_string(), 24_000))
        );
        assert_eq!(ElevenLabsProvider::output_format(AudioFormat::Wav, None), None);
    }
}

//! Amazon Polly provider
//!
//! Calls the `SynthesizeSpeech` REST endpoint, signed with AWS Signature V4.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::sigv4::{self, Credentials, SigningInput};
use crate::error::{ErrorCode, GeneratedError};
use crate::http;
use crate::ports::{ProviderContext, ProviderParams, TtsProvider, check_membership, validate_common};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceGender, VoiceInfo,
};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_VOICE: &str = "Joanna";
const DEFAULT_ENGINE: &str = "neural";
const SERVICE: &str = "polly";
const CONTENT_TYPE: &str = "application/json";
const MAX_TEXT_LENGTH: usize = 3000;

const ENGINES: &[&str] = &["standard", "neural", "long-form", "generative"];
const COMPRESSED_SAMPLE_RATES: &[u32] = &[8_000, 16_000, 22_050, 24_000];
const PCM_SAMPLE_RATES: &[u32] = &[8_000, 16_000];

const VOICES: &[(&str, &str, VoiceGender)] = &[
    ("Joanna", "en-US", VoiceGender::Female),
    ("Matthew", "en-US", VoiceGender::Male),
    ("Ruth", "en-US", VoiceGender::Female),
    ("Amy", "en-GB", VoiceGender::Female),
    ("Brian", "en-GB", VoiceGender::Male),
    ("Vicki", "de-DE", VoiceGender::Female),
    ("Daniel", "de-DE", VoiceGender::Male),
    ("Lea", "fr-FR", VoiceGender::Female),
    ("Lucia", "es-ES", VoiceGender::Female),
    ("Bianca", "it-IT", VoiceGender::Female),
    ("Takumi", "ja-JP", VoiceGender::Male),
];

/// Amazon Polly text-to-speech
#[derive(Debug, Clone, Copy, Default)]
pub struct PollyProvider;

impl PollyProvider {
    /// Create the provider
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Polly output format and the sample rate to request
    fn output_format(format: AudioFormat, sample_rate: Option<u32>) -> Option<(&'static str, u32)> {
        let (name, allowed, default) = match format {
            AudioFormat::Mp3 => ("mp3", COMPRESSED_SAMPLE_RATES, 22_050),
            AudioFormat::Ogg => ("ogg_vorbis", COMPRESSED_SAMPLE_RATES, 22_050),
            AudioFormat::Pcm => ("pcm", PCM_SAMPLE_RATES, 16_000),
            _ => return None,
        };
        let rate = sample_rate.filter(|rate| allowed.contains(rate)).unwrap_or(default);
        Some((name, rate))
    }

    fn credentials(ctx: &ProviderContext) -> Result<Credentials<'_>, GeneratedError> {
        let settings = &ctx.settings;
        match (
            settings.access_key_id.as_deref().filter(|v| !v.is_empty()),
            settings.secret_access_key.as_deref().filter(|v| !v.is_empty()),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
                access_key_id,
                secret_access_key,
                session_token: settings.session_token.as_deref().filter(|v| !v.is_empty()),
            }),
            _ => Err(GeneratedError::validation("Missing AWS credentials for polly")
                .with_provider(ProviderId::Polly)),
        }
    }

    fn region(ctx: &ProviderContext) -> &str {
        ctx.settings
            .region
            .as_deref()
            .filter(|region| !region.is_empty())
            .unwrap_or(DEFAULT_REGION)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SynthesizeSpeechRequest<'a> {
    engine: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    output_format: &'static str,
    sample_rate: String,
    text: &'a str,
    text_type: &'a str,
    voice_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(alias = "Message")]
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiError>(body)
        .ok()
        .map(|api_error| api_error.message)
}

#[async_trait]
impl TtsProvider for PollyProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Polly
    }

    #[instrument(skip(self, params, ctx), fields(text_len = params.text().len()))]
    async fn generate(
        &self,
        params: &ProviderParams,
        ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError> {
        let credentials = Self::credentials(ctx)?;
        let region = Self::region(ctx);
        let format = params.format().unwrap_or(AudioFormat::Mp3);
        let (output_format, sample_rate) = Self::output_format(format, params.sample_rate())
            .ok_or_else(|| {
                GeneratedError::validation(format!("polly does not support format {format}"))
                    .with_provider(self.id())
            })?;

        let request = SynthesizeSpeechRequest {
            engine: ctx.model(params, DEFAULT_ENGINE),
            language_code: params.language(),
            output_format,
            sample_rate: sample_rate.to_string(),
            text: params.text(),
            text_type: params.str("text_type").unwrap_or("text"),
            voice_id: ctx.voice(params, DEFAULT_VOICE),
        };
        let body = serde_json::to_vec(&request).map_err(|e| {
            GeneratedError::new(ErrorCode::Error, format!("Failed to encode request: {e}"))
                .with_provider(self.id())
        })?;

        let url = match ctx.settings.base_url.as_deref() {
            Some(base) => format!("{}/v1/speech", base.trim_end_matches('/')),
            None => format!("https://polly.{region}.amazonaws.com/v1/speech"),
        };
        let parsed = reqwest::Url::parse(&url).map_err(|e| {
            GeneratedError::validation(format!("Invalid polly endpoint {url}: {e}"))
                .with_provider(self.id())
        })?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };

        let datetime = sigv4::amz_datetime_now();
        let signature = sigv4::sign(
            &SigningInput {
                method: "POST",
                host: &host,
                path: parsed.path(),
                content_type: CONTENT_TYPE,
                body: &body,
                region,
                service: SERVICE,
                datetime: &datetime,
            },
            &credentials,
        )
        .map_err(|e| {
            GeneratedError::new(ErrorCode::Error, format!("Failed to sign request: {e}"))
                .with_provider(self.id())
        })?;
        debug!(region, host = %host, "Signed polly request");

        let mut builder = ctx
            .http
            .post(parsed)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::AUTHORIZATION, signature.authorization)
            .header("X-Amz-Date", signature.amz_date)
            .header("X-Amz-Content-Sha256", signature.content_sha256)
            .body(body);
        if let Some(token) = credentials.session_token {
            builder = builder.header("X-Amz-Security-Token", token);
        }

        let response = http::send(ctx, self.id(), builder, error_message).await?;
        let audio = http::read_audio(self.id(), response, format).await?;
        Ok(audio.with_sample_rate(sample_rate))
    }

    fn check_credentials(&self, ctx: &ProviderContext) -> Result<(), GeneratedError> {
        Self::credentials(ctx).map(|_| ())
    }

    fn validate_params(&self, params: &ProviderParams) -> Result<(), String> {
        check_membership("engine", params.model(), ENGINES)?;
        validate_common(self, params)?;
        if let Some(text_type) = params.str("text_type") {
            check_membership("text_type", Some(text_type), &["text", "ssml"])?;
        }
        Ok(())
    }

    fn models(&self) -> Vec<ModelInfo> {
        [
            ("standard", "Standard"),
            ("neural", "Neural"),
            ("long-form", "Long-form"),
            ("generative", "Generative"),
        ]
        .into_iter()
        .map(|(id, name)| ModelInfo::new(id, name, MaxTextLength::Limited(MAX_TEXT_LENGTH)))
        .collect()
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        VOICES
            .iter()
            .map(|(id, language, gender)| {
                VoiceInfo::new(*id, *id)
                    .with_languages(&[*language])
                    .with_gender(*gender)
            })
            .collect()
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
        ]
        .into_iter()
        .map(|(code, name)| LanguageInfo::new(code, name))
        .collect()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming_supported: false,
            supported_formats: vec![AudioFormat::Mp3, AudioFormat::Ogg, AudioFormat::Pcm],
            supported_sample_rates: COMPRESSED_SAMPLE_RATES.to_vec(),
            max_text_length: MaxTextLength::Limited(MAX_TEXT_LENGTH),
        }
    }
}

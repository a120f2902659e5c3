//! Provider capability contract
//!
//! Every vendor integration implements [`TtsProvider`]. Providers are
//! stateless: credentials and defaults arrive per call through a
//! [`ProviderContext`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::chunker::char_len;
use crate::config::ResolvedSettings;
use crate::error::GeneratedError;
use crate::telemetry::TelemetrySink;
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceInfo,
};

/// Stream of raw audio fragments
pub type AudioStream = BoxStream<'static, Result<Bytes, GeneratedError>>;

/// Merged provider parameters for one request
///
/// Holds the validated request fields with provider-specific options laid
/// over them. Keys follow snake_case (`text`, `voice`, `model`, `format`,
/// `sample_rate`, `speed`, `pitch`, `language`, plus any vendor option).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderParams {
    values: Map<String, Value>,
}

impl ProviderParams {
    /// Wrap an existing mapping
    #[must_use]
    pub const fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Parameters holding only a text
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::default().set("text", text.into())
    }

    /// Set a value, replacing any previous one
    #[must_use]
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Lay `overrides` over these parameters; overriding keys win
    #[must_use]
    pub fn overlay(mut self, overrides: &Map<String, Value>) -> Self {
        for (key, value) in overrides {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    /// Copy of these parameters with the text replaced
    #[must_use]
    pub fn for_chunk(&self, text: &str) -> Self {
        self.clone().set("text", text)
    }

    /// Raw value lookup
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value, if present and a string
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Numeric value, if present and a number
    #[must_use]
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    /// Unsigned integer value, if present and a non-negative integer
    #[must_use]
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    /// The text to synthesize (empty if absent)
    #[must_use]
    pub fn text(&self) -> &str {
        self.str("text").unwrap_or_default()
    }

    /// Requested voice
    #[must_use]
    pub fn voice(&self) -> Option<&str> {
        self.str("voice")
    }

    /// Requested model
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.str("model")
    }

    /// Requested language
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.str("language")
    }

    /// Requested output format, if present and recognized
    #[must_use]
    pub fn format(&self) -> Option<AudioFormat> {
        self.str("format").and_then(|f| f.parse().ok())
    }

    /// Requested sample rate
    #[must_use]
    pub fn sample_rate(&self) -> Option<u32> {
        self.u64("sample_rate").and_then(|rate| u32::try_from(rate).ok())
    }

    /// Speaking rate multiplier (1.0 when absent)
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.f64("speed").unwrap_or(1.0)
    }

    /// Pitch adjustment (0.0 when absent)
    #[must_use]
    pub fn pitch(&self) -> f64 {
        self.f64("pitch").unwrap_or(0.0)
    }

    /// Underlying mapping
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Per-call dependencies handed to a provider
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Shared, pooled HTTP client
    pub http: reqwest::Client,
    /// Settings resolved for this call
    pub settings: ResolvedSettings,
    /// Telemetry destination
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl ProviderContext {
    /// Create a context
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        settings: ResolvedSettings,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            http,
            settings,
            telemetry,
        }
    }

    /// API key, or a validation error naming the provider
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` if no key is configured.
    pub fn require_api_key(&self, provider: ProviderId) -> Result<&str, GeneratedError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                GeneratedError::validation(format!("Missing API key for {provider}"))
                    .with_provider(provider)
            })
    }

    /// Configured endpoint override or the vendor default, without a trailing
    /// slash
    #[must_use]
    pub fn base_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.settings
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }

    /// Voice from the request, then configuration, then `fallback`
    #[must_use]
    pub fn voice<'a>(&'a self, params: &'a ProviderParams, fallback: &'a str) -> &'a str {
        params
            .voice()
            .or(self.settings.default_voice.as_deref())
            .unwrap_or(fallback)
    }

    /// Model from the request, then configuration, then `fallback`
    #[must_use]
    pub fn model<'a>(&'a self, params: &'a ProviderParams, fallback: &'a str) -> &'a str {
        params
            .model()
            .or(self.settings.default_model.as_deref())
            .unwrap_or(fallback)
    }
}

/// Capability set every TTS vendor integration provides
///
/// `generate` performs exactly one round trip. Chunking and retries are the
/// caller's job.
#[async_trait]
pub trait TtsProvider: Send + Sync + fmt::Debug {
    /// Which vendor this is
    fn id(&self) -> ProviderId;

    /// Synthesize `params.text()` in one request
    ///
    /// # Errors
    ///
    /// Returns `network_error`, `http_error`/`rate_limited`, or
    /// `not_implemented` for stub providers.
    async fn generate(
        &self,
        params: &ProviderParams,
        ctx: &ProviderContext,
    ) -> Result<AudioData, GeneratedError>;

    /// Stream audio as it is produced
    ///
    /// # Errors
    ///
    /// Built-in providers always return `not_implemented`.
    async fn stream(
        &self,
        _params: &ProviderParams,
        _ctx: &ProviderContext,
    ) -> Result<AudioStream, GeneratedError> {
        Err(
            GeneratedError::not_implemented(format!("Streaming is not implemented for {}", self.id()))
                .with_provider(self.id()),
        )
    }

    /// Provider-specific structural checks
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the parameters cannot be sent.
    fn validate_params(&self, params: &ProviderParams) -> Result<(), String> {
        validate_common(self, params)
    }

    /// Check that the resolved settings carry what `generate` needs
    ///
    /// Runs once per call before any chunk is sent.
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` naming the missing setting.
    fn check_credentials(&self, _ctx: &ProviderContext) -> Result<(), GeneratedError> {
        Ok(())
    }

    /// Maximum text length for these parameters (may depend on the model)
    fn max_text_length(&self, _params: &ProviderParams) -> MaxTextLength {
        self.capabilities().max_text_length
    }

    /// Known models
    fn models(&self) -> Vec<ModelInfo>;

    /// Known voices
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Supported languages
    fn languages(&self) -> Vec<LanguageInfo>;

    /// Declared limits and features
    fn capabilities(&self) -> ProviderCapabilities;
}

/// Checks shared by every provider: non-empty text within the length limit
/// and a supported output format
///
/// # Errors
///
/// Returns the first violated rule as a message.
pub fn validate_common<P: TtsProvider + ?Sized>(
    provider: &P,
    params: &ProviderParams,
) -> Result<(), String> {
    let text = params.text();
    if text.trim().is_empty() {
        return Err("text must not be empty".to_string());
    }

    let max = provider.max_text_length(params);
    let len = char_len(text);
    if !max.fits(len) {
        return Err(format!(
            "text is {len} characters, {} allows at most {}",
            provider.id(),
            max.limit().unwrap_or(usize::MAX)
        ));
    }

    if let Some(raw) = params.str("format") {
        let format: AudioFormat = raw.parse()?;
        if !provider.capabilities().supports_format(format) {
            return Err(format!("{} does not support format {format}", provider.id()));
        }
    }

    Ok(())
}

/// Check that an optional value names one of the known entries
///
/// # Errors
///
/// Returns a message listing the accepted values.
pub fn check_membership(kind: &str, value: Option<&str>, known: &[&str]) -> Result<(), String> {
    match value {
        Some(value) if !known.contains(&value) => Err(format!(
            "Unknown {kind}: {value}. Expected one of: {}",
            known.join(", ")
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopSink;
    use serde_json::json;

    #[derive(Debug)]
    struct FixedProvider;

    #[async_trait]
    impl TtsProvider for FixedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAi
        }

        async fn generate(
            &self,
            _params: &ProviderParams,
            _ctx: &ProviderContext,
        ) -> Result<AudioData, GeneratedError> {
            Ok(AudioData::new(vec![1], AudioFormat::Mp3))
        }

        fn models(&self) -> Vec<ModelInfo> {
            Vec::new()
        }

        fn voices(&self) -> Vec<VoiceInfo> {
            Vec::new()
        }

        fn languages(&self) -> Vec<LanguageInfo> {
            Vec::new()
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                streaming_supported: false,
                supported_formats: vec![AudioFormat::Mp3, AudioFormat::Wav],
                supported_sample_rates: vec![24_000],
                max_text_length: MaxTextLength::Limited(10),
            }
        }
    }

    fn context(settings: ResolvedSettings) -> ProviderContext {
        ProviderContext::new(reqwest::Client::new(), settings, Arc::new(NoopSink))
    }

    mod params {
        use super::*;

        #[test]
        fn typed_accessors() {
            let params = ProviderParams::with_text("hi")
                .set("format", "wav")
                .set("sample_rate", 24_000)
                .set("speed", 1.25)
                .set("voice", "nova");

            assert_eq!(params.text(), "hi");
            assert_eq!(params.format(), Some(AudioFormat::Wav));
            assert_eq!(params.sample_rate(), Some(24_000));
            assert!((params.speed() - 1.25).abs() < f64::EPSILON);
            assert!(params.pitch().abs() < f64::EPSILON);
            assert_eq!(params.voice(), Some("nova"));
            assert_eq!(params.model(), None);
        }

        #[test]
        fn overlay_wins_over_existing_keys() {
            let overrides = json!({"voice": "shimmer", "stability": 0.3});
            let params = ProviderParams::with_text("hi")
                .set("voice", "nova")
                .overlay(overrides.as_object().unwrap());

            assert_eq!(params.voice(), Some("shimmer"));
            assert_eq!(params.f64("stability"), Some(0.3));
        }

        #[test]
        fn for_chunk_replaces_only_text() {
            let params = ProviderParams::with_text("long text").set("voice", "nova");
            let chunk = params.for_chunk("long");
            assert_eq!(chunk.text(), "long");
            assert_eq!(chunk.voice(), Some("nova"));
        }
    }

    mod provider_context {
        use super::*;

        #[test]
        fn missing_api_key_is_validation_error() {
            let ctx = context(ResolvedSettings::default());
            let err = ctx.require_api_key(ProviderId::Google).unwrap_err();
            assert_eq!(err.code, crate::error::ErrorCode::ValidationError);
            assert_eq!(err.provider, Some(ProviderId::Google));
        }

        #[test]
        fn base_url_prefers_override_and_trims_slash() {
            let ctx = context(ResolvedSettings::with_api_key("k").base_url("http://localhost:9000/"));
            assert_eq!(ctx.base_url("https://vendor"), "http://localhost:9000");

            let ctx = context(ResolvedSettings::default());
            assert_eq!(ctx.base_url("https://vendor"), "https://vendor");
        }

        #[test]
        fn voice_precedence() {
            let mut settings = ResolvedSettings::default();
            settings.default_voice = Some("configured".to_string());
            let ctx = context(settings);

            let explicit = ProviderParams::with_text("x").set("voice", "explicit");
            assert_eq!(ctx.voice(&explicit, "builtin"), "explicit");
            assert_eq!(ctx.voice(&ProviderParams::with_text("x"), "builtin"), "configured");
            assert_eq!(
                context(ResolvedSettings::default()).voice(&ProviderParams::with_text("x"), "builtin"),
                "builtin"
            );
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn accepts_valid_params() {
            let params = ProviderParams::with_text("hello").set("format", "wav");
            assert!(FixedProvider.validate_params(&params).is_ok());
        }

        #[test]
        fn rejects_blank_text() {
            assert!(FixedProvider.validate_params(&ProviderParams::with_text("  ")).is_err());
        }

        #[test]
        fn rejects_text_over_limit() {
            let err = FixedProvider
                .validate_params(&ProviderParams::with_text("x".repeat(11)))
                .unwrap_err();
            assert!(err.contains("at most 10"));
        }

        #[test]
        fn rejects_unsupported_format() {
            let params = ProviderParams::with_text("hello").set("format", "flac");
            assert!(FixedProvider.validate_params(&params).is_err());
        }

        #[test]
        fn membership_check() {
            assert!(check_membership("voice", None, &["a"]).is_ok());
            assert!(check_membership("voice", Some("a"), &["a"]).is_ok());
            let err = check_membership("voice", Some("b"), &["a", "c"]).unwrap_err();
            assert_eq!(err, "Unknown voice: b. Expected one of: a, c");
        }
    }

    #[tokio::test]
    async fn default_stream_is_not_implemented() {
        let err = FixedProvider
            .stream(&ProviderParams::with_text("hi"), &context(ResolvedSettings::default()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, crate::error::ErrorCode::NotImplemented);
        assert_eq!(err.provider, Some(ProviderId::OpenAi));
    }
}

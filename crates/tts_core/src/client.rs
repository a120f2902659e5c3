//! The generation pipeline
//!
//! [`TtsClient::generate`] validates the request, picks the provider, splits
//! oversized text, runs each chunk through the retry engine and joins the
//! resulting audio. Lifecycle events go to the configured telemetry sink.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::chunker::{char_len, split_observed};
use crate::combiner;
use crate::config::{CallOverrides, TtsConfig};
use crate::error::{ErrorCode, GeneratedError, TtsError, TtsFault};
use crate::http;
use crate::ports::{AudioStream, ProviderContext, ProviderParams, TtsProvider};
use crate::registry::ProviderRegistry;
use crate::request::{GenerateParams, GenerationRequest};
use crate::retry::{self, RetryableError};
use crate::telemetry::{EventName, TelemetryEvent, TelemetrySink, TracingSink};
use crate::types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceInfo,
};

/// Unified text-to-speech client
///
/// Cheap to clone; clones share configuration, registry, connection pool and
/// telemetry sink.
#[derive(Debug, Clone)]
pub struct TtsClient {
    config: Arc<TtsConfig>,
    registry: Arc<ProviderRegistry>,
    http: reqwest::Client,
    telemetry: Arc<dyn TelemetrySink>,
}

/// A request prepared for dispatch
struct Prepared {
    provider: Arc<dyn TtsProvider>,
    params: ProviderParams,
    format: AudioFormat,
    ctx: ProviderContext,
}

impl TtsClient {
    /// Create a client with the built-in providers and a tracing sink
    ///
    /// # Errors
    ///
    /// Returns [`TtsFault::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: impl Into<Arc<TtsConfig>>) -> Result<Self, TtsFault> {
        let config = config.into();
        let http = http::build_client(&config.http)?;

        Ok(Self {
            config,
            registry: Arc::new(ProviderRegistry::with_defaults()),
            http,
            telemetry: Arc::new(TracingSink),
        })
    }

    /// Replace the provider registry
    #[must_use]
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the telemetry sink
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// The configuration this client was built with
    #[must_use]
    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    /// Generate speech for `params`
    ///
    /// # Errors
    ///
    /// - [`TtsError::Generation`] for every expected failure (validation,
    ///   transport, vendor status, unusable audio)
    /// - [`TtsError::Fault`] when configuration references a missing
    ///   environment variable
    #[instrument(skip(self, params), fields(provider = params.provider.as_deref().unwrap_or_default()))]
    pub async fn generate(&self, params: GenerateParams) -> Result<AudioData, TtsError> {
        let start = Instant::now();
        let provider = params.provider.clone();
        let text_length = params.text.as_deref().map(char_len);
        self.emit_start(provider.as_deref(), text_length);

        let result = match GenerationRequest::from_params(params) {
            Ok(request) => self.run(&request).await,
            Err(err) => Err(err.into()),
        };
        self.finish(start, provider.as_deref(), text_length, result)
    }

    /// Generate speech from fully dynamic input
    ///
    /// # Errors
    ///
    /// As [`generate`](Self::generate); additionally a
    /// [`TtsFault::MalformedInput`] if `raw` is not a JSON object.
    #[instrument(skip(self, raw))]
    pub async fn generate_json(&self, raw: Value) -> Result<AudioData, TtsError> {
        let start = Instant::now();
        let provider = raw.get("provider").and_then(Value::as_str).map(str::to_string);
        let text_length = raw.get("text").and_then(Value::as_str).map(char_len);
        self.emit_start(provider.as_deref(), text_length);

        let result = match GenerationRequest::from_value(raw) {
            Ok(request) => self.run(&request).await,
            Err(err) => Err(err),
        };
        self.finish(start, provider.as_deref(), text_length, result)
    }

    /// Stream speech for `params`
    ///
    /// # Errors
    ///
    /// Built-in providers return `not_implemented`; validation and
    /// configuration failures are reported as for [`generate`](Self::generate).
    pub async fn stream(&self, params: GenerateParams) -> Result<AudioStream, TtsError> {
        let request = GenerationRequest::from_params(params)?;
        let prepared = self.prepare(&request)?;
        prepared
            .provider
            .validate_params(&prepared.params)
            .map_err(|reason| GeneratedError::validation(reason).with_provider(request.provider))?;
        prepared.provider.check_credentials(&prepared.ctx)?;

        Ok(prepared.provider.stream(&prepared.params, &prepared.ctx).await?)
    }

    async fn run(&self, request: &GenerationRequest) -> Result<AudioData, TtsError> {
        let Prepared {
            provider,
            params,
            format,
            ctx,
        } = self.prepare(request)?;

        let text_length = char_len(&request.text);
        let chunks = match provider.max_text_length(&params) {
            MaxTextLength::Limited(max) if text_length > max => {
                split_observed(&request.text, max, self.telemetry.as_ref()).map_err(GeneratedError::from)?
            },
            _ => vec![request.text.clone()],
        };
        if chunks.len() > 1 {
            info!(provider = %request.provider, chunks = chunks.len(), text_length, "Splitting text");
        }

        // Reject every chunk before the first network call
        let chunk_params = chunks
            .iter()
            .map(|chunk| {
                let chunk_params = params.for_chunk(chunk);
                provider
                    .validate_params(&chunk_params)
                    .map(|()| chunk_params)
                    .map_err(|reason| GeneratedError::validation(reason).with_provider(request.provider))
            })
            .collect::<Result<Vec<_>, _>>()?;
        provider.check_credentials(&ctx)?;

        let mut segments = Vec::with_capacity(chunk_params.len());
        for (index, chunk) in chunk_params.iter().enumerate() {
            let audio = retry::retry(&request.retry_policy, self.telemetry.as_ref(), || {
                provider.generate(chunk, &ctx)
            })
            .await?;

            if audio.is_empty() {
                return Err(GeneratedError::new(
                    ErrorCode::InvalidProviderResult,
                    format!("{} returned no audio for chunk {}", request.provider, index + 1),
                )
                .with_provider(request.provider)
                .into());
            }
            debug!(chunk = index + 1, size = audio.size_bytes(), "Chunk synthesized");
            segments.push(audio);
        }

        Ok(combiner::concatenate(format, segments).map_err(|e| e.with_provider(request.provider))?)
    }

    fn prepare(&self, request: &GenerationRequest) -> Result<Prepared, TtsError> {
        let provider = self.registry.get(request.provider)?;
        let overrides = CallOverrides {
            api_key: request.api_key_override.clone(),
        };
        let settings = self.config.resolve(request.provider, &overrides)?;
        let format = request.effective_format(&settings)?;
        let params = request.to_provider_params(&settings, format);

        Ok(Prepared {
            provider,
            params,
            format,
            ctx: ProviderContext::new(self.http.clone(), settings, Arc::clone(&self.telemetry)),
        })
    }

    fn emit_start(&self, provider: Option<&str>, text_length: Option<usize>) {
        let mut event = TelemetryEvent::new(EventName::GenerateStart).meta("provider", provider);
        if let Some(len) = text_length {
            event = event.measurement("text_length", len);
        }
        self.telemetry.emit(&event);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn finish(
        &self,
        start: Instant,
        provider: Option<&str>,
        text_length: Option<usize>,
        result: Result<AudioData, TtsError>,
    ) -> Result<AudioData, TtsError> {
        let duration_ms = start.elapsed().as_millis() as u64;
        let with_common = |event: TelemetryEvent| {
            let event = event
                .measurement("duration_ms", duration_ms)
                .meta("provider", provider);
            match text_length {
                Some(len) => event.measurement("text_length", len),
                None => event,
            }
        };

        match &result {
            Ok(audio) => {
                info!(
                    provider,
                    duration_ms,
                    output_size = audio.size_bytes(),
                    format = %audio.format(),
                    "Speech generated"
                );
                self.telemetry.emit(
                    &with_common(TelemetryEvent::new(EventName::GenerateStop))
                        .measurement("output_size", audio.size_bytes())
                        .meta("format", audio.format().extension())
                        .meta("success", true),
                );
            },
            Err(TtsError::Generation(err)) => {
                warn!(provider, duration_ms, code = %err.code, error = %err.message, "Speech generation failed");
                self.telemetry.emit(
                    &with_common(TelemetryEvent::new(EventName::GenerateError)).meta("error", err.snapshot()),
                );
                self.telemetry
                    .emit(&with_common(TelemetryEvent::new(EventName::GenerateStop)).meta("success", false));
            },
            Err(TtsError::Fault(fault)) => {
                warn!(provider, duration_ms, error = %fault, "Speech generation fault");
                self.telemetry.emit(
                    &with_common(TelemetryEvent::new(EventName::GenerateException))
                        .meta("kind", fault_kind(fault))
                        .meta("message", fault.to_string()),
                );
            },
        }

        result
    }

    /// Registered providers
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        self.registry.ids()
    }

    /// Models known for the named provider
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` for an unknown provider name.
    pub fn models(&self, provider: &str) -> Result<Vec<ModelInfo>, GeneratedError> {
        Ok(self.registry.get_by_name(provider)?.models())
    }

    /// Voices known for the named provider
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` for an unknown provider name.
    pub fn voices(&self, provider: &str) -> Result<Vec<VoiceInfo>, GeneratedError> {
        Ok(self.registry.get_by_name(provider)?.voices())
    }

    /// Languages supported by the named provider
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` for an unknown provider name.
    pub fn languages(&self, provider: &str) -> Result<Vec<LanguageInfo>, GeneratedError> {
        Ok(self.registry.get_by_name(provider)?.languages())
    }

    /// Declared capabilities of the named provider
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` for an unknown provider name.
    pub fn capabilities(&self, provider: &str) -> Result<ProviderCapabilities, GeneratedError> {
        Ok(self.registry.get_by_name(provider)?.capabilities())
    }
}

const fn fault_kind(fault: &TtsFault) -> &'static str {
    match fault {
        TtsFault::MissingEnvVar { .. } => "missing_env_var",
        TtsFault::MalformedInput(_) => "malformed_input",
        TtsFault::HttpClient(_) => "http_client",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSettings, SettingValue};
    use crate::ports::ProviderContext;
    use crate::telemetry::RecordingSink;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Scripted provider recording the texts it was asked to speak
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        limit: Option<usize>,
        responses: Mutex<VecDeque<Result<AudioData, GeneratedError>>>,
        texts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(limit: Option<usize>, responses: Vec<Result<AudioData, GeneratedError>>) -> Arc<Self> {
            Arc::new(Self {
                limit,
                responses: Mutex::new(responses.into()),
                texts: Mutex::new(Vec::new()),
            })
        }

        fn texts(&self) -> Vec<String> {
            self.texts.lock().clone()
        }
    }

    #[async_trait]
    impl TtsProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAi
        }

        async fn generate(
            &self,
            params: &ProviderParams,
            _ctx: &ProviderContext,
        ) -> Result<AudioData, GeneratedError> {
            self.texts.lock().push(params.text().to_string());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(AudioData::new(b"x".to_vec(), AudioFormat::Mp3)))
        }

        fn models(&self) -> Vec<ModelInfo> {
            vec![ModelInfo::new("m", "M", self.capabilities().max_text_length)]
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
                supported_formats: vec![AudioFormat::Mp3, AudioFormat::Pcm],
                supported_sample_rates: vec![22_050],
                max_text_length: self.limit.map_or(MaxTextLength::Unbounded, MaxTextLength::Limited),
            }
        }
    }

    fn mp3(bytes: &[u8]) -> Result<AudioData, GeneratedError> {
        Ok(AudioData::new(bytes.to_vec(), AudioFormat::Mp3))
    }

    fn client_with(provider: Arc<ScriptedProvider>) -> (TtsClient, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let client = TtsClient::new(TtsConfig::default())
            .unwrap()
            .with_registry(ProviderRegistry::empty().with(ProviderId::OpenAi, provider))
            .with_telemetry(sink.clone());
        (client, sink)
    }

    fn fast_retry(max_attempts: i64) -> crate::request::RetryOptions {
        crate::request::RetryOptions {
            max_attempts: Some(max_attempts),
            initial_delay_ms: Some(1),
            max_delay_ms: Some(5),
            ..Default::default()
        }
    }

    mod pipeline {
        use super::*;

        #[tokio::test]
        async fn single_chunk_is_returned_as_is() {
            let provider = ScriptedProvider::new(Some(100), vec![mp3(b"audio")]);
            let (client, _) = client_with(provider.clone());

            let audio = client.generate(GenerateParams::new("openai", "Hello")).await.unwrap();

            assert_eq!(audio.data(), b"audio");
            assert_eq!(provider.texts(), vec!["Hello"]);
        }

        #[tokio::test]
        async fn long_text_is_split_and_joined_in_order() {
            let provider = ScriptedProvider::new(Some(12), vec![mp3(b"one"), mp3(b"two"), mp3(b"three")]);
            let (client, sink) = client_with(provider.clone());

            let audio = client
                .generate(GenerateParams::new("openai", "First one. Second one. Third."))
                .await
                .unwrap();

            assert_eq!(provider.texts(), vec!["First one.", "Second one.", "Third."]);
            assert_eq!(audio.data(), b"onetwothree");
            assert_eq!(sink.named(EventName::TextSplit).len(), 1);
        }

        #[tokio::test]
        async fn first_failing_chunk_aborts() {
            let provider = ScriptedProvider::new(
                Some(12),
                vec![
                    mp3(b"one"),
                    Err(GeneratedError::new(ErrorCode::HttpError, "boom").with_status(500)),
                ],
            );
            let (client, _) = client_with(provider.clone());

            let err = client
                .generate(
                    GenerateParams::new("openai", "First one. Second one. Third.").retry(fast_retry(0)),
                )
                .await
                .unwrap_err();

            assert_eq!(err.as_generated().unwrap().code, ErrorCode::HttpError);
            assert_eq!(provider.texts().len(), 2);
        }

        #[tokio::test]
        async fn retries_then_succeeds() {
            let provider = ScriptedProvider::new(
                None,
                vec![Err(GeneratedError::network("reset")), mp3(b"ok")],
            );
            let (client, sink) = client_with(provider.clone());

            let audio = client
                .generate(GenerateParams::new("openai", "Hi").retry(fast_retry(1)))
                .await
                .unwrap();

            assert_eq!(audio.data(), b"ok");
            assert_eq!(provider.texts().len(), 2);
            assert_eq!(sink.named(EventName::RetryAttempt).len(), 1);
        }

        #[tokio::test]
        async fn empty_audio_is_invalid_provider_result() {
            let provider = ScriptedProvider::new(None, vec![mp3(b"")]);
            let (client, _) = client_with(provider);

            let err = client
                .generate(GenerateParams::new("openai", "Hi").retry(fast_retry(0)))
                .await
                .unwrap_err();

            assert_eq!(err.as_generated().unwrap().code, ErrorCode::InvalidProviderResult);
        }

        #[tokio::test]
        async fn provider_validation_runs_before_any_call() {
            let provider = ScriptedProvider::new(None, Vec::new());
            let (client, _) = client_with(provider.clone());

            let err = client
                .generate(GenerateParams::new("openai", "Hi").format("flac"))
                .await
                .unwrap_err();

            let err = err.as_generated().unwrap();
            assert_eq!(err.code, ErrorCode::ValidationError);
            assert_eq!(err.provider, Some(ProviderId::OpenAi));
            assert!(provider.texts().is_empty());
        }

        #[tokio::test]
        async fn unregistered_provider_is_validation_error() {
            let provider = ScriptedProvider::new(None, Vec::new());
            let (client, _) = client_with(provider);

            let err = client.generate(GenerateParams::new("azure", "Hi")).await.unwrap_err();
            assert_eq!(err.as_generated().unwrap().code, ErrorCode::ValidationError);
        }
    }

    mod events {
        use super::*;

        #[tokio::test]
        async fn success_emits_start_and_stop() {
            let (client, sink) = client_with(ScriptedProvider::new(None, vec![mp3(b"abc")]));

            client.generate(GenerateParams::new("openai", "Hello")).await.unwrap();

            assert_eq!(sink.names(), vec![EventName::GenerateStart, EventName::GenerateStop]);
            let stop = &sink.named(EventName::GenerateStop)[0];
            assert_eq!(stop.meta_str("provider"), Some("openai"));
            assert_eq!(stop.measurement_u64("output_size"), Some(3));
            assert_eq!(stop.measurement_u64("text_length"), Some(5));
            assert_eq!(stop.meta_str("format"), Some("mp3"));
            assert_eq!(stop.metadata["success"], true);
            assert!(stop.measurements.contains_key("duration_ms"));
        }

        #[tokio::test]
        async fn validation_failure_emits_error_then_stop() {
            let (client, sink) = client_with(ScriptedProvider::new(None, Vec::new()));

            client.generate(GenerateParams::new("nope", "hi")).await.unwrap_err();

            assert_eq!(
                sink.names(),
                vec![EventName::GenerateStart, EventName::GenerateError, EventName::GenerateStop]
            );
            let error = &sink.named(EventName::GenerateError)[0];
            assert_eq!(error.metadata["error"]["code"], "validation_error");
            assert_eq!(sink.named(EventName::GenerateStop)[0].metadata["success"], false);
        }

        #[tokio::test]
        async fn malformed_input_is_fault_with_exception_event() {
            let (client, sink) = client_with(ScriptedProvider::new(None, Vec::new()));

            let err = client.generate_json(json!("just a string")).await.unwrap_err();

            assert!(err.is_fault());
            assert_eq!(sink.names(), vec![EventName::GenerateStart, EventName::GenerateException]);
            assert_eq!(
                sink.named(EventName::GenerateException)[0].meta_str("kind"),
                Some("malformed_input")
            );
        }
    }

    #[tokio::test]
    async fn missing_env_var_is_fault() {
        let config = TtsConfig::default().with_provider(
            ProviderId::OpenAi,
            ProviderSettings {
                api_key: Some(SettingValue::env("TTS_CORE_CLIENT_TEST_UNSET_VARIABLE")),
                ..ProviderSettings::default()
            },
        );
        let sink = Arc::new(RecordingSink::new());
        let client = TtsClient::new(config)
            .unwrap()
            .with_registry(ProviderRegistry::empty().with(ProviderId::OpenAi, ScriptedProvider::new(None, Vec::new())))
            .with_telemetry(sink.clone());

        let err = client.generate(GenerateParams::new("openai", "Hi")).await.unwrap_err();

        assert!(matches!(err, TtsError::Fault(TtsFault::MissingEnvVar { provider: ProviderId::OpenAi, .. })));
        assert_eq!(sink.named(EventName::GenerateException).len(), 1);
    }

    #[tokio::test]
    async fn stream_is_not_implemented_for_builtins() {
        let client = TtsClient::new(TtsConfig::default()).unwrap();
        let result = client
            .stream(GenerateParams::new("openai", "Hi").api_key("sk-test"))
            .await;

        match result {
            Err(TtsError::Generation(err)) => assert_eq!(err.code, ErrorCode::NotImplemented),
            _ => panic!("expected not_implemented"),
        }
    }

    #[test]
    fn introspection() {
        let client = TtsClient::new(TtsConfig::default()).unwrap();

        assert_eq!(client.providers(), ProviderId::ALL.to_vec());
        assert!(!client.voices("openai").unwrap().is_empty());
        assert!(!client.models("elevenlabs").unwrap().is_empty());
        assert!(!client.languages("google").unwrap().is_empty());
        assert_eq!(
            client.capabilities("azure").unwrap().max_text_length,
            MaxTextLength::Unbounded
        );

        let err = client.voices("nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}

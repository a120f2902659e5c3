//! Generation request parsing and validation
//!
//! [`GenerateParams`] is the raw caller input with every field optional.
//! [`GenerationRequest::from_params`] is the single place where it is
//! checked and normalized; nothing downstream sees unvalidated input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ResolvedSettings;
use crate::error::{ErrorCode, GeneratedError, TtsError, TtsFault};
use crate::ports::ProviderParams;
use crate::retry::RetryPolicy;
use crate::types::{AudioFormat, ProviderId};

/// Sample rate requested when the caller names none
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Raw parameters of a generation call
///
/// Field names are snake_case; the camelCase spellings are accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, alias = "sampleRate")]
    pub sample_rate: Option<i64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, alias = "apiKeyOverride")]
    pub api_key_override: Option<String>,
    /// Vendor-specific options laid over the request fields
    #[serde(default, alias = "providerOpts")]
    pub provider_opts: Option<Value>,
    #[serde(default, alias = "retryOpts")]
    pub retry_opts: Option<RetryOptions>,
}

impl GenerateParams {
    /// Parameters with the two required fields set
    #[must_use]
    pub fn new(provider: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key_override = Some(api_key.into());
        self
    }

    /// Set one vendor-specific option
    #[must_use]
    pub fn provider_opt(mut self, key: &str, value: impl Into<Value>) -> Self {
        let mut opts = match self.provider_opts.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        opts.insert(key.to_string(), value.into());
        self.provider_opts = Some(Value::Object(opts));
        self
    }

    #[must_use]
    pub fn retry(mut self, retry_opts: RetryOptions) -> Self {
        self.retry_opts = Some(retry_opts);
        self
    }
}

/// Raw retry options; unset fields take the [`RetryPolicy`] defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryOptions {
    #[serde(default, alias = "maxAttempts")]
    pub max_attempts: Option<i64>,
    #[serde(default, alias = "initialDelayMs")]
    pub initial_delay_ms: Option<i64>,
    #[serde(default, alias = "maxDelayMs")]
    pub max_delay_ms: Option<i64>,
    #[serde(default, alias = "backoffFactor")]
    pub backoff_factor: Option<f64>,
    /// Error code tags; a leading `:` is ignored
    #[serde(default, alias = "retryableErrorCodes")]
    pub retryable_error_codes: Option<Vec<String>>,
}

impl RetryOptions {
    /// Convert into a policy
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn into_policy(self) -> Result<RetryPolicy, String> {
        let defaults = RetryPolicy::default();

        let policy = RetryPolicy {
            max_attempts: non_negative("max_attempts", self.max_attempts)?
                .unwrap_or(u64::from(defaults.max_attempts))
                .try_into()
                .map_err(|_| "max_attempts is too large".to_string())?,
            initial_delay_ms: non_negative("initial_delay_ms", self.initial_delay_ms)?
                .unwrap_or(defaults.initial_delay_ms),
            max_delay_ms: non_negative("max_delay_ms", self.max_delay_ms)?
                .unwrap_or(defaults.max_delay_ms),
            backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
            retryable_error_codes: self
                .retryable_error_codes
                .unwrap_or_default()
                .iter()
                .map(|code| code.parse::<ErrorCode>())
                .collect::<Result<_, _>>()?,
        };

        policy.validate()?;
        Ok(policy)
    }
}

fn non_negative(field: &str, value: Option<i64>) -> Result<Option<u64>, String> {
    value
        .map(|v| u64::try_from(v).map_err(|_| format!("{field} must not be negative, got {v}")))
        .transpose()
}

/// A validated generation request
///
/// Constructed once per call and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub provider: ProviderId,
    /// Input text, non-blank
    pub text: String,
    pub voice: Option<String>,
    pub model: Option<String>,
    /// Requested format; configuration and then MP3 fill in when absent
    pub format: Option<AudioFormat>,
    pub sample_rate: u32,
    pub speed: f64,
    pub pitch: f64,
    pub language: Option<String>,
    pub api_key_override: Option<String>,
    pub provider_opts: Map<String, Value>,
    pub retry_policy: RetryPolicy,
}

impl GenerationRequest {
    /// Validate raw parameters
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` describing the first invalid field.
    pub fn from_params(params: GenerateParams) -> Result<Self, GeneratedError> {
        let provider = params
            .provider
            .as_deref()
            .ok_or_else(|| GeneratedError::validation("provider is required"))?
            .parse::<ProviderId>()
            .map_err(GeneratedError::validation)?;
        let invalid = |message: String| GeneratedError::validation(message).with_provider(provider);

        let text = params
            .text
            .ok_or_else(|| invalid("text is required".to_string()))?;
        if text.trim().is_empty() {
            return Err(invalid("text must not be empty".to_string()));
        }

        let format = params
            .format
            .as_deref()
            .map(str::parse::<AudioFormat>)
            .transpose()
            .map_err(invalid)?;

        let sample_rate = match params.sample_rate {
            None => DEFAULT_SAMPLE_RATE,
            Some(rate) => u32::try_from(rate)
                .ok()
                .filter(|rate| *rate > 0)
                .ok_or_else(|| invalid(format!("sample_rate must be a positive integer, got {rate}")))?,
        };

        let speed = params.speed.unwrap_or(1.0);
        if !(speed.is_finite() && speed > 0.0) {
            return Err(invalid(format!("speed must be a positive number, got {speed}")));
        }
        let pitch = params.pitch.unwrap_or(0.0);
        if !pitch.is_finite() {
            return Err(invalid(format!("pitch must be a number, got {pitch}")));
        }

        let provider_opts = match params.provider_opts {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(invalid(format!("provider_opts must be an object, got {other}")));
            },
        };

        let retry_policy = params
            .retry_opts
            .map(RetryOptions::into_policy)
            .transpose()
            .map_err(|e| invalid(format!("retry_opts: {e}")))?
            .unwrap_or_default();

        Ok(Self {
            provider,
            text,
            voice: params.voice,
            model: params.model,
            format,
            sample_rate,
            speed,
            pitch,
            language: params.language,
            api_key_override: params.api_key_override,
            provider_opts,
            retry_policy,
        })
    }

    /// Validate fully dynamic input
    ///
    /// # Errors
    ///
    /// - [`TtsFault::MalformedInput`] if `raw` is not a JSON object
    /// - a `validation_error` if a field has the wrong type or value
    pub fn from_value(raw: Value) -> Result<Self, TtsError> {
        if !raw.is_object() {
            return Err(TtsFault::MalformedInput(format!(
                "expected a key/value object, got {}",
                json_kind(&raw)
            ))
            .into());
        }

        let provider = raw
            .get("provider")
            .and_then(Value::as_str)
            .and_then(|name| name.parse::<ProviderId>().ok());
        let params: GenerateParams = serde_json::from_value(raw).map_err(|e| {
            let err = GeneratedError::validation(format!("Invalid parameters: {e}"));
            match provider {
                Some(provider) => err.with_provider(provider),
                None => err,
            }
        })?;

        Ok(Self::from_params(params)?)
    }

    /// Output format after applying the configured default
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` if the configured default is not a known
    /// format.
    pub fn effective_format(&self, settings: &ResolvedSettings) -> Result<AudioFormat, GeneratedError> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        settings
            .default_format
            .as_deref()
            .map_or(Ok(AudioFormat::Mp3), str::parse)
            .map_err(|e| {
                GeneratedError::validation(format!("Configured default_format is invalid: {e}"))
                    .with_provider(self.provider)
            })
    }

    /// Merge request fields, configured defaults and `provider_opts` into the
    /// parameters handed to the provider
    ///
    /// `provider_opts` keys win over fields of the same name.
    #[must_use]
    pub fn to_provider_params(&self, settings: &ResolvedSettings, format: AudioFormat) -> ProviderParams {
        let mut params = ProviderParams::with_text(self.text.as_str())
            .set("format", format.extension())
            .set("sample_rate", self.sample_rate)
            .set("speed", self.speed)
            .set("pitch", self.pitch);

        let voice = self.voice.as_ref().or(settings.default_voice.as_ref());
        if let Some(voice) = voice {
            params = params.set("voice", voice.as_str());
        }
        let model = self.model.as_ref().or(settings.default_model.as_ref());
        if let Some(model) = model {
            params = params.set("model", model.as_str());
        }
        if let Some(language) = &self.language {
            params = params.set("language", language.as_str());
        }

        params.overlay(&self.provider_opts)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

//! Speech generation errors
//!
//! Every expected failure is folded into [`GeneratedError`]. Deployment or
//! caller-contract problems are [`TtsFault`]s and are never converted into the
//! normalized shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ProviderId;

/// Taxonomy tag carried by every [`GeneratedError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Bad or missing input parameters, caught before any network call
    ValidationError,
    /// Transport-level failure, no response received
    NetworkError,
    /// Response received with a failing status
    HttpError,
    /// Feature intentionally not built for a provider
    NotImplemented,
    /// An operation under retry returned an unrecognized shape
    InvalidReturn,
    /// A provider returned a success value that is not usable audio
    InvalidProviderResult,
    /// HTTP 429 from the vendor
    RateLimited,
    /// Anything not otherwise classified
    Error,
}

impl ErrorCode {
    /// Wire tag of this code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::NetworkError => "network_error",
            Self::HttpError => "http_error",
            Self::NotImplemented => "not_implemented",
            Self::InvalidReturn => "invalid_return",
            Self::InvalidProviderResult => "invalid_provider_result",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches(':') {
            "validation_error" => Ok(Self::ValidationError),
            "network_error" => Ok(Self::NetworkError),
            "http_error" => Ok(Self::HttpError),
            "not_implemented" => Ok(Self::NotImplemented),
            "invalid_return" => Ok(Self::InvalidReturn),
            "invalid_provider_result" => Ok(Self::InvalidProviderResult),
            "rate_limited" => Ok(Self::RateLimited),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown error code: {other}")),
        }
    }
}

/// Raw response headers, in the order the vendor sent them
pub type ResponseHeaders = Vec<(String, String)>;

/// The normalized error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct GeneratedError {
    /// Taxonomy tag
    pub code: ErrorCode,
    /// Human-readable description
    pub message: String,
    /// Vendor the failure came from, if known
    pub provider: Option<ProviderId>,
    /// HTTP status, if a response was received
    pub status: Option<u16>,
    /// Raw response headers, if a response was received
    pub headers: Option<ResponseHeaders>,
}

impl GeneratedError {
    /// Create an error with just a code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            status: None,
            headers: None,
        }
    }

    /// Shorthand for a `validation_error`
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Shorthand for a `network_error`
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Shorthand for a `not_implemented` error
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }

    /// Attach the provider
    #[must_use]
    pub const fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attach the HTTP status
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach raw response headers
    #[must_use]
    pub fn with_headers(mut self, headers: ResponseHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Case-insensitive lookup of a response header
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Unexpected faults that are propagated instead of being normalized
#[derive(Debug, Error)]
pub enum TtsFault {
    /// A configuration value points at an environment variable that is not set
    #[error("Environment variable {var} is not set (required by {provider} configuration)")]
    MissingEnvVar {
        /// Provider whose settings referenced the variable
        provider: ProviderId,
        /// Variable name
        var: String,
    },

    /// The raw caller input could not be interpreted as a parameter set at all
    #[error("Malformed generation input: {0}")]
    MalformedInput(String),

    /// The outbound HTTP transport could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Caller-facing failure of a pipeline call
#[derive(Debug, Error)]
pub enum TtsError {
    /// Generation failed in an expected, normalized way
    #[error(transparent)]
    Generation(#[from] GeneratedError),

    /// The system itself misbehaved or was misconfigured
    #[error(transparent)]
    Fault(#[from] TtsFault),
}

impl TtsError {
    /// Returns the normalized error, if this is an expected failure
    #[must_use]
    pub const fn as_generated(&self) -> Option<&GeneratedError> {
        match self {
            Self::Generation(err) => Some(err),
            Self::Fault(_) => None,
        }
    }

    /// Returns true if this is a fault rather than a normalized error
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_use_snake_case_tags() {
        assert_eq!(ErrorCode::ValidationError.to_string(), "validation_error");
        assert_eq!(ErrorCode::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            serde_json::to_string(&ErrorCode::InvalidProviderResult).unwrap(),
            "\"invalid_provider_result\""
        );
    }

    #[test]
    fn error_code_parses_with_and_without_colon() {
        assert_eq!(
            "network_error".parse::<ErrorCode>().unwrap(),
            ErrorCode::NetworkError
        );
        assert_eq!(
            ":http_error".parse::<ErrorCode>().unwrap(),
            ErrorCode::HttpError
        );
        assert!("teapot".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn generated_error_display() {
        let err = GeneratedError::validation("text is required");
        assert_eq!(err.to_string(), "validation_error: text is required");
    }

    #[test]
    fn generated_error_builders() {
        let err = GeneratedError::new(ErrorCode::HttpError, "HTTP 500")
            .with_provider(ProviderId::OpenAi)
            .with_status(500)
            .with_headers(vec![("x-request-id".to_string(), "abc".to_string())]);

        assert_eq!(err.provider, Some(ProviderId::OpenAi));
        assert_eq!(err.status, Some(500));
        assert_eq!(err.header("X-Request-Id"), Some("abc"));
        assert_eq!(err.header("retry-after"), None);
    }

    #[test]
    fn header_lookup_without_headers() {
        let err = GeneratedError::network("connection refused");
        assert!(err.header("retry-after").is_none());
    }

    #[test]
    fn tts_error_distinguishes_faults() {
        let generated: TtsError = GeneratedError::validation("bad").into();
        let fault: TtsError = TtsFault::MalformedInput("not an object".to_string()).into();

        assert!(!generated.is_fault());
        assert!(generated.as_generated().is_some());
        assert!(fault.is_fault());
        assert!(fault.as_generated().is_none());
    }

    #[test]
    fn missing_env_var_fault_message() {
        let fault = TtsFault::MissingEnvVar {
            provider: ProviderId::ElevenLabs,
            var: "ELEVENLABS_API_KEY".to_string(),
        };
        assert_eq!(
            fault.to_string(),
            "Environment variable ELEVENLABS_API_KEY is not set (required by elevenlabs configuration)"
        );
    }
}

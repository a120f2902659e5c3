//! TTS Core - one client for several text-to-speech vendors
//!
//! Normalizes vendor request and response shapes behind a single
//! [`TtsClient::generate`] call. Oversized text is split at sentence
//! boundaries and the audio joined again, every vendor call is retried with
//! exponential backoff, and lifecycle events go to a pluggable
//! [`TelemetrySink`].
//!
//! # Architecture
//!
//! This crate follows the ports & adapters pattern:
//! - `ports` defines the [`TtsProvider`] trait (port)
//! - `providers` contains the vendor integrations (adapters)
//! - `client` runs the generation pipeline on top of `chunker`, `retry` and
//!   `combiner`
//!
//! # Supported Providers
//!
//! - OpenAI, ElevenLabs, Google Cloud, Azure, Amazon Polly
//! - PlayHT (registered, not implemented)
//!
//! # Example
//!
//! ```ignore
//! use tts_core::{GenerateParams, TtsClient, TtsConfig};
//!
//! let client = TtsClient::new(TtsConfig::load()?)?;
//!
//! let audio = client
//!     .generate(GenerateParams::new("openai", "Hello, world!").voice("nova"))
//!     .await?;
//! std::fs::write(audio.filename("hello"), audio.data())?;
//! ```

pub mod chunker;
pub mod client;
pub mod combiner;
pub mod config;
pub mod error;
pub mod http;
pub mod ports;
pub mod providers;
pub mod registry;
pub mod request;
pub mod retry;
pub mod telemetry;
pub mod types;

pub use client::TtsClient;
pub use config::{CallOverrides, ProviderSettings, ResolvedSettings, SettingValue, TtsConfig};
pub use error::{ErrorCode, GeneratedError, TtsError, TtsFault};
pub use ports::{AudioStream, ProviderContext, ProviderParams, TtsProvider};
pub use registry::ProviderRegistry;
pub use request::{GenerateParams, GenerationRequest, RetryOptions};
pub use retry::RetryPolicy;
pub use telemetry::{
    EventName, FanoutSink, MetricsSink, NoopSink, RecordingSink, TelemetryEvent, TelemetrySink,
    TracingSink,
};
pub use types::{
    AudioData, AudioFormat, LanguageInfo, MaxTextLength, ModelInfo, ProviderCapabilities,
    ProviderId, VoiceGender, VoiceInfo,
};

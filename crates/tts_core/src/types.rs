//! Types for speech generation
//!
//! Contains provider identifiers, audio formats, audio buffers, and the
//! descriptive catalog entries each provider exposes.

use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Closed set of supported TTS vendors
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// OpenAI audio speech API
    #[serde(rename = "openai")]
    OpenAi,
    /// ElevenLabs text-to-speech API
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
    /// Google Cloud Text-to-Speech
    Google,
    /// Azure Cognitive Services Speech
    Azure,
    /// Amazon Polly
    Polly,
    /// PlayHT (not implemented yet)
    #[serde(rename = "playht")]
    PlayHt,
}

impl ProviderId {
    /// All providers, in registry order
    pub const ALL: [Self; 6] = [
        Self::OpenAi,
        Self::ElevenLabs,
        Self::Google,
        Self::Azure,
        Self::Polly,
        Self::PlayHt,
    ];

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::ElevenLabs => "elevenlabs",
            Self::Google => "google",
            Self::Azure => "azure",
            Self::Polly => "polly",
            Self::PlayHt => "playht",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches(':').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown provider: {s}. Expected one of: {}",
                    Self::ALL.map(|id| id.as_str()).join(", ")
                )
            })
    }
}

/// Supported output audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MP3 format
    Mp3,
    /// WAV format (uncompressed, with RIFF header)
    Wav,
    /// OGG container (Vorbis or Opus)
    Ogg,
    /// Opus codec
    Opus,
    /// AAC format
    Aac,
    /// FLAC format (lossless)
    Flac,
    /// Raw 16-bit little-endian PCM
    Pcm,
    /// G.711 mu-law
    Ulaw,
}

impl AudioFormat {
    /// All formats
    pub const ALL: [Self; 8] = [
        Self::Mp3,
        Self::Wav,
        Self::Ogg,
        Self::Opus,
        Self::Aac,
        Self::Flac,
        Self::Pcm,
        Self::Ulaw,
    ];

    /// Get the MIME type for this audio format
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
            Self::Opus => "audio/opus",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Pcm => "audio/pcm",
            Self::Ulaw => "audio/basic",
        }
    }

    /// Get the file extension for this audio format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Pcm => "pcm",
            Self::Ulaw => "ulaw",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches(':').to_ascii_lowercase().as_str() {
            "mp3" | "mpeg" => Ok(Self::Mp3),
            "wav" | "wave" => Ok(Self::Wav),
            "ogg" | "ogg_vorbis" => Ok(Self::Ogg),
            "opus" => Ok(Self::Opus),
            "aac" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            "pcm" | "linear16" => Ok(Self::Pcm),
            "ulaw" | "mulaw" => Ok(Self::Ulaw),
            other => Err(format!("Unsupported audio format: {other}")),
        }
    }
}

/// Container for generated audio with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioData {
    /// Raw audio bytes
    data: Bytes,
    /// Audio format
    format: AudioFormat,
    /// Sample rate in Hz (if known)
    sample_rate: Option<u32>,
}

impl AudioData {
    /// Create new audio data
    #[must_use]
    pub fn new(data: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self {
            data: data.into(),
            format,
            sample_rate: None,
        }
    }

    /// Create an empty buffer in the given format
    #[must_use]
    pub const fn empty(format: AudioFormat) -> Self {
        Self {
            data: Bytes::new(),
            format,
            sample_rate: None,
        }
    }

    /// Set the sample rate
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Get the raw audio bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume and return the raw audio bytes
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Get the audio format
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Get the sample rate (if known)
    #[must_use]
    pub const fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Get the size of the audio data in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if the audio data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the MIME type for this audio
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Generate a filename with appropriate extension
    #[must_use]
    pub fn filename(&self, base: &str) -> String {
        format!("{}.{}", base, self.format.extension())
    }

    /// Append raw bytes of several buffers into one
    pub(crate) fn join_bytes<'a>(parts: impl Iterator<Item = &'a Self>, capacity: usize) -> Bytes {
        let mut buf = BytesMut::with_capacity(capacity);
        for part in parts {
            buf.extend_from_slice(&part.data);
        }
        buf.freeze()
    }
}

/// Maximum input text length a provider accepts in one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxTextLength {
    /// At most this many characters
    Limited(usize),
    /// No practical limit
    Unbounded,
}

impl MaxTextLength {
    /// Returns the limit, if any
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        match self {
            Self::Limited(max) => Some(*max),
            Self::Unbounded => None,
        }
    }

    /// Whether a text of `len` characters fits
    #[must_use]
    pub const fn fits(&self, len: usize) -> bool {
        match self {
            Self::Limited(max) => len <= *max,
            Self::Unbounded => true,
        }
    }
}

/// Declared limits and features of a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Whether the provider can stream audio
    pub streaming_supported: bool,
    /// Output formats the provider can produce
    pub supported_formats: Vec<AudioFormat>,
    /// Sample rates the provider can produce
    pub supported_sample_rates: Vec<u32>,
    /// Default maximum input length
    pub max_text_length: MaxTextLength,
}

impl ProviderCapabilities {
    /// Whether the given format is supported
    #[must_use]
    pub fn supports_format(&self, format: AudioFormat) -> bool {
        self.supported_formats.contains(&format)
    }
}

/// Information about an available voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Voice identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description of the voice
    pub description: Option<String>,
    /// Supported languages
    pub languages: Vec<String>,
    /// Voice gender (if known)
    pub gender: Option<VoiceGender>,
}

impl VoiceInfo {
    /// Create a new voice info
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            languages: Vec::new(),
            gender: None,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the supported languages
    #[must_use]
    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the gender
    #[must_use]
    pub const fn with_gender(mut self, gender: VoiceGender) -> Self {
        self.gender = Some(gender);
        self
    }
}

/// Voice gender classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    /// Male voice
    Male,
    /// Female voice
    Female,
    /// Neutral/androgynous voice
    Neutral,
}

/// Information about a synthesis model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as sent to the vendor
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Maximum input length for this model
    pub max_text_length: MaxTextLength,
}

impl ModelInfo {
    /// Create a new model info
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, max_text_length: MaxTextLength) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_text_length,
        }
    }
}

/// A language a provider can speak
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// BCP-47 or ISO 639-1 code
    pub code: String,
    /// English name
    pub name: String,
}

impl LanguageInfo {
    /// Create a new language entry
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

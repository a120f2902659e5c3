//! Configuration for the TTS client
//!
//! Loaded once at startup and never mutated afterwards. Per-provider settings
//! may point at environment variables; those are looked up on every call by
//! [`TtsConfig::resolve`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TtsFault;
use crate::types::ProviderId;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Outbound HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Settings per provider
    #[serde(default)]
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
}

/// Outbound HTTP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Receive timeout per request in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// User-Agent header sent to vendors
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_timeout_ms() -> u64 {
    120_000 // 2 minutes, synthesis of long text is slow
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    concat!("tts-core/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// A setting given literally or through an environment variable
///
/// ```toml
/// api_key = "sk-literal"
/// api_key = { env = "OPENAI_API_KEY" }
/// region = { env = "AWS_REGION", default = "eu-west-1" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Environment indirection with optional fallback
    Env {
        /// Variable name
        env: String,
        /// Value used when the variable is unset
        #[serde(default)]
        default: Option<String>,
    },
    /// Literal value
    Literal(String),
}

impl SettingValue {
    /// Literal setting
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Environment indirection without fallback
    #[must_use]
    pub fn env(var: impl Into<String>) -> Self {
        Self::Env {
            env: var.into(),
            default: None,
        }
    }

    fn resolve_with(
        &self,
        provider: ProviderId,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String, TtsFault> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Env { env, default } => lookup(env)
                .or_else(|| default.clone())
                .ok_or_else(|| TtsFault::MissingEnvVar {
                    provider,
                    var: env.clone(),
                }),
        }
    }
}

/// Credentials and defaults for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key or subscription key
    #[serde(default)]
    pub api_key: Option<SettingValue>,

    /// AWS access key id (Polly)
    #[serde(default)]
    pub access_key_id: Option<SettingValue>,

    /// AWS secret access key (Polly)
    #[serde(default)]
    pub secret_access_key: Option<SettingValue>,

    /// AWS session token (Polly, temporary credentials)
    #[serde(default)]
    pub session_token: Option<SettingValue>,

    /// Cloud region (Azure, Polly)
    #[serde(default)]
    pub region: Option<SettingValue>,

    /// Endpoint override, mainly for proxies and tests
    #[serde(default)]
    pub base_url: Option<SettingValue>,

    /// Voice used when the request names none
    #[serde(default)]
    pub default_voice: Option<SettingValue>,

    /// Model used when the request names none
    #[serde(default)]
    pub default_model: Option<SettingValue>,

    /// Output format used when the request names none
    #[serde(default)]
    pub default_format: Option<SettingValue>,
}

/// Call-time overrides layered over the configured settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOverrides {
    /// Replaces the configured API key
    pub api_key: Option<String>,
}

/// Effective settings for one call, with all indirections resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    /// API key or subscription key
    pub api_key: Option<String>,
    /// AWS access key id
    pub access_key_id: Option<String>,
    /// AWS secret access key
    pub secret_access_key: Option<String>,
    /// AWS session token
    pub session_token: Option<String>,
    /// Cloud region
    pub region: Option<String>,
    /// Endpoint override
    pub base_url: Option<String>,
    /// Default voice
    pub default_voice: Option<String>,
    /// Default model
    pub default_model: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
}

impl ResolvedSettings {
    /// Settings carrying only an API key
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Set the endpoint override
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the region
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl TtsConfig {
    /// Load configuration from `tts.toml` (optional) and `TTS__*` environment
    /// variables
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("tts")
    }

    /// Load configuration from the given file stem plus environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized.
    pub fn load_from(file: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            // Nested keys use a double underscore, e.g. TTS__HTTP__TIMEOUT_MS
            .add_source(
                config::Environment::with_prefix("TTS")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Parse configuration from a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or does not match
    /// the configuration shape.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error message if a timeout is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.http.timeout_ms == 0 {
            return Err("http.timeout_ms must be greater than zero".to_string());
        }
        if self.http.connect_timeout_ms == 0 {
            return Err("http.connect_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Add or replace the settings of one provider
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderId, settings: ProviderSettings) -> Self {
        self.providers.insert(provider, settings);
        self
    }

    /// Resolve effective settings for `provider`, reading the process
    /// environment
    ///
    /// # Errors
    ///
    /// Returns [`TtsFault::MissingEnvVar`] if a referenced variable is unset
    /// and has no default.
    pub fn resolve(
        &self,
        provider: ProviderId,
        overrides: &CallOverrides,
    ) -> Result<ResolvedSettings, TtsFault> {
        self.resolve_with(provider, overrides, &|name: &str| std::env::var(name).ok())
    }

    /// Resolve effective settings using a custom variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`TtsFault::MissingEnvVar`] if a referenced variable is unset
    /// and has no default.
    pub fn resolve_with(
        &self,
        provider: ProviderId,
        overrides: &CallOverrides,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<ResolvedSettings, TtsFault> {
        let Some(settings) = self.providers.get(&provider) else {
            return Ok(ResolvedSettings {
                api_key: overrides.api_key.clone(),
                ..ResolvedSettings::default()
            });
        };

        let field = |value: &Option<SettingValue>| -> Result<Option<String>, TtsFault> {
            value
                .as_ref()
                .map(|v| v.resolve_with(provider, lookup))
                .transpose()
        };

        // An explicit per-call key makes the configured one irrelevant
        let api_key = match &overrides.api_key {
            Some(key) => Some(key.clone()),
            None => field(&settings.api_key)?,
        };

        Ok(ResolvedSettings {
            api_key,
            access_key_id: field(&settings.access_key_id)?,
            secret_access_key: field(&settings.secret_access_key)?,
            session_token: field(&settings.session_token)?,
            region: field(&settings.region)?,
            base_url: field(&settings.base_url)?,
            default_voice: field(&settings.default_voice)?,
            default_model: field(&settings.default_model)?,
            default_format: field(&settings.default_format)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "OPENAI_API_KEY" => Some("sk-from-env".to_string()),
            "AWS_REGION" => Some("eu-central-1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn default_config_values() {
        let config = TtsConfig::default();
        assert_eq!(config.http.timeout_ms, 120_000);
        assert_eq!(config.http.connect_timeout_ms, 10_000);
        assert!(config.http.user_agent.starts_with("tts-core/"));
        assert!(config.providers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_toml_with_literal_and_env_settings() {
        let config = TtsConfig::from_toml_str(
            r#"
            [http]
            timeout_ms = 5000

            [providers.openai]
            api_key = { env = "OPENAI_API_KEY" }
            default_voice = "nova"

            [providers.polly]
            region = { env = "AWS_REGION", default = "us-west-2" }
            "#,
        )
        .unwrap();

        assert_eq!(config.http.timeout_ms, 5000);
        assert_eq!(config.http.connect_timeout_ms, 10_000);

        let openai = &config.providers[&ProviderId::OpenAi];
        assert_eq!(openai.api_key, Some(SettingValue::env("OPENAI_API_KEY")));
        assert_eq!(openai.default_voice, Some(SettingValue::literal("nova")));
    }

    #[test]
    fn resolves_env_indirection() {
        let config = TtsConfig::default().with_provider(
            ProviderId::OpenAi,
            ProviderSettings {
                api_key: Some(SettingValue::env("OPENAI_API_KEY")),
                default_model: Some(SettingValue::literal("tts-1-hd")),
                ..ProviderSettings::default()
            },
        );

        let resolved = config
            .resolve_with(ProviderId::OpenAi, &CallOverrides::default(), &fake_env)
            .unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("sk-from-env"));
        assert_eq!(resolved.default_model.as_deref(), Some("tts-1-hd"));
        assert_eq!(resolved.region, None);
    }

    #[test]
    fn env_default_is_used_when_unset() {
        let config = TtsConfig::default().with_provider(
            ProviderId::Polly,
            ProviderSettings {
                region: Some(SettingValue::Env {
                    env: "POLLY_REGION_UNSET".to_string(),
                    default: Some("us-west-2".to_string()),
                }),
                ..ProviderSettings::default()
            },
        );

        let resolved = config
            .resolve_with(ProviderId::Polly, &CallOverrides::default(), &no_env)
            .unwrap();
        assert_eq!(resolved.region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn missing_env_var_is_a_fault() {
        let config = TtsConfig::default().with_provider(
            ProviderId::ElevenLabs,
            ProviderSettings {
                api_key: Some(SettingValue::env("ELEVENLABS_API_KEY")),
                ..ProviderSettings::default()
            },
        );

        let err = config
            .resolve_with(ProviderId::ElevenLabs, &CallOverrides::default(), &no_env)
            .unwrap_err();
        assert!(matches!(
            err,
            TtsFault::MissingEnvVar { provider: ProviderId::ElevenLabs, ref var } if var == "ELEVENLABS_API_KEY"
        ));
    }

    #[test]
    fn api_key_override_wins() {
        let config = TtsConfig::default().with_provider(
            ProviderId::OpenAi,
            ProviderSettings {
                api_key: Some(SettingValue::env("UNSET_BUT_OVERRIDDEN")),
                ..ProviderSettings::default()
            },
        );
        let overrides = CallOverrides {
            api_key: Some("sk-call".to_string()),
        };

        let resolved = config
            .resolve_with(ProviderId::OpenAi, &overrides, &no_env)
            .unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("sk-call"));
    }

    #[test]
    fn unconfigured_provider_resolves_to_overrides_only() {
        let overrides = CallOverrides {
            api_key: Some("k".to_string()),
        };
        let resolved = TtsConfig::default()
            .resolve_with(ProviderId::Google, &overrides, &no_env)
            .unwrap();
        assert_eq!(resolved, ResolvedSettings::with_api_key("k"));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let mut config = TtsConfig::default();
        config.http.timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}

//! tts-cli
//!
//! Command-line front end for the unified text-to-speech client.

#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tts_core::{GenerateParams, RetryOptions, TtsClient, TtsConfig};

/// tts-cli
#[derive(Parser)]
#[command(name = "tts-cli")]
#[command(author, version, about = "Unified text-to-speech CLI", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log as JSON lines instead of plain text
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file stem, read as `<stem>.toml` when present
    #[arg(short, long, default_value = "tts", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize speech and write it to a file
    ///
    /// Example: tts-cli generate --provider openai --text "Hello" --voice nova
    Generate(GenerateArgs),

    /// List registered providers
    Providers,

    /// List the voices of a provider
    Voices {
        /// Provider name
        provider: String,
    },

    /// List the models of a provider
    Models {
        /// Provider name
        provider: String,
    },

    /// List the languages of a provider
    Languages {
        /// Provider name
        provider: String,
    },

    /// Show the declared capabilities of a provider
    Capabilities {
        /// Provider name
        provider: String,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Provider name (openai, elevenlabs, google, azure, polly, playht)
    #[arg(short, long)]
    provider: String,

    /// Text to speak
    #[arg(short, long)]
    text: String,

    #[arg(long)]
    voice: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Audio format (mp3, wav, ogg, opus, aac, flac, pcm, ulaw)
    #[arg(short, long)]
    format: Option<String>,

    #[arg(long)]
    sample_rate: Option<i64>,

    #[arg(long)]
    speed: Option<f64>,

    #[arg(long)]
    pitch: Option<f64>,

    #[arg(long)]
    language: Option<String>,

    /// API key for this call only
    #[arg(long)]
    api_key: Option<String>,

    /// Vendor option as key=value; values are parsed as JSON when possible
    #[arg(long = "opt", value_parser = parse_opt)]
    opts: Vec<(String, Value)>,

    /// Retries after the first attempt
    #[arg(long)]
    max_attempts: Option<i64>,

    /// Output file (defaults to speech.<format>)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl GenerateArgs {
    fn to_params(&self) -> GenerateParams {
        let mut params = GenerateParams {
            voice: self.voice.clone(),
            model: self.model.clone(),
            format: self.format.clone(),
            sample_rate: self.sample_rate,
            speed: self.speed,
            pitch: self.pitch,
            language: self.language.clone(),
            api_key_override: self.api_key.clone(),
            ..GenerateParams::new(&self.provider, &self.text)
        };
        for (key, value) in &self.opts {
            params = params.provider_opt(key, value.clone());
        }
        if let Some(max_attempts) = self.max_attempts {
            params = params.retry(RetryOptions {
                max_attempts: Some(max_attempts),
                ..RetryOptions::default()
            });
        }
        params
    }
}

/// Parse a `key=value` vendor option
fn parse_opt(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter_from_verbosity(verbose)));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = TtsConfig::load_from(&cli.config).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        TtsConfig::default()
    });
    config.validate().map_err(anyhow::Error::msg)?;
    let client = TtsClient::new(config).context("failed to build TTS client")?;

    match cli.command {
        Commands::Generate(args) => {
            let audio = client
                .generate(args.to_params())
                .await
                .context("speech generation failed")?;

            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(audio.filename("speech")));
            tokio::fs::write(&output, audio.data())
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!("✅ Wrote {} bytes of {} to {}", audio.size_bytes(), audio.format(), output.display());
        },

        Commands::Providers => {
            let names: Vec<String> = client.providers().iter().map(ToString::to_string).collect();
            print_json(&names)?;
        },

        Commands::Voices { provider } => print_json(&client.voices(&provider)?)?,

        Commands::Models { provider } => print_json(&client.models(&provider)?)?,

        Commands::Languages { provider } => print_json(&client.languages(&provider)?)?,

        Commands::Capabilities { provider } => print_json(&client.capabilities(&provider)?)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    mod verbosity {
        use super::*;

        #[test]
        fn levels() {
            assert_eq!(log_filter_from_verbosity(0), "warn");
            assert_eq!(log_filter_from_verbosity(1), "info");
            assert_eq!(log_filter_from_verbosity(2), "debug");
            assert_eq!(log_filter_from_verbosity(3), "trace");
            assert_eq!(log_filter_from_verbosity(10), "trace");
        }
    }

    mod opts {
        use super::*;

        #[test]
        fn json_values_are_typed() {
            assert_eq!(parse_opt("stability=0.5").unwrap(), ("stability".to_string(), json!(0.5)));
            assert_eq!(parse_opt("flag=true").unwrap(), ("flag".to_string(), json!(true)));
        }

        #[test]
        fn other_values_are_strings() {
            assert_eq!(
                parse_opt("instructions=speak softly").unwrap(),
                ("instructions".to_string(), json!("speak softly"))
            );
        }

        #[test]
        fn value_may_contain_equals() {
            assert_eq!(parse_opt("a=b=c").unwrap(), ("a".to_string(), json!("b=c")));
        }

        #[test]
        fn rejects_missing_separator_and_empty_key() {
            assert!(parse_opt("novalue").is_err());
            assert!(parse_opt("=1").is_err());
        }
    }

    mod commands {
        use super::*;

        #[test]
        fn generate_maps_onto_params() {
            let cli = parse(&[
                "tts-cli",
                "generate",
                "--provider",
                "elevenlabs",
                "--text",
                "Hello",
                "--voice",
                "rachel",
                "--sample-rate",
                "16000",
                "--opt",
                "stability=0.3",
                "--max-attempts",
                "1",
            ])
            .unwrap();

            let Commands::Generate(args) = cli.command else {
                panic!("expected generate");
            };
            let params = args.to_params();

            assert_eq!(params.provider.as_deref(), Some("elevenlabs"));
            assert_eq!(params.text.as_deref(), Some("Hello"));
            assert_eq!(params.voice.as_deref(), Some("rachel"));
            assert_eq!(params.sample_rate, Some(16_000));
            assert_eq!(params.provider_opts, Some(json!({"stability": 0.3})));
            assert_eq!(params.retry_opts.unwrap().max_attempts, Some(1));
        }

        #[test]
        fn generate_requires_text() {
            assert!(parse(&["tts-cli", "generate", "--provider", "openai"]).is_err());
        }

        #[test]
        fn introspection_takes_provider() {
            let cli = parse(&["tts-cli", "-vv", "voices", "azure"]).unwrap();
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.command, Commands::Voices { ref provider } if provider == "azure"));
        }

        #[test]
        fn global_flags_after_subcommand() {
            let cli = parse(&["tts-cli", "providers", "--json-logs", "--config", "other"]).unwrap();
            assert!(cli.json_logs);
            assert_eq!(cli.config, "other");
        }
    }
}

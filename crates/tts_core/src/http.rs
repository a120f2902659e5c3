//! Shared vendor transport
//!
//! Sends a prepared request, reports an `http.request` event, and folds
//! transport and status failures into [`GeneratedError`].

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{ErrorCode, GeneratedError, ResponseHeaders, TtsFault};
use crate::ports::ProviderContext;
use crate::telemetry::{EventName, TelemetryEvent};
use crate::types::{AudioData, AudioFormat, ProviderId};

/// Pulls a human-readable message out of a vendor error body
pub type ErrorExtractor = fn(&str) -> Option<String>;

/// Build the pooled client shared by all providers
///
/// # Errors
///
/// Returns [`TtsFault::HttpClient`] if the TLS backend cannot be initialised.
pub fn build_client(config: &HttpConfig) -> Result<Client, TtsFault> {
    Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| TtsFault::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// Execute `request` and return the response if its status is a success
///
/// # Errors
///
/// - `network_error` when no response arrives
/// - `rate_limited` for 429
/// - `http_error` for any other failing status, with the message taken from
///   the body via `extract` or `HTTP {status}` otherwise
#[allow(clippy::cast_possible_truncation)]
pub async fn send(
    ctx: &ProviderContext,
    provider: ProviderId,
    request: RequestBuilder,
    extract: ErrorExtractor,
) -> Result<Response, GeneratedError> {
    let request = request
        .build()
        .map_err(|e| GeneratedError::network(format!("Invalid request: {e}")).with_provider(provider))?;
    let method = request.method().to_string();
    let host = request.url().host_str().unwrap_or_default().to_string();
    let path = request.url().path().to_string();

    let start = Instant::now();
    let result = ctx.http.execute(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let event = TelemetryEvent::new(EventName::HttpRequest)
        .measurement("duration_ms", duration_ms)
        .meta("provider", provider.as_str())
        .meta("method", method)
        .meta("host", host)
        .meta("path", path);

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Vendor request failed");
            ctx.telemetry.emit(&event.meta("error", e.to_string()));
            let message = if e.is_timeout() {
                format!("Request timed out: {e}")
            } else {
                format!("Request failed: {e}")
            };
            return Err(GeneratedError::network(message).with_provider(provider));
        },
    };

    let status = response.status();
    ctx.telemetry.emit(&event.meta("status", status.as_u16()));

    if status.is_success() {
        debug!(provider = %provider, status = status.as_u16(), duration_ms, "Vendor request succeeded");
        return Ok(response);
    }

    let headers = collect_headers(&response);
    let body = response.text().await.unwrap_or_default();
    let message = extract(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    warn!(provider = %provider, status = status.as_u16(), message = %message, "Vendor returned an error");

    let code = if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorCode::RateLimited
    } else {
        ErrorCode::HttpError
    };

    Err(GeneratedError::new(code, message)
        .with_provider(provider)
        .with_status(status.as_u16())
        .with_headers(headers))
}

/// Read a successful response body as audio
///
/// # Errors
///
/// Returns `network_error` if the body cannot be read to the end.
pub async fn read_audio(
    provider: ProviderId,
    response: Response,
    format: AudioFormat,
) -> Result<AudioData, GeneratedError> {
    let bytes = response.bytes().await.map_err(|e| {
        GeneratedError::network(format!("Failed to read audio: {e}")).with_provider(provider)
    })?;

    debug!(provider = %provider, audio_size = bytes.len(), "Speech synthesis complete");
    Ok(AudioData::new(bytes, format))
}

fn collect_headers(response: &Response) -> ResponseHeaders {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Extractor that never finds a message
#[must_use]
pub fn no_message(_body: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedSettings;
    use crate::telemetry::RecordingSink;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(sink: Arc<RecordingSink>) -> ProviderContext {
        ProviderContext::new(
            build_client(&HttpConfig::default()).unwrap(),
            ResolvedSettings::default(),
            sink,
        )
    }

    fn json_message(body: &str) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()?
            .get("message")?
            .as_str()
            .map(ToString::to_string)
    }

    #[tokio::test]
    async fn success_passes_response_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speak"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8, 8, 7]))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::new());
        let ctx = context(Arc::clone(&sink));
        let request = ctx.http.post(format!("{}/speak", server.uri()));

        let response = send(&ctx, ProviderId::OpenAi, request, no_message).await.unwrap();
        let audio = read_audio(ProviderId::OpenAi, response, AudioFormat::Mp3).await.unwrap();

        assert_eq!(audio.data(), &[9, 8, 7]);
        let events = sink.named(EventName::HttpRequest);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].meta_str("path"), Some("/speak"));
        assert_eq!(events[0].metadata["status"], 200);
    }

    #[tokio::test]
    async fn failing_status_uses_vendor_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"message": "bad voice"})),
            )
            .mount(&server)
            .await;

        let ctx = context(Arc::new(RecordingSink::new()));
        let request = ctx.http.post(server.uri());
        let err = send(&ctx, ProviderId::Polly, request, json_message).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::HttpError);
        assert_eq!(err.message, "bad voice");
        assert_eq!(err.status, Some(400));
        assert_eq!(err.provider, Some(ProviderId::Polly));
        assert!(err.headers.is_some());
    }

    #[tokio::test]
    async fn undecodable_body_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let ctx = context(Arc::new(RecordingSink::new()));
        let request = ctx.http.post(server.uri());
        let err = send(&ctx, ProviderId::Azure, request, json_message).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::HttpError);
        assert_eq!(err.message, "HTTP 502");
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;

        let ctx = context(Arc::new(RecordingSink::new()));
        let request = ctx.http.post(server.uri());
        let err = send(&ctx, ProviderId::ElevenLabs, request, no_message).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.header("retry-after"), Some("3"));
    }

    #[tokio::test]
    async fn connection_failure_is_network_error() {
        let sink = Arc::new(RecordingSink::new());
        let ctx = context(Arc::clone(&sink));
        // Port 9 (discard) on localhost is expected to refuse connections
        let request = ctx.http.post("http://127.0.0.1:9/speak");
        let err = send(&ctx, ProviderId::Google, request, no_message).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::NetworkError);
        assert_eq!(err.status, None);
        assert!(sink.named(EventName::HttpRequest)[0].metadata.contains_key("error"));
    }
}

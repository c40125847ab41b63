//! Generative-text backends used for summaries and compliance classification.

pub mod gemini;
pub mod mock;
pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::{AdaptiveLimiter, GovernedGenerator};

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error(
        "rate limited (429){}",
        .retry_after.map(|d| format!(", retry after {:.1}s", d.as_secs_f64())).unwrap_or_default()
    )]
    RateLimited { retry_after: Option<Duration> },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("no API key configured for {0}")]
    MissingApiKey(String),
}

/// A schema-constrained generation request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub user: String,
    /// Function / schema name presented to the model.
    pub name: String,
    pub description: String,
    /// JSON schema the response must follow.
    pub schema: serde_json::Value,
}

/// Boxed future returned by [`TextGenerator`] calls.
pub type GenerationFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, GenerationError>> + Send + 'a>>;

/// A remote generative-text capability.
pub trait TextGenerator: Send + Sync {
    /// The canonical name of this backend (e.g., "OpenAI", "Gemini").
    fn name(&self) -> &str;

    /// Free-form completion of `prompt`.
    fn generate<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a, String>;

    /// Schema-constrained completion.
    ///
    /// Returns the raw JSON payload text, or `None` when the model answered
    /// without a structured payload. The payload is untrusted: callers must
    /// validate it against the schema themselves.
    fn generate_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> GenerationFuture<'a, Option<String>>;
}

/// Which generative backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat completions API.
    #[default]
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "groq" | "together" => Some(Self::OpenAi),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_summary_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Gemini => "gemini-1.5-flash",
        }
    }

    pub fn default_classify_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Gemini => "gemini-1.5-pro",
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Connection settings for a generative backend.
#[derive(Clone, Default)]
pub struct GeneratorConfig {
    pub provider: Provider,
    /// Base URL; the provider default is used when `None`.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub summary_model: Option<String>,
    pub classify_model: Option<String>,
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("summary_model", &self.summary_model)
            .field("classify_model", &self.classify_model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GeneratorConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or(self.provider.default_endpoint())
            .trim_end_matches('/')
    }

    pub fn summary_model(&self) -> &str {
        self.summary_model
            .as_deref()
            .unwrap_or(self.provider.default_summary_model())
    }

    pub fn classify_model(&self) -> &str {
        self.classify_model
            .as_deref()
            .unwrap_or(self.provider.default_classify_model())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.2)
    }
}

/// Build the configured generator, wrapped in rate limiting and a per-call
/// timeout.
pub fn build_generator(
    config: &crate::Config,
    client: reqwest::Client,
) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let generator = &config.generator;
    let api_key = generator
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| GenerationError::MissingApiKey(generator.provider.api_key_env().into()))?;

    let inner: Box<dyn TextGenerator> = match generator.provider {
        Provider::OpenAi => Box::new(OpenAiGenerator::new(client, generator, api_key)),
        Provider::Gemini => Box::new(GeminiGenerator::new(client, generator, api_key)),
    };
    tracing::info!(
        provider = inner.name(),
        endpoint = generator.endpoint(),
        "generator ready"
    );

    Ok(Arc::new(GovernedGenerator::new(
        inner,
        AdaptiveLimiter::per_minute(config.requests_per_minute),
        config.timeout(),
    )))
}

/// Parse a Retry-After header value.
///
/// Integer seconds are taken as given. An HTTP-date gets a fixed 5s wait
/// rather than being resolved against the clock.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    tracing::debug!(value, "unrecognized Retry-After value");
    None
}

/// Send a prepared request and decode a JSON body, mapping transport and
/// status failures into [`GenerationError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, GenerationError> {
    let resp = request
        .send()
        .await
        .map_err(|e| GenerationError::Connection(e.to_string()))?;

    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(GenerationError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GenerationError::Http {
            status: status.as_u16(),
            body,
        });
    }

    resp.json::<T>()
        .await
        .map_err(|e| GenerationError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_aliases() {
        assert_eq!(Provider::parse("OpenAI"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("groq"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse(" gemini "), Some(Provider::Gemini));
        assert_eq!(Provider::parse("ollama"), None);
    }

    #[test]
    fn endpoint_defaults_and_trailing_slash() {
        let mut config = GeneratorConfig::default();
        assert_eq!(config.endpoint(), "https://api.openai.com/v1");
        config.endpoint = Some("http://localhost:8080/v1/".into());
        assert_eq!(config.endpoint(), "http://localhost:8080/v1");
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let config = crate::Config::default();
        let err = build_generator(&config, reqwest::Client::new())
            .err()
            .unwrap();
        assert_eq!(err, GenerationError::MissingApiKey("OPENAI_API_KEY".into()));
    }

    #[test]
    fn retry_after_seconds_and_dates() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn rate_limited_display_includes_retry_after() {
        let err = GenerationError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.to_string(), "rate limited (429), retry after 3.0s");
        let err = GenerationError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited (429)");
    }
}

use serde::{Deserialize, Serialize};

use super::{
    GenerationError, GenerationFuture, GeneratorConfig, StructuredRequest, TextGenerator, send_json,
};

/// Google Gemini `generateContent` backend.
///
/// Structured requests use JSON mode with `responseSchema`; the text of the
/// first candidate is the payload.
pub struct GeminiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    summary_model: String,
    classify_model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiGenerator {
    pub fn new(client: reqwest::Client, config: &GeneratorConfig, api_key: String) -> Self {
        Self {
            client,
            endpoint: config.endpoint().to_string(),
            api_key,
            summary_model: config.summary_model().to_string(),
            classify_model: config.classify_model().to_string(),
            temperature: config.temperature(),
        }
    }

    async fn call(
        &self,
        model: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerateResponse, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, model);
        send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(request),
        )
        .await
    }
}

/// Concatenated text parts of the first candidate, if any.
fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn user_content(text: &str) -> Content<'_> {
    Content {
        role: Some("user"),
        parts: vec![Part { text }],
    }
}

impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a, String> {
        Box::pin(async move {
            let request = GenerateRequest {
                contents: vec![user_content(prompt)],
                system_instruction: None,
                generation_config: GenerationConfig {
                    temperature: self.temperature,
                    response_mime_type: None,
                    response_schema: None,
                },
            };
            let response = self.call(&self.summary_model, &request).await?;
            first_candidate_text(response)
                .ok_or_else(|| GenerationError::Parse("response contained no text".into()))
        })
    }

    fn generate_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> GenerationFuture<'a, Option<String>> {
        Box::pin(async move {
            let body = GenerateRequest {
                contents: vec![user_content(&request.user)],
                system_instruction: Some(Content {
                    role: None,
                    parts: vec![Part {
                        text: &request.system,
                    }],
                }),
                generation_config: GenerationConfig {
                    temperature: self.temperature,
                    response_mime_type: Some("application/json"),
                    response_schema: Some(&request.schema),
                },
            };
            let response = self.call(&self.classify_model, &body).await?;
            Ok(first_candidate_text(response))
        })
    }
}

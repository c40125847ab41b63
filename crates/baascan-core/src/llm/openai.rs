use serde::{Deserialize, Serialize};

use super::{
    GenerationError, GenerationFuture, GeneratorConfig, StructuredRequest, TextGenerator, send_json,
};

/// OpenAI-compatible `/chat/completions` backend.
///
/// Structured requests force a single function call whose parameters are the
/// requested schema; the function arguments string is the payload.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    summary_model: String,
    classify_model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    r#type: &'static str,
    function: FunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    r#type: &'static str,
    function: ToolChoiceFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ToolChoiceFunction<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    /// Legacy single function-call shape.
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: Option<String>,
}

impl OpenAiGenerator {
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

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ChatResponse, GenerationError> {
        let url = format!("{}/chat/completions", self.endpoint);
        send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request),
        )
        .await
    }
}

/// Pull the function-call arguments out of the first choice.
fn structured_payload(response: ChatResponse) -> Option<String> {
    let message = response.choices.into_iter().next()?.message;
    message
        .tool_calls
        .into_iter()
        .next()
        .map(|call| call.function)
        .or(message.function_call)
        .and_then(|f| f.arguments)
        .filter(|args| !args.trim().is_empty())
}

impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a, String> {
        Box::pin(async move {
            let request = ChatRequest {
                model: &self.summary_model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.temperature,
                tools: None,
                tool_choice: None,
            };
            let response = self.chat(&request).await?;
            response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| GenerationError::Parse("response contained no message".into()))
        })
    }

    fn generate_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> GenerationFuture<'a, Option<String>> {
        Box::pin(async move {
            let chat = ChatRequest {
                model: &self.classify_model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: &request.system,
                    },
                    ChatMessage {
                        role: "user",
                        content: &request.user,
                    },
                ],
                temperature: self.temperature,
                tools: Some(vec![Tool {
                    r#type: "function",
                    function: FunctionDef {
                        name: &request.name,
                        description: &request.description,
                        parameters: &request.schema,
                    },
                }]),
                tool_choice: Some(ToolChoice {
                    r#type: "function",
                    function: ToolChoiceFunction {
                        name: &request.name,
                    },
                }),
            };
            let response = self.chat(&chat).await?;
            Ok(structured_payload(response))
        })
    }
}

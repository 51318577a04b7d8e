//! OpenAI-compatible chat-completions client for structured outputs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::app::ports::{StructuredModel, StructuredRequest};
use crate::config::API_KEY_ENV;
use crate::error::{ExtractorError, ModelError, Result};

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat<'a>,
}

impl<'a> From<&'a StructuredRequest> for ChatRequestBody<'a> {
    fn from(request: &'a StructuredRequest) -> Self {
        Self {
            model: &request.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    strict: true,
                    schema: &request.schema,
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponseRaw {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Pulls the JSON object out of a chat-completions response body.
fn parse_completion(body: &str) -> std::result::Result<Value, ModelError> {
    let raw: ChatResponseRaw =
        serde_json::from_str(body).map_err(|e| ModelError::Parse(e.to_string()))?;
    let message = raw
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ModelError::Parse("response has no choices".into()))?;
    if let Some(refusal) = message.refusal {
        return Err(ModelError::Parse(format!("model refused: {}", refusal)));
    }
    let content = message
        .content
        .ok_or_else(|| ModelError::Parse("response message has no content".into()))?;
    serde_json::from_str(&content).map_err(|e| ModelError::Parse(format!("{}: {}", e, content)))
}

#[derive(Clone)]
pub struct OpenAiModel {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiModel {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the client from `OPENAI_API_KEY`.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| ExtractorError::config(format!("{} not set", API_KEY_ENV)))?;
        Ok(Self::new(api_key, base_url))
    }
}

#[async_trait]
impl StructuredModel for OpenAiModel {
    async fn generate(&self, request: &StructuredRequest) -> std::result::Result<Value, ModelError> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatRequestBody::from(request))
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        if !status.is_success() {
            warn!(status = %status, error = %body, "Model API error");
            return Err(ModelError::from_status(status.as_u16(), body));
        }
        debug!(model = %request.model, bytes = body.len(), "Structured output received");
        parse_completion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_uses_strict_json_schema() {
        let request = StructuredRequest {
            model: "gpt-4o-mini".into(),
            system: "sys".into(),
            user: "usr".into(),
            schema_name: "SingleExtraction".into(),
            schema: json!({"type": "object"}),
            max_tokens: 100,
            temperature: None,
        };
        let body = serde_json::to_value(ChatRequestBody::from(&request)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["messages"][1]["content"], "usr");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn completion_content_is_parsed_as_json() {
        let body = json!({
            "choices": [{"message": {"content": "{\"event_data\": null, \"extraction_error\": \"EmptyPage\"}"}}]
        })
        .to_string();
        let value = parse_completion(&body).unwrap();
        assert_eq!(value["extraction_error"], "EmptyPage");
    }

    #[test]
    fn refusals_and_garbage_are_parse_errors() {
        let refusal = json!({"choices": [{"message": {"content": null, "refusal": "no"}}]}).to_string();
        assert!(matches!(parse_completion(&refusal), Err(ModelError::Parse(_))));
        assert!(matches!(parse_completion("<html>"), Err(ModelError::Parse(_))));
        let empty = json!({"choices": []}).to_string();
        assert!(matches!(parse_completion(&empty), Err(ModelError::Parse(_))));
    }
}

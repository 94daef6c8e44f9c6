//! Gemini `generateContent` client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::base::HttpClientBase;
use super::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use crate::domain::types::{ChatMessage, MessageRole};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone)]
pub struct GeminiClient {
    base: HttpClientBase,
}

impl GeminiClient {
    pub fn new(
        endpoint: Option<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            base: HttpClientBase::new(
                "gemini".to_string(),
                endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                api_key,
                request_timeout,
            ),
        }
    }

    fn build_model_url(&self, model: &str) -> String {
        let base = self.base.endpoint.trim_end_matches('/');
        format!("{base}/{model}:generateContent")
    }
}

#[async_trait]
impl ModelProvider for GeminiClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.build_model_url(&request.model);
        let (system_text, contents) = to_gemini_format(&request.messages);

        let mut payload = json!({ "contents": contents });
        if let Some(system) = system_text {
            payload["system_instruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            "Sending request to Gemini"
        );

        let response: GeminiResponse = self.base.post_with_query_key(&url, &payload).await?;
        debug!("Received response from Gemini");

        let content = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .flat_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| ModelError::invalid_response(&self.base.id, "missing text"))?;

        Ok(ModelResponse { content })
    }
}

/// Splits out the system message and maps the rest onto Gemini's
/// `user`/`model` role vocabulary.
fn to_gemini_format(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_text = None;
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            MessageRole::System => {
                system_text = Some(message.content.clone());
            }
            MessageRole::User => contents.push(json!({
                "role": "user",
                "parts": [{"text": message.content}]
            })),
            MessageRole::Assistant => contents.push(json!({
                "role": "model",
                "parts": [{"text": message.content}]
            })),
        }
    }

    (system_text, contents)
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_is_lifted_out_of_contents() {
        let messages = vec![
            ChatMessage::new(MessageRole::System, "rules"),
            ChatMessage::new(MessageRole::User, "hello"),
            ChatMessage::new(MessageRole::Assistant, "hi"),
        ];

        let (system, contents) = to_gemini_format(&messages);
        assert_eq!(system.as_deref(), Some("rules"));
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }
}

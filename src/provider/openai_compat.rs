// src/provider/openai_compat.rs — OpenAI-compatible chat completions
//
// Works against OpenAI itself and any endpoint speaking the same
// `/chat/completions` shape (Groq, DeepSeek, Together, OpenRouter, local servers).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChatRequest, ChatResponse, ModelProvider, TokenUsage};
use crate::infra::errors::GepaError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAICompatProvider {
    id_str: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(id: impl Into<String>, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            id_str: id.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn error(&self, message: impl Into<String>, retriable: bool) -> GepaError {
        GepaError::Provider {
            provider: self.id_str.clone(),
            message: message.into(),
            retriable,
        }
    }
}

/// Request body for `/chat/completions`.
pub(crate) fn build_body(request: &ChatRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    for m in &request.messages {
        messages.push(json!({"role": m.role.as_str(), "content": m.content}));
    }

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }
    body
}

pub(crate) fn parse_response(resp: &Value) -> ChatResponse {
    let content = resp["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };
    ChatResponse { content, usage }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, GepaError> {
        let body = build_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(
                "User-Agent",
                format!("promptevo/{}", env!("CARGO_PKG_VERSION")),
            )
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(e.to_string(), e.is_timeout() || e.is_connect()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let retriable = status.as_u16() == 429 || status.is_server_error();
            return Err(self.error(format!("HTTP {status}: {error_body}"), retriable));
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| self.error(e.to_string(), false))?;

        tracing::debug!(
            provider = %self.id_str,
            model = %request.model,
            input_tokens = resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens = resp["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            "chat completion"
        );
        Ok(parse_response(&resp))
    }
}

//! 外部大模型客户端
//!
//! 生成环节委托给 OpenAI 兼容的 chat-completions 服务，
//! 通过 trait 抽象便于在测试中替换。

use async_trait::async_trait;
use clinic_core::{ClinicError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 一次生成请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 文本生成模型接口
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// OpenAI 兼容 chat-completions 客户端
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl ChatCompletionsClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("Submitting completion request to {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClinicError::Assistant(e.to_string()))?;

        if !response.status().is_success() {
            warn!("Model endpoint returned status {}", response.status());
            return Err(ClinicError::Assistant(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClinicError::Assistant(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ClinicError::Assistant("model returned no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash() {
        let client = ChatCompletionsClient::new("https://api.groq.com/openai/v1/", "m", "k");
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }
}

// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

use super::{Content, GenerationConfig, Model};
use crate::adk::error::ModelError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat model.
///
/// The API key is resolved per call so a process can start, and serve its
/// non-model routes, without `OPENAI_API_KEY` set.
pub struct OpenAIModel {
    client: Client,
    api_key: Option<String>,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    pub fn new(
        model_name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name: model_name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `MODEL_NAME`
    pub fn from_env() -> Self {
        let api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model_name = env::var("MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(model_name, api_key, base_url)
    }

    fn request_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .map(|c| json!({"role": c.role, "content": c.text}))
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        body
    }

    fn parse_response(response: &Value) -> Result<Content, ModelError> {
        let message = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        let text = message["content"]
            .as_str()
            .ok_or_else(|| ModelError::InvalidResponse("message has no text content".to_string()))?;

        Ok(Content::assistant(text))
    }
}

#[async_trait]
impl Model for OpenAIModel {
    fn name(&self) -> String {
        format!("openai/{}", self.model_name)
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::ApiKeyMissing("openai".to_string()))?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(history, config);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ModelError::Api {
                provider: "openai".to_string(),
                message: format!("{}: {}", status, text),
            });
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}

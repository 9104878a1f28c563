// SPDX-License-Identifier: MIT

//! Model module - the chat model trait used by graph nodes
//!
//! - [openai] - OpenAI-compatible chat completions API

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adk::error::ModelError;

pub use openai::OpenAIModel;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// `system`, `user` or `assistant`
    pub role: String,
    pub text: String,
}

impl Content {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new("assistant", text)
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider/model label for logs
    fn name(&self) -> String;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

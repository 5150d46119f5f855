//! OpenAI-compatible chat completions client.

use super::{parse_reply, prompts, GenerationBackend};
use crate::error::GenerationError;
use async_trait::async_trait;
use codeproof_common::{Config, GenerationResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

pub struct ChatCompletionsBackend {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsBackend {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            api_base: config.generation_api_base.clone(),
            api_key: config.generation_api_key.clone(),
            model: config.generation_model.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Client::new(), config)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<GenerationResult, GenerationError> {
        let url = self.endpoint();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let latency_ms = started.elapsed().as_millis() as u64;
        info!(model = %self.model, status = status.as_u16(), latency_ms, "Generation backend replied");

        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "could not read error body".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = resp.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::UnexpectedResponse("no choices in response".to_string()))?;

        debug!(chars = content.len(), "Parsing generation reply");
        parse_reply(&content)
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionsBackend {
    async fn generate(&self, language: &str, tests: &str) -> Result<GenerationResult, GenerationError> {
        self.complete(prompts::GENERATE, &prompts::generate_input(language, tests))
            .await
    }

    async fn revise(
        &self,
        language: &str,
        tests: &str,
        implementation: &str,
        digest: &str,
    ) -> Result<GenerationResult, GenerationError> {
        self.complete(
            prompts::REVISE,
            &prompts::revise_input(language, tests, implementation, digest),
        )
        .await
    }
}

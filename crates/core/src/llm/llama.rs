use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{CompletionClient, CompletionRequest, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.llama-api.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ATTEMPTS: u32 = 2;

/// Client for an OpenAI-compatible `/chat/completions` endpoint serving Llama models.
#[derive(Debug, Clone)]
pub struct LlamaClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    attempts: u32,
}

impl LlamaClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_llama_api_key()?.to_string();
        let base_url =
            std::env::var("LLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("LLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let attempts = attempts_from(std::env::var("LLAMA_ATTEMPTS").ok().as_deref());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            attempts,
        })
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        Ok(headers)
    }

    async fn create_completion(
        &self,
        req: &ChatCompletionRequest<'_>,
    ) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(req)
            .send()
            .await
            .context("Llama request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Llama response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Llama,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        serde_json::from_str::<serde_json::Value>(&text).map_err(|err| {
            LlmDiagnosticsError {
                provider: Provider::Llama,
                stage: "decode",
                detail: format!("response is not JSON: {err}"),
                raw_output: Some(text),
                raw_response_json: None,
            }
            .into()
        })
    }

    fn is_retryable(err: &anyhow::Error) -> bool {
        match err.downcast_ref::<LlmDiagnosticsError>() {
            Some(diag) => {
                diag.stage == "http"
                    && (diag.detail.contains("429") || diag.detail.contains("status=5"))
            }
            // Transport failures (timeouts, connection resets).
            None => true,
        }
    }
}

#[async_trait::async_trait]
impl CompletionClient for LlamaClient {
    fn provider(&self) -> Provider {
        Provider::Llama
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut attempt: u32 = 0;
        let raw = loop {
            attempt += 1;
            match self.create_completion(&body).await {
                Ok(raw) => break raw,
                Err(err) => {
                    if attempt >= self.attempts || !Self::is_retryable(&err) {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "Llama request failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        extract_text(raw)
    }
}

/// Pulls `choices[0].message.content`; any other shape is a diagnostics error.
fn extract_text(raw: serde_json::Value) -> anyhow::Result<String> {
    let parsed = serde_json::from_value::<ChatCompletionResponse>(raw.clone()).ok();
    let content = parsed
        .and_then(|r| r.choices.into_iter().next())
        .and_then(|c| c.message.content);

    match content {
        Some(text) => Ok(text),
        None => Err(LlmDiagnosticsError {
            provider: Provider::Llama,
            stage: "shape",
            detail: "response has no choices[0].message.content".to_string(),
            raw_output: Some(raw.to_string()),
            raw_response_json: Some(raw),
        }
        .into()),
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Total tries per request, the first one included. Never below one.
fn attempts_from(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_ATTEMPTS)
        .max(1)
}

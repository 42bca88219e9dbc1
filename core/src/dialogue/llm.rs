//! LLM provider capability (§4.6.4/§9) plus the retry-with-backoff and
//! fallback-chain wiring described in §6. The trait keeps the dialogue
//! pipeline ignorant of which vendor backs a given campaign; the concrete
//! `OpenAiCompatProvider` speaks the OpenAI chat-completions wire format,
//! which every major hosted/self-hosted option (OpenAI itself, Groq,
//! local vLLM/Ollama gateways) also speaks. Grounded on
//! `nanors_providers::zhipu::ZhipuProvider` for the reqwest call shape and
//! on its `retry::retry_with_backoff` for the retry policy.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::LlmError;

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub system_prompt: &'a str,
    pub history: Vec<ChatMessage>,
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub total_tokens: u32,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<GenerateResponse, LlmError>;
}

/// Default model chain tried, in order, when a campaign's configured model
/// fails outright (not rate-limited — see [`retry_with_fallback`]) and no
/// campaign-specific fallback was configured (§6).
pub const DEFAULT_FALLBACK_CHAIN: &[&str] =
    &["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"];

/// Exponential backoff schedule for a single model: 3 attempts, base 1s,
/// doubling each retry and capped at 10s.
const MAX_ATTEMPTS: usize = 3;
const BASE_DELAY_SECS: u64 = 1;
const MAX_DELAY_SECS: u64 = 10;

pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    async fn try_send(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse, LlmError> {
        let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
        for m in &request.history {
            messages.push(json!({"role": m.role, "content": m.content}));
        }

        let body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30);
            return Err(LlmError::RateLimit(retry_after));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!("http {status}: {text}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Provider("missing choices[0].message.content".into()))?
            .to_string();
        let total_tokens = payload["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(GenerateResponse { content, total_tokens })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<GenerateResponse, LlmError> {
        self.try_send(&request).await
    }
}

/// Retries one model with exponential backoff, never retrying a rate-limit
/// error (the caller should fall through to the next model in the chain
/// instead of burning time waiting it out on a fleet-wide shared key).
pub async fn retry_with_backoff<F, Fut>(mut attempt: F) -> Result<GenerateResponse, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<GenerateResponse, LlmError>>,
{
    let mut last_err = None;

    for i in 0..MAX_ATTEMPTS {
        match attempt().await {
            Ok(response) => return Ok(response),
            Err(LlmError::RateLimit(secs)) => return Err(LlmError::RateLimit(secs)),
            Err(e) => {
                if i + 1 < MAX_ATTEMPTS {
                    let delay = (BASE_DELAY_SECS << i).min(MAX_DELAY_SECS);
                    tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or(LlmError::Provider("retry loop produced no error".into())))
}

/// Tries `primary_model`, then `campaign_fallback` if configured, then
/// [`DEFAULT_FALLBACK_CHAIN`] in order, stopping at the first model that
/// returns a response (§6's fallback-chain requirement).
pub async fn generate_with_fallback(
    provider: &dyn LlmProvider,
    mut request: GenerateRequest<'_>,
    campaign_fallback: Option<&str>,
) -> Result<GenerateResponse, LlmError> {
    let mut chain: Vec<&str> = vec![request.model];
    if let Some(fallback) = campaign_fallback {
        chain.push(fallback);
    }
    chain.extend(DEFAULT_FALLBACK_CHAIN.iter().copied());

    let mut last_err = None;
    for model in chain {
        request.model = model;
        let result = retry_with_backoff(|| provider.generate(GenerateRequest {
            system_prompt: request.system_prompt,
            history: request.history.clone(),
            model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }))
        .await;
        match result {
            Ok(response) => return Ok(response),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(LlmError::Provider("empty fallback chain".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(LlmError::Connection("boom".into()))
                } else {
                    Ok(GenerateResponse { content: "ok".into(), total_tokens: 5 })
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limit_short_circuits_without_retrying() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err::<GenerateResponse, _>(LlmError::RateLimit(42)) }
        })
        .await;
        assert!(matches!(result, Err(LlmError::RateLimit(42))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

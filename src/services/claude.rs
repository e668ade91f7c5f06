use std::time::Duration;

use async_trait::async_trait;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;

/// Text-completion seam. Backed by [`ClaudeClient`] in production; tests
/// inject canned generators.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<String>;
}

pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model,
        }
    }

    async fn request_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<String> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "temperature": temperature,
                "system": system_prompt,
                "messages": [{
                    "role": "user",
                    "content": user_prompt
                }]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiStatusError { status, body }.into());
        }

        let payload: serde_json::Value = response.json().await?;
        let text = payload["content"][0]["text"].as_str().unwrap_or("");
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> anyhow::Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .request_once(system_prompt, user_prompt, max_tokens, temperature)
                .await
            {
                Ok(text) => return Ok(text),
                Err(err) if attempt < MAX_ATTEMPTS && is_transient(&err) => {
                    let delay = Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt - 1));
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient Claude API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Claude API error {status}: {body}")]
struct ApiStatusError {
    status: reqwest::StatusCode,
    body: String,
}

/// Only network-level failures and throttling/server statuses are worth a
/// retry; API rejections of the request itself are not.
fn is_transient(err: &anyhow::Error) -> bool {
    if let Some(api) = err.downcast_ref::<ApiStatusError>() {
        return api.status.as_u16() == 429 || api.status.is_server_error();
    }
    if let Some(req) = err.downcast_ref::<reqwest::Error>() {
        return req.is_timeout() || req.is_connect();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(code: u16) -> anyhow::Error {
        ApiStatusError {
            status: reqwest::StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        }
        .into()
    }

    #[test]
    fn test_throttling_and_server_errors_are_transient() {
        assert!(is_transient(&status_error(429)));
        assert!(is_transient(&status_error(500)));
        assert!(is_transient(&status_error(503)));
    }

    #[test]
    fn test_request_rejections_are_not_transient() {
        assert!(!is_transient(&status_error(400)));
        assert!(!is_transient(&status_error(401)));
        assert!(!is_transient(&anyhow::anyhow!("some other failure")));
    }
}

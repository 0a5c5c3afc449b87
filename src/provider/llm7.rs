//! LLM7 provider implementation (system fallback)
//!
//! The operator-funded backend behind the free tier. One fixed completions
//! endpoint, a curated model list, and blunt error reporting: upstream
//! bodies are passed through under an `LLM7 API Error:` prefix rather than
//! classified, matching what the endpoint actually returns.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use tokio::sync::mpsc;

use super::{
    ChatCompletionResponse, ChatStreamChunk, CompletionBody, CompletionRequest, Provider,
    SseDecoder, StreamEvent, embedded_stream_error,
};
use crate::error::ProviderError;

const PLACEHOLDER_KEY: &str = "your_llm7_api_key_here";

/// Client for the system completion endpoint.
pub struct Llm7Client {
    client: HttpClient,
    api_key: String,
    api_url: String,
    app_title: String,
}

impl Llm7Client {
    /// Refuses empty and placeholder keys so a misconfigured deployment
    /// fails at startup instead of on the first request.
    pub fn new(api_key: String, api_url: String, app_title: String) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() || api_key == PLACEHOLDER_KEY {
            anyhow::bail!("LLM7: a valid API key is required");
        }
        Ok(Self {
            client: HttpClient::new(),
            api_key,
            api_url,
            app_title,
        })
    }

    fn apply_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", format!("{} via LLM7", self.app_title))
    }

    async fn process_sse_stream(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error(ProviderError::Upstream(format!(
                            "LLM7 API Error: {}",
                            e
                        ))))
                        .await;
                    return;
                }
            };

            for frame in decoder.push(&chunk) {
                if frame.is_done() {
                    continue;
                }

                let chunk_data: ChatStreamChunk = match frame.try_parse() {
                    Some(c) => c,
                    None => {
                        tracing::debug!("LLM7: unparseable stream frame: {}", frame.preview());
                        continue;
                    }
                };

                for choice in chunk_data.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            accumulated.push_str(&content);
                            if tx.send(StreamEvent::Delta(content)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }

        // The endpoint answers 200 OK even when the "stream" is one JSON
        // error document; the accumulated content gives it away.
        if let Some(message) = embedded_stream_error(&accumulated) {
            let _ = tx
                .send(StreamEvent::Error(ProviderError::Upstream(format!(
                    "LLM7 API Error: {}",
                    message
                ))))
                .await;
            return;
        }

        if accumulated.trim().is_empty() {
            tracing::warn!("LLM7: stream was empty");
        }

        let _ = tx.send(StreamEvent::Done).await;
    }
}

#[async_trait]
impl Provider for Llm7Client {
    fn name(&self) -> &'static str {
        "llm7"
    }

    async fn create_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        tracing::debug!(model = %request.model, "LLM7: requesting completion stream");
        let body = CompletionBody::new(request, true);

        let response = self
            .apply_headers(self.client.post(&self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("LLM7 API Error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "LLM7 request failed: {}", text);
            return Err(ProviderError::Upstream(format!("LLM7 API Error: {}", text)));
        }

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::process_sse_stream(response, tx));

        Ok(rx)
    }

    async fn create(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let body = CompletionBody::new(request, false);

        let response = self
            .apply_headers(self.client.post(&self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("LLM7 API Error: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("LLM7 API Error: {}", text)));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(format!("LLM7 API Error: {}", e)))?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// The endpoint exposes no inexpensive probe; construction already
    /// rejected unusable keys.
    async fn validate_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

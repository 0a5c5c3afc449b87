//! OpenRouter provider implementation (Chat Completions API)
//!
//! The primary backend: serves any catalog model when the caller brings
//! their own key. Sends optional attribution headers and maps upstream
//! failures onto the user-facing error categories.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use tokio::sync::mpsc;

use super::{
    ChatCompletionResponse, ChatStreamChunk, CompletionBody, CompletionRequest, Provider,
    SseDecoder, StreamEvent, embedded_stream_error, extract_error_message,
};
use crate::error::ProviderError;

const COMPLETION_FAILED: &str = "Failed to create completion";

/// OpenRouter client holding one caller's credential.
pub struct OpenRouterClient {
    client: HttpClient,
    api_key: String,
    base_url: String,
    referer: Option<String>,
    app_title: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: String,
        base_url: String,
        referer: Option<String>,
        app_title: String,
    ) -> Self {
        Self {
            client: HttpClient::new(),
            api_key,
            base_url,
            referer,
            app_title,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn apply_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", self.app_title.clone());
        match &self.referer {
            Some(referer) => builder.header("HTTP-Referer", referer.clone()),
            None => builder,
        }
    }

    /// Map an upstream message onto the user-facing categories.
    fn classify(message: String, model: &str) -> ProviderError {
        if message.contains("Invalid API key") || message.contains("authentication") {
            ProviderError::Auth(
                "OpenRouter API key is invalid. Please check your API key in settings."
                    .to_string(),
            )
        } else if message.contains("model") && message.contains("not found") {
            ProviderError::ModelUnavailable(format!(
                "Model \"{}\" is not available on OpenRouter. Please try a different model.",
                model
            ))
        } else {
            ProviderError::Upstream(message)
        }
    }

    async fn error_from_response(response: reqwest::Response, model: &str) -> ProviderError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = extract_error_message(&text, COMPLETION_FAILED);
        tracing::warn!(%status, %model, "OpenRouter request failed: {}", message);
        Self::classify(message, model)
    }

    /// Pump SSE frames into the event channel. Ends with exactly one
    /// terminal event; stops early if the receiver goes away.
    async fn process_sse_stream(
        response: reqwest::Response,
        tx: mpsc::Sender<StreamEvent>,
        model: String,
    ) {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error(ProviderError::Upstream(e.to_string())))
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
                    None => continue,
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

        // A 200 OK can still carry an error document instead of a stream
        if let Some(message) = embedded_stream_error(&accumulated) {
            let _ = tx
                .send(StreamEvent::Error(Self::classify(message, &model)))
                .await;
            return;
        }

        let _ = tx.send(StreamEvent::Done).await;
    }
}

#[async_trait]
impl Provider for OpenRouterClient {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn create_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let model = request.model.clone();
        let body = CompletionBody::new(request, true);

        let response = self
            .apply_headers(self.client.post(self.completions_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, &model).await);
        }

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::process_sse_stream(response, tx, model));

        Ok(rx)
    }

    async fn create(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let model = request.model.clone();
        let body = CompletionBody::new(request, false);

        let response = self
            .apply_headers(self.client.post(self.completions_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, &model).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn validate_credential(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("OpenRouter credential probe failed: {}", e);
                false
            }
        }
    }
}

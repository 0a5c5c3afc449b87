// src/task.rs
// One completion against one provider, driven to exactly one terminal
// update. Failures are reported over the channel, never returned, so a
// task can run beside siblings without tearing them down.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::provider::{CompletionRequest, Provider, StreamEvent};

/// Progress reports from one completion task.
///
/// A task emits zero or more `Delta`s followed by exactly one of
/// `Completed` or `Failed`, then closes its channel. It never retries.
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    /// A chunk arrived; carries the increment and the text so far.
    Delta { delta: String, text: String },
    /// The provider stream ended cleanly.
    Completed { text: String, elapsed_ms: u64 },
    /// The provider failed; any partial text is abandoned.
    Failed { error: String, elapsed_ms: u64 },
}

/// Start a completion task and hand back its update channel.
pub fn spawn_completion(
    provider: Arc<dyn Provider>,
    request: CompletionRequest,
) -> mpsc::Receiver<TaskUpdate> {
    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(drive(provider, request, tx));
    rx
}

async fn drive(
    provider: Arc<dyn Provider>,
    request: CompletionRequest,
    updates: mpsc::Sender<TaskUpdate>,
) {
    let started = Instant::now();
    let mut text = String::new();

    let mut chunks = match provider.create_stream(request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            let _ = updates
                .send(TaskUpdate::Failed {
                    error: e.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
                .await;
            return;
        }
    };

    while let Some(event) = chunks.recv().await {
        match event {
            StreamEvent::Delta(delta) => {
                text.push_str(&delta);
                let update = TaskUpdate::Delta {
                    delta,
                    text: text.clone(),
                };
                if updates.send(update).await.is_err() {
                    // Receiver gone, nobody is listening anymore
                    return;
                }
            }
            StreamEvent::Done => break,
            StreamEvent::Error(e) => {
                let _ = updates
                    .send(TaskUpdate::Failed {
                        error: e.to_string(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    })
                    .await;
                return;
            }
        }
    }

    // Done, or the provider channel closed without a terminal event.
    let _ = updates
        .send(TaskUpdate::Completed {
            text,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;

    /// Replays a fixed script of stream events.
    struct ScriptedProvider {
        script: Vec<StreamEvent>,
        fail_to_connect: bool,
    }

    impl ScriptedProvider {
        fn streaming(script: Vec<StreamEvent>) -> Arc<Self> {
            Arc::new(Self {
                script,
                fail_to_connect: false,
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                script: Vec::new(),
                fail_to_connect: true,
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn create_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
            if self.fail_to_connect {
                return Err(ProviderError::Auth("bad key".to_string()));
            }
            let (tx, rx) = mpsc::channel(100);
            let script = self.script.clone();
            tokio::spawn(async move {
                for event in script {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }

        async fn create(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Upstream("not scripted".to_string()))
        }

        async fn validate_credential(&self) -> bool {
            !self.fail_to_connect
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("test-model".to_string(), Vec::new())
    }

    async fn collect(mut rx: mpsc::Receiver<TaskUpdate>) -> Vec<TaskUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn test_deltas_then_completed() {
        let provider = ScriptedProvider::streaming(vec![
            StreamEvent::Delta("Hel".to_string()),
            StreamEvent::Delta("lo".to_string()),
            StreamEvent::Done,
        ]);

        let updates = collect(spawn_completion(provider, request())).await;

        assert_eq!(updates.len(), 3);
        assert!(matches!(
            &updates[0],
            TaskUpdate::Delta { delta, text } if delta == "Hel" && text == "Hel"
        ));
        assert!(matches!(
            &updates[1],
            TaskUpdate::Delta { delta, text } if delta == "lo" && text == "Hello"
        ));
        assert!(matches!(
            &updates[2],
            TaskUpdate::Completed { text, .. } if text == "Hello"
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_one_failed_update() {
        let updates = collect(spawn_completion(ScriptedProvider::refusing(), request())).await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            TaskUpdate::Failed { error, .. } if error == "bad key"
        ));
    }

    #[tokio::test]
    async fn test_midstream_error_ends_the_task() {
        let provider = ScriptedProvider::streaming(vec![
            StreamEvent::Delta("partial".to_string()),
            StreamEvent::Error(ProviderError::Upstream("server melted".to_string())),
            StreamEvent::Delta("never seen".to_string()),
        ]);

        let updates = collect(spawn_completion(provider, request())).await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(
            &updates[1],
            TaskUpdate::Failed { error, .. } if error == "server melted"
        ));
    }

    #[tokio::test]
    async fn test_silent_channel_close_counts_as_completed() {
        let provider = ScriptedProvider::streaming(vec![StreamEvent::Delta("half".to_string())]);

        let updates = collect(spawn_completion(provider, request())).await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(
            &updates[1],
            TaskUpdate::Completed { text, .. } if text == "half"
        ));
    }

    #[tokio::test]
    async fn test_empty_stream_completes_with_empty_text() {
        let provider = ScriptedProvider::streaming(vec![StreamEvent::Done]);

        let updates = collect(spawn_completion(provider, request())).await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            TaskUpdate::Completed { text, .. } if text.is_empty()
        ));
    }
}

// src/consensus.rs
//! Consensus mode: the same prompt fanned out to several models at once,
//! every answer streamed back over one channel, and exactly one terminal
//! aggregate event no matter how the individual models fare.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, warn};

use crate::provider::{CompletionRequest, Provider};
use crate::router::Credential;
use crate::store::ConversationStore;
use crate::task::{self, TaskUpdate};
use crate::title::TitleSynthesizer;

/// Error recorded on every slot still unfinished when the global
/// timeout fires.
pub const TIMEOUT_MESSAGE: &str = "Response timeout (3 minutes)";

/// Advisory pushed when models are still loading after the notice delay.
pub const SLOW_RESPONSE_NOTICE: &str =
    "Some models are taking longer than expected. This is normal for thinking models. Please wait...";

const UNKNOWN_ERROR: &str = "Unknown error";

/// Per-model state, mutated as the model streams and serialized as-is
/// into events and into the persisted aggregate.
///
/// Lifecycle: loading, then optionally streaming, then exactly one of
/// completed (`isStreaming: false`, no error) or errored (`error` set).
/// Once `error` is set the slot never changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub model: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    pub response_time: u64,
}

impl ModelResponse {
    fn loading(model: String) -> Self {
        Self {
            model,
            content: String::new(),
            error: None,
            is_loading: true,
            is_streaming: None,
            response_time: 0,
        }
    }

    fn unfinished(&self) -> bool {
        self.is_loading || self.is_streaming == Some(true)
    }
}

// ============================================================================
// SSE event types
// ============================================================================

/// Events sent to the frontend while a consensus session runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ConsensusEvent {
    /// Initial placeholder state for every requested model.
    #[serde(rename = "consensus_start")]
    Start {
        models: Vec<String>,
        responses: Vec<ModelResponse>,
    },

    /// One model produced a chunk; `content` is its full text so far.
    #[serde(rename = "consensus_update", rename_all = "camelCase")]
    Update {
        model_index: usize,
        model: String,
        content: String,
        is_streaming: bool,
    },

    /// One model finished cleanly.
    #[serde(rename = "consensus_complete", rename_all = "camelCase")]
    Complete {
        model_index: usize,
        model: String,
        content: String,
        response_time: u64,
    },

    /// One model failed; the session keeps going.
    #[serde(rename = "consensus_error", rename_all = "camelCase")]
    Error {
        model_index: usize,
        model: String,
        error: String,
        response_time: u64,
    },

    /// Non-terminal advisory, sent at most once per session.
    #[serde(rename = "consensus_taking_long")]
    TakingLong { message: String },

    /// A title was synthesized for a fresh conversation.
    #[serde(rename = "title_update", rename_all = "camelCase")]
    TitleUpdate {
        title: String,
        conversation_id: String,
    },

    /// Terminal aggregate, emitted exactly once per session.
    #[serde(rename = "consensus_final", rename_all = "camelCase")]
    Final {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        responses: Vec<ModelResponse>,
    },
}

/// What travels to the SSE writer: a progress event, or the terminal
/// aggregate. The writer renders `Final` as the event frame plus the
/// literal `[DONE]` and stops reading, so nothing can appear between
/// or after them on the wire.
#[derive(Debug, Clone)]
pub enum ConsensusFrame {
    Event(ConsensusEvent),
    Final(ConsensusEvent),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// One model to query, already routed.
pub struct ConsensusTarget {
    pub model: String,
    pub provider: Arc<dyn Provider>,
    pub request: CompletionRequest,
}

/// Per-request facts the terminal sequence needs.
pub struct ConsensusContext {
    pub conversation_id: String,
    pub user_text: String,
    /// True when the conversation had no messages before this turn.
    pub first_exchange: bool,
    /// None for guest sessions; nothing is persisted then.
    pub store: Option<Arc<ConversationStore>>,
    /// Used for title synthesis only.
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsensusSettings {
    pub timeout: Duration,
    pub slow_notice_after: Duration,
}

pub struct ConsensusOrchestrator {
    titles: Arc<TitleSynthesizer>,
    settings: ConsensusSettings,
}

impl ConsensusOrchestrator {
    pub fn new(titles: Arc<TitleSynthesizer>, settings: ConsensusSettings) -> Self {
        Self { titles, settings }
    }

    /// Fan out one prompt to every target and feed `tx` until the
    /// terminal frame. Returns once the fan-out is launched; workers and
    /// timers drive the session from there.
    pub async fn run(
        &self,
        targets: Vec<ConsensusTarget>,
        ctx: ConsensusContext,
        tx: mpsc::Sender<ConsensusFrame>,
    ) {
        let models: Vec<String> = targets.iter().map(|t| t.model.clone()).collect();
        let slots: Vec<ModelResponse> = models
            .iter()
            .map(|m| ModelResponse::loading(m.clone()))
            .collect();

        let session = Arc::new(Session {
            slots: Mutex::new(slots.clone()),
            settled: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
            total: targets.len(),
            timeout_ms: self.settings.timeout.as_millis() as u64,
            tx,
            ctx,
            titles: self.titles.clone(),
        });

        session
            .emit(ConsensusEvent::Start {
                models,
                responses: slots,
            })
            .await;

        for (index, target) in targets.into_iter().enumerate() {
            tokio::spawn(run_model(session.clone(), index, target));
        }

        {
            let session = session.clone();
            let delay = self.settings.slow_notice_after;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                session.notice_slow().await;
            });
        }

        {
            let session = session.clone();
            let delay = self.settings.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                session.force_timeout().await;
            });
        }
    }
}

/// State shared by the workers, the timers, and the terminal sequence.
///
/// Workers, the advisory timer, and the terminal sequence all send
/// while holding the `slots` lock. A settled slot can no longer produce
/// an event, so once the terminal frame (sent under the same lock) is
/// in the channel, nothing else follows it.
struct Session {
    slots: Mutex<Vec<ModelResponse>>,
    settled: AtomicUsize,
    finalized: AtomicBool,
    total: usize,
    timeout_ms: u64,
    tx: mpsc::Sender<ConsensusFrame>,
    ctx: ConsensusContext,
    titles: Arc<TitleSynthesizer>,
}

impl Session {
    async fn emit(&self, event: ConsensusEvent) {
        // A closed channel means the client hung up; nothing to do.
        let _ = self.tx.send(ConsensusFrame::Event(event)).await;
    }

    /// Claim the right to run the terminal sequence. Succeeds for
    /// exactly one caller per session, however the triggers race.
    fn try_finalize(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Bookkeeping after one task reached a terminal state.
    async fn settle_one(&self) {
        let settled = self.settled.fetch_add(1, Ordering::SeqCst) + 1;
        if settled == self.total && self.try_finalize() {
            self.finish().await;
        }
    }

    async fn notice_slow(&self) {
        let slots = self.slots.lock().await;
        if self.finalized.load(Ordering::SeqCst) {
            return;
        }
        if slots.iter().any(|r| r.is_loading) {
            self.emit(ConsensusEvent::TakingLong {
                message: SLOW_RESPONSE_NOTICE.to_string(),
            })
            .await;
        }
    }

    /// Global timeout: mark every unfinished slot as errored with the
    /// elapsed time pinned to the timeout, then run the terminal
    /// sequence. In-flight provider calls are not aborted; their later
    /// updates land on terminal slots and are discarded.
    async fn force_timeout(&self) {
        if !self.try_finalize() {
            return;
        }
        warn!("consensus timeout reached, forcing completion");
        {
            let mut slots = self.slots.lock().await;
            for slot in slots.iter_mut() {
                if slot.unfinished() {
                    slot.error = Some(TIMEOUT_MESSAGE.to_string());
                    slot.is_loading = false;
                    slot.is_streaming = Some(false);
                    slot.response_time = self.timeout_ms;
                }
            }
        }
        self.finish().await;
    }

    /// Terminal sequence: persist the aggregate, best-effort title for a
    /// fresh conversation, then the terminal frame, sent under the slots
    /// lock so no straggler update can trail it.
    async fn finish(&self) {
        let responses = self.slots.lock().await.clone();

        let mut message_id = None;
        if let Some(store) = &self.ctx.store {
            match serde_json::to_string(&responses) {
                Ok(content) => {
                    match store
                        .save_message(&self.ctx.conversation_id, "assistant", &content)
                        .await
                    {
                        Ok(id) => message_id = Some(id),
                        Err(e) => error!("failed to save consensus message: {}", e),
                    }
                }
                Err(e) => error!("failed to serialize consensus responses: {}", e),
            }
        }

        if self.ctx.first_exchange {
            let best = responses
                .iter()
                .find(|r| !r.content.is_empty() && r.error.is_none())
                .map(|r| r.content.clone())
                .unwrap_or_default();
            let title = self
                .titles
                .summarize(&self.ctx.user_text, &best, self.ctx.credential.as_ref())
                .await;
            if let Some(store) = &self.ctx.store {
                if let Err(e) = store
                    .update_conversation_title(&self.ctx.conversation_id, &title)
                    .await
                {
                    error!("failed to update conversation title: {}", e);
                }
            }
            self.emit(ConsensusEvent::TitleUpdate {
                title,
                conversation_id: self.ctx.conversation_id.clone(),
            })
            .await;
        }

        let slots = self.slots.lock().await;
        let _ = self
            .tx
            .send(ConsensusFrame::Final(ConsensusEvent::Final {
                message_id,
                responses,
            }))
            .await;
        drop(slots);
    }
}

/// Drive one model's completion task, mirroring its updates into the
/// shared slot and onto the outbound channel.
async fn run_model(session: Arc<Session>, index: usize, target: ConsensusTarget) {
    let mut updates = task::spawn_completion(target.provider, target.request);
    while let Some(update) = updates.recv().await {
        if apply_update(&session, index, &target.model, update).await {
            break;
        }
    }
    session.settle_one().await;
}

/// Apply one task update to slot `index` and send the matching event
/// while the slots lock is held. Returns true when the worker is
/// finished with its slot. Slots that already carry an error (the
/// timeout sweep got there first) are left untouched.
async fn apply_update(session: &Session, index: usize, model: &str, update: TaskUpdate) -> bool {
    match update {
        TaskUpdate::Delta { text, .. } => {
            let mut slots = session.slots.lock().await;
            let slot = &mut slots[index];
            if slot.error.is_some() {
                return true;
            }
            slot.content = text.clone();
            slot.is_loading = false;
            slot.is_streaming = Some(true);
            session
                .emit(ConsensusEvent::Update {
                    model_index: index,
                    model: model.to_string(),
                    content: text,
                    is_streaming: true,
                })
                .await;
            false
        }
        TaskUpdate::Completed { text, elapsed_ms } => {
            let mut slots = session.slots.lock().await;
            let slot = &mut slots[index];
            if slot.error.is_some() {
                return true;
            }
            slot.content = text.clone();
            slot.is_loading = false;
            slot.is_streaming = Some(false);
            slot.response_time = elapsed_ms;
            session
                .emit(ConsensusEvent::Complete {
                    model_index: index,
                    model: model.to_string(),
                    content: text,
                    response_time: elapsed_ms,
                })
                .await;
            true
        }
        TaskUpdate::Failed { error, elapsed_ms } => {
            let error = if error.is_empty() {
                UNKNOWN_ERROR.to_string()
            } else {
                error
            };
            let mut slots = session.slots.lock().await;
            let slot = &mut slots[index];
            if slot.error.is_some() {
                return true;
            }
            slot.error = Some(error.clone());
            slot.is_loading = false;
            slot.is_streaming = Some(false);
            slot.response_time = elapsed_ms;
            session
                .emit(ConsensusEvent::Error {
                    model_index: index,
                    model: model.to_string(),
                    error,
                    response_time: elapsed_ms,
                })
                .await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::error::ProviderError;
    use crate::provider::StreamEvent;
    use crate::router::{CompletionRouter, PrimarySettings};
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Replays a script of stream events, stalls forever, or floods
    /// deltas until the session hangs up.
    struct FakeProvider {
        script: Vec<StreamEvent>,
        stall: bool,
        flood: bool,
    }

    impl FakeProvider {
        fn completing(text: &str) -> Arc<Self> {
            Arc::new(Self {
                script: vec![
                    StreamEvent::Delta(text.to_string()),
                    StreamEvent::Done,
                ],
                stall: false,
                flood: false,
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                script: vec![StreamEvent::Error(ProviderError::Upstream(
                    message.to_string(),
                ))],
                stall: false,
                flood: false,
            })
        }

        fn stalling() -> Arc<Self> {
            Arc::new(Self {
                script: Vec::new(),
                stall: true,
                flood: false,
            })
        }

        fn flooding() -> Arc<Self> {
            Arc::new(Self {
                script: Vec::new(),
                stall: false,
                flood: true,
            })
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn create_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
            let (tx, rx) = mpsc::channel(100);
            if self.stall {
                // Hold the sender open until the receiver gives up
                tokio::spawn(async move { tx.closed().await });
            } else if self.flood {
                tokio::spawn(async move {
                    loop {
                        if tx.send(StreamEvent::Delta("x".to_string())).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                });
            } else {
                let script = self.script.clone();
                tokio::spawn(async move {
                    for event in script {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                });
            }
            Ok(rx)
        }

        async fn create(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Upstream("not used".to_string()))
        }

        async fn validate_credential(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn target(model: &str, provider: Arc<FakeProvider>) -> ConsensusTarget {
        ConsensusTarget {
            model: model.to_string(),
            provider,
            request: CompletionRequest::new(model.to_string(), Vec::new()),
        }
    }

    fn orchestrator(timeout: Duration, slow: Duration) -> ConsensusOrchestrator {
        let router = CompletionRouter::new(
            ModelCatalog::new(),
            PrimarySettings {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                referer: None,
                app_title: "Test".to_string(),
            },
            None,
        );
        ConsensusOrchestrator::new(
            Arc::new(TitleSynthesizer::new(Arc::new(router))),
            ConsensusSettings {
                timeout,
                slow_notice_after: slow,
            },
        )
    }

    fn guest_ctx(first_exchange: bool) -> ConsensusContext {
        ConsensusContext {
            conversation_id: "guest-consensus-1".to_string(),
            user_text: "compare these models carefully for me".to_string(),
            first_exchange,
            store: None,
            credential: None,
        }
    }

    /// Drain frames through the terminal one. Needed when a stalled
    /// worker keeps the channel open forever.
    async fn collect_until_final(mut rx: mpsc::Receiver<ConsensusFrame>) -> Vec<ConsensusFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            let terminal = matches!(frame, ConsensusFrame::Final(_));
            frames.push(frame);
            if terminal {
                break;
            }
        }
        frames
    }

    /// Drain every frame until all senders are gone. Would observe a
    /// second terminal sequence if one were ever emitted.
    async fn collect_all(mut rx: mpsc::Receiver<ConsensusFrame>) -> Vec<ConsensusFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    fn finals(frames: &[ConsensusFrame]) -> Vec<&ConsensusEvent> {
        frames
            .iter()
            .filter_map(|f| match f {
                ConsensusFrame::Final(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcome_settles_with_one_final() {
        let orch = orchestrator(Duration::from_secs(180), Duration::from_secs(30));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![
                target("a", FakeProvider::completing("X")),
                target("b", FakeProvider::failing("server melted")),
            ],
            guest_ctx(false),
            tx,
        )
        .await;

        let frames = collect_all(rx).await;

        assert!(matches!(
            frames.first(),
            Some(ConsensusFrame::Event(ConsensusEvent::Start { models, .. })) if models.len() == 2
        ));
        assert!(matches!(frames.last(), Some(ConsensusFrame::Final(_))));

        let finals = finals(&frames);
        assert_eq!(finals.len(), 1);
        let ConsensusEvent::Final {
            message_id,
            responses,
        } = finals[0]
        else {
            unreachable!()
        };
        assert!(message_id.is_none());
        assert_eq!(responses[0].content, "X");
        assert!(responses[0].error.is_none());
        assert_eq!(responses[1].content, "");
        assert_eq!(responses[1].error.as_deref(), Some("server melted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_sweeps_stragglers() {
        let orch = orchestrator(Duration::from_millis(200), Duration::from_millis(100));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![
                target("fast", FakeProvider::completing("done early")),
                target("stuck", FakeProvider::stalling()),
            ],
            guest_ctx(false),
            tx,
        )
        .await;

        let frames = collect_until_final(rx).await;

        let notices = frames
            .iter()
            .filter(|f| matches!(f, ConsensusFrame::Event(ConsensusEvent::TakingLong { .. })))
            .count();
        assert_eq!(notices, 1);

        let finals = finals(&frames);
        assert_eq!(finals.len(), 1);
        let ConsensusEvent::Final { responses, .. } = finals[0] else {
            unreachable!()
        };
        assert_eq!(responses[0].content, "done early");
        assert!(responses[0].error.is_none());
        assert_eq!(responses[1].error.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(responses[1].response_time, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_and_timeout_race_single_final() {
        // Zero timeout makes both triggers fire as close together as the
        // runtime allows; the flag must still admit exactly one of them.
        let orch = orchestrator(Duration::from_millis(0), Duration::from_secs(30));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![target("a", FakeProvider::completing("X"))],
            guest_ctx(false),
            tx,
        )
        .await;

        let frames = collect_all(rx).await;

        assert_eq!(finals(&frames).len(), 1);
        assert!(matches!(frames.last(), Some(ConsensusFrame::Final(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_advisory_after_terminal_event() {
        let orch = orchestrator(Duration::from_secs(180), Duration::from_millis(50));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![target("a", FakeProvider::completing("instant"))],
            guest_ctx(false),
            tx,
        )
        .await;

        let frames = collect_all(rx).await;

        assert!(
            frames
                .iter()
                .all(|f| !matches!(f, ConsensusFrame::Event(ConsensusEvent::TakingLong { .. })))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flooding_updates_never_follow_the_final_frame() {
        // A model still streaming hard when the timeout fires. Updates
        // are sent under the slots lock, so none may trail the terminal
        // frame in the channel.
        let orch = orchestrator(Duration::from_millis(50), Duration::from_secs(30));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![target("chatty", FakeProvider::flooding())],
            guest_ctx(false),
            tx,
        )
        .await;

        let frames = collect_all(rx).await;

        assert!(frames.iter().any(|f| matches!(
            f,
            ConsensusFrame::Event(ConsensusEvent::Update { .. })
        )));

        let terminal_at = frames
            .iter()
            .position(|f| matches!(f, ConsensusFrame::Final(_)))
            .expect("terminal frame");
        assert_eq!(terminal_at, frames.len() - 1);

        let ConsensusFrame::Final(ConsensusEvent::Final { responses, .. }) = &frames[terminal_at]
        else {
            unreachable!()
        };
        assert_eq!(responses[0].error.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(responses[0].response_time, 50);
    }

    // Not start_paused: the paused clock auto-advances past the sqlite
    // pool's acquire timeout while the driver works on its own thread.
    #[tokio::test]
    async fn test_first_exchange_persists_aggregate_and_title() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = Arc::new(ConversationStore::new(pool));
        store.run_migrations().await.expect("migrations");
        let conversation = store
            .create_conversation("user-1", "New Chat", "consensus:a,b")
            .await
            .expect("conversation");

        let orch = orchestrator(Duration::from_secs(180), Duration::from_secs(30));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![
                target("a", FakeProvider::completing("the answer")),
                target("b", FakeProvider::failing("no luck")),
            ],
            ConsensusContext {
                conversation_id: conversation.id.clone(),
                user_text: "please summarize quarterly revenue trends".to_string(),
                first_exchange: true,
                store: Some(store.clone()),
                credential: None,
            },
            tx,
        )
        .await;

        let frames = collect_all(rx).await;

        let title = frames.iter().find_map(|f| match f {
            ConsensusFrame::Event(ConsensusEvent::TitleUpdate { title, .. }) => Some(title.clone()),
            _ => None,
        });
        assert_eq!(title.as_deref(), Some("summarize quarterly revenue trends"));

        let finals = finals(&frames);
        let ConsensusEvent::Final { message_id, .. } = finals[0] else {
            unreachable!()
        };
        assert!(message_id.is_some());

        let history = store.load_history(&conversation.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "assistant");
        let stored: Vec<ModelResponse> = serde_json::from_str(&history[0].content).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content, "the answer");
        assert_eq!(stored[1].error.as_deref(), Some("no luck"));

        let updated = store
            .find_conversation(&conversation.id, "user-1")
            .await
            .unwrap()
            .expect("conversation");
        assert_eq!(updated.title, "summarize quarterly revenue trends");
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_first_exchange_titles_without_persisting() {
        let orch = orchestrator(Duration::from_secs(180), Duration::from_secs(30));
        let (tx, rx) = mpsc::channel(100);
        orch.run(
            vec![target("a", FakeProvider::completing("hi there"))],
            guest_ctx(true),
            tx,
        )
        .await;

        let frames = collect_all(rx).await;

        assert!(frames.iter().any(|f| matches!(
            f,
            ConsensusFrame::Event(ConsensusEvent::TitleUpdate { .. })
        )));
        let finals = finals(&frames);
        let ConsensusEvent::Final { message_id, .. } = finals[0] else {
            unreachable!()
        };
        assert!(message_id.is_none());
    }

    #[test]
    fn test_event_wire_shapes() {
        let start = ConsensusEvent::Start {
            models: vec!["a".to_string()],
            responses: vec![ModelResponse::loading("a".to_string())],
        };
        let json = serde_json::to_value(&start).unwrap();
        assert_eq!(json["type"], "consensus_start");
        assert_eq!(json["responses"][0]["isLoading"], true);
        assert_eq!(json["responses"][0]["responseTime"], 0);
        assert!(json["responses"][0].get("error").is_none());
        assert!(json["responses"][0].get("isStreaming").is_none());

        let update = ConsensusEvent::Update {
            model_index: 1,
            model: "b".to_string(),
            content: "text".to_string(),
            is_streaming: true,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "consensus_update");
        assert_eq!(json["modelIndex"], 1);
        assert_eq!(json["isStreaming"], true);

        let fin = ConsensusEvent::Final {
            message_id: None,
            responses: Vec::new(),
        };
        let json = serde_json::to_value(&fin).unwrap();
        assert_eq!(json["type"], "consensus_final");
        assert!(json.get("messageId").is_none());
    }
}

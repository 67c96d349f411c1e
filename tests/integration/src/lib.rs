//! Shared fixtures for the end-to-end engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nimbus_access::AccessControlStore;
use nimbus_aggregator::DebounceAggregator;
use nimbus_ai::{CaptionGateway, ChatGateway, NimbusAiError, TranscriptionGateway};
use nimbus_flow::{contact_flow, info_flow, FlowRouter, RowSink};
use nimbus_memory::ContextStore;
use nimbus_orchestrator::{ConversationOrchestrator, OrchestratorDeps, ReplySink};

pub const TEST_DEBOUNCE: Duration = Duration::from_millis(40);

#[derive(Default)]
pub struct RecordingReplySink {
    replies: Mutex<Vec<(String, String)>>,
}

impl RecordingReplySink {
    pub fn texts_for(&self, sender: &str) -> Vec<String> {
        self.replies
            .lock()
            .expect("replies lock")
            .iter()
            .filter(|(to, _)| to == sender)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ReplySink for RecordingReplySink {
    async fn send_reply(&self, sender_id: &str, text: &str) -> anyhow::Result<()> {
        self.replies
            .lock()
            .expect("replies lock")
            .push((sender_id.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedChat {
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedChat {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ChatGateway for ScriptedChat {
    async fn complete(
        &self,
        system_context: &str,
        user_text: &str,
    ) -> Result<String, NimbusAiError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((system_context.to_string(), user_text.to_string()));
        Ok(format!("reply to: {user_text}"))
    }
}

pub struct EchoTranscription;

#[async_trait]
impl TranscriptionGateway for EchoTranscription {
    async fn transcribe(&self, audio_bytes: &[u8]) -> Result<String, NimbusAiError> {
        Ok(String::from_utf8_lossy(audio_bytes).to_string())
    }
}

pub struct StaticCaption;

#[async_trait]
impl CaptionGateway for StaticCaption {
    async fn describe(&self, _image_bytes: &[u8]) -> Result<String, NimbusAiError> {
        Ok("an image of a broken router".to_string())
    }
}

#[derive(Default)]
pub struct RecordingRowSink {
    pub rows: Mutex<Vec<Vec<Vec<String>>>>,
}

#[async_trait]
impl RowSink for RecordingRowSink {
    async fn append(&self, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
        self.rows.lock().expect("rows lock").push(rows);
        Ok(())
    }
}

pub struct Engine {
    pub orchestrator: ConversationOrchestrator,
    pub access: Arc<AccessControlStore>,
    pub chat: Arc<ScriptedChat>,
    pub replies: Arc<RecordingReplySink>,
    pub row_sink: Arc<RecordingRowSink>,
    pub _dir: tempfile::TempDir,
}

/// Builds a full engine over temp storage with scripted collaborators.
pub fn engine() -> Engine {
    let dir = tempfile::tempdir().expect("tempdir");
    let access = Arc::new(
        AccessControlStore::load(dir.path().join("access.json"), ["admin-1".to_string()])
            .expect("access store"),
    );
    let row_sink = Arc::new(RecordingRowSink::default());
    let router = Arc::new(
        FlowRouter::new(vec![
            info_flow("We are a small support desk."),
            contact_flow(Arc::clone(&row_sink) as Arc<dyn RowSink>),
        ])
        .with_admin_commands(Arc::clone(&access)),
    );
    let chat = Arc::new(ScriptedChat::default());
    let replies = Arc::new(RecordingReplySink::default());
    let orchestrator = ConversationOrchestrator::new(OrchestratorDeps {
        access: Arc::clone(&access),
        router,
        aggregator: DebounceAggregator::new(TEST_DEBOUNCE),
        context: Arc::new(ContextStore::new(dir.path().join("context"))),
        chat: Arc::clone(&chat) as Arc<dyn ChatGateway>,
        transcription: Arc::new(EchoTranscription),
        caption: Arc::new(StaticCaption),
        replies: Arc::clone(&replies) as Arc<dyn ReplySink>,
        system_prompt: "You are a support assistant.".to_string(),
    });
    Engine {
        orchestrator,
        access,
        chat,
        replies,
        row_sink,
        _dir: dir,
    }
}

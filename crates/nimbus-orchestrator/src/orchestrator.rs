use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, warn};

use nimbus_access::{AccessControlStore, InteractionKind};
use nimbus_aggregator::{DebounceAggregator, FlushHandler};
use nimbus_ai::{CaptionGateway, ChatGateway, TranscriptionGateway};
use nimbus_flow::{FlowOutcome, FlowRouter};
use nimbus_memory::ContextStore;

use crate::event::{EventKind, InboundEvent, ReplySink};

const BLOCKED_REPLY: &str = "Sorry, you are blocked.";
const TEXT_AUDIO_LIMIT_REPLY: &str = "You have reached the text/audio interaction limit.";
const IMAGE_LIMIT_REPLY: &str = "You have reached the image interaction limit.";
const CAPTION_LIMIT_REPLY: &str =
    "Your caption was dropped: you have reached the text/audio interaction limit.";
const PROCESSING_IMAGE_REPLY: &str = "Processing your image...";
const COMPLETION_FAILURE_REPLY: &str =
    "Sorry, I could not generate a response right now. Please try again.";
const TRANSCRIPTION_FAILURE_REPLY: &str = "Sorry, I could not process your voice note.";
const CAPTION_FAILURE_REPLY: &str = "Sorry, I could not process your image.";

const CONTEXT_PREAMBLE: &str = "Here is some additional context about the user:";

/// Collaborators the orchestrator is wired to.
pub struct OrchestratorDeps {
    pub access: Arc<AccessControlStore>,
    pub router: Arc<FlowRouter>,
    pub aggregator: DebounceAggregator,
    pub context: Arc<ContextStore>,
    pub chat: Arc<dyn ChatGateway>,
    pub transcription: Arc<dyn TranscriptionGateway>,
    pub caption: Arc<dyn CaptionGateway>,
    pub replies: Arc<dyn ReplySink>,
    pub system_prompt: String,
}

/// Receives inbound events and drives them through admission, normalization,
/// flows, and the debounced completion pipeline.
///
/// Every denial or failure path produces a reply; the one accepted loss is
/// unflushed aggregator content at process shutdown.
pub struct ConversationOrchestrator {
    deps: Arc<OrchestratorDeps>,
}

impl ConversationOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self { deps: Arc::new(deps) }
    }

    /// Entry point for one transport event.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        let sender = event.sender_id.clone();
        if self.deps.access.is_blocked(&sender) {
            self.reply(&sender, BLOCKED_REPLY).await;
            return Ok(());
        }
        match event.kind {
            EventKind::Text => self.handle_text(&sender, &event.body).await,
            EventKind::Voice => self.handle_voice(&sender, &event.media).await,
            EventKind::Image => {
                self.handle_image(&sender, &event.media, event.caption.as_deref())
                    .await
            }
        }
    }

    async fn handle_text(&self, sender: &str, body: &str) -> Result<()> {
        // Flow and admin traffic is routed before the interaction budget is
        // charged; only free-form turns draw from it.
        if self.deps.router.would_consume(sender, body) {
            match self.deps.router.handle_message(sender, body).await {
                Ok(FlowOutcome::Consumed { replies }) => {
                    for reply in replies {
                        self.reply(sender, &reply).await;
                    }
                    return Ok(());
                }
                Ok(FlowOutcome::PassThrough) => {}
                Err(error) => {
                    error!(user_id = sender, error = %error, "flow dispatch failed");
                    self.reply(sender, COMPLETION_FAILURE_REPLY).await;
                    return Err(error);
                }
            }
        }

        if !self
            .deps
            .access
            .register_interaction(sender, InteractionKind::TextAudio)?
        {
            self.reply(sender, TEXT_AUDIO_LIMIT_REPLY).await;
            return Ok(());
        }
        self.enqueue_fragment(sender, body.to_string());
        Ok(())
    }

    async fn handle_voice(&self, sender: &str, media: &[u8]) -> Result<()> {
        if !self
            .deps
            .access
            .register_interaction(sender, InteractionKind::TextAudio)?
        {
            self.reply(sender, TEXT_AUDIO_LIMIT_REPLY).await;
            return Ok(());
        }
        match self.deps.transcription.transcribe(media).await {
            Ok(transcript) => {
                debug!(user_id = sender, "voice note transcribed");
                self.enqueue_fragment(sender, transcript);
            }
            Err(error) => {
                warn!(user_id = sender, error = %error, "transcription failed");
                self.reply(sender, TRANSCRIPTION_FAILURE_REPLY).await;
            }
        }
        Ok(())
    }

    async fn handle_image(
        &self,
        sender: &str,
        media: &[u8],
        caption: Option<&str>,
    ) -> Result<()> {
        if !self
            .deps
            .access
            .register_interaction(sender, InteractionKind::Image)?
        {
            self.reply(sender, IMAGE_LIMIT_REPLY).await;
            return Ok(());
        }
        self.reply(sender, PROCESSING_IMAGE_REPLY).await;
        let description = match self.deps.caption.describe(media).await {
            Ok(description) => description,
            Err(error) => {
                warn!(user_id = sender, error = %error, "image captioning failed");
                self.reply(sender, CAPTION_FAILURE_REPLY).await;
                return Ok(());
            }
        };
        self.enqueue_fragment(sender, description);

        // The accompanying caption draws from the text/audio budget on its
        // own; when that budget is exhausted only the description is queued.
        if let Some(caption) = caption.filter(|caption| !caption.trim().is_empty()) {
            if self
                .deps
                .access
                .register_interaction(sender, InteractionKind::TextAudio)?
            {
                self.enqueue_fragment(sender, caption.to_string());
            } else {
                self.reply(sender, CAPTION_LIMIT_REPLY).await;
            }
        }
        Ok(())
    }

    fn enqueue_fragment(&self, sender: &str, fragment: String) {
        self.deps
            .aggregator
            .add(sender, fragment, self.flush_handler());
    }

    /// Builds the flush callback: one completion call per flushed batch,
    /// reply sent back, exchange recorded into the capped context.
    fn flush_handler(&self) -> FlushHandler {
        let deps = Arc::clone(&self.deps);
        Arc::new(move |user_id, joined| {
            let deps = Arc::clone(&deps);
            Box::pin(async move {
                flush_batch(&deps, &user_id, &joined).await;
            })
        })
    }

    async fn reply(&self, sender: &str, text: &str) {
        send_reply(&self.deps, sender, text).await;
    }
}

async fn send_reply(deps: &OrchestratorDeps, sender: &str, text: &str) {
    if let Err(error) = deps.replies.send_reply(sender, text).await {
        warn!(user_id = sender, error = %error, "failed to deliver reply");
    }
}

async fn flush_batch(deps: &OrchestratorDeps, user_id: &str, joined: &str) {
    let exchanges = match deps.context.load(user_id) {
        Ok(exchanges) => exchanges,
        Err(error) => {
            error!(user_id, error = %error, "failed to load conversation context");
            send_reply(deps, user_id, COMPLETION_FAILURE_REPLY).await;
            return;
        }
    };
    let rendered_context = serde_json::to_string(&exchanges).unwrap_or_else(|_| "[]".to_string());
    let system_context = format!(
        "{}\n\n{CONTEXT_PREAMBLE}\n{rendered_context}",
        deps.system_prompt
    );

    let answer = match deps.chat.complete(&system_context, joined).await {
        Ok(answer) => answer,
        Err(error) => {
            warn!(user_id, error = %error, "completion failed");
            send_reply(deps, user_id, COMPLETION_FAILURE_REPLY).await;
            return;
        }
    };
    send_reply(deps, user_id, &answer).await;
    if let Err(error) = deps.context.record_exchange(user_id, joined, &answer) {
        // The reply already went out; surface the divergence loudly.
        error!(user_id, error = %error, "failed to persist conversation context");
    }
}

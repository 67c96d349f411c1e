//! External AI collaborators behind narrow async contracts.
//!
//! The orchestration engine only ever needs three operations from the model
//! backend: complete a batched user turn, transcribe a voice note, and
//! describe an image. Each lives behind its own trait so the engine can be
//! exercised with deterministic fakes.

mod openai;
mod types;

pub use openai::{OpenAiCaptionClient, OpenAiChatClient, OpenAiConfig, OpenAiTranscriptionClient};
pub use types::{CaptionGateway, ChatGateway, NimbusAiError, TranscriptionGateway};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `NimbusAiError` values.
pub enum NimbusAiError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
/// Trait contract for `ChatGateway` behavior.
///
/// `system_context` carries the operator prompt plus the caller-rendered
/// prior-exchange context; `user_text` is the batched turn.
pub trait ChatGateway: Send + Sync {
    async fn complete(&self, system_context: &str, user_text: &str)
        -> Result<String, NimbusAiError>;
}

#[async_trait]
/// Trait contract for `TranscriptionGateway` behavior.
pub trait TranscriptionGateway: Send + Sync {
    async fn transcribe(&self, audio_bytes: &[u8]) -> Result<String, NimbusAiError>;
}

#[async_trait]
/// Trait contract for `CaptionGateway` behavior.
pub trait CaptionGateway: Send + Sync {
    async fn describe(&self, image_bytes: &[u8]) -> Result<String, NimbusAiError>;
}

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use crate::{CaptionGateway, ChatGateway, NimbusAiError, TranscriptionGateway};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;
const MAX_ERROR_BODY_CHARS: usize = 512;
const CAPTION_MAX_TOKENS: u32 = 300;
const CAPTION_PROMPT: &str =
    "Describe what is in this image so a support agent can act on it. Transcribe any visible text.";

#[derive(Debug, Clone)]
/// Public struct `OpenAiConfig` used across Nimbus components.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub chat_model: String,
    pub transcription_model: String,
    pub request_timeout_ms: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

fn build_http_client(config: &OpenAiConfig) -> Result<reqwest::Client, NimbusAiError> {
    if config.api_key.trim().is_empty() {
        return Err(NimbusAiError::MissingApiKey);
    }
    let mut headers = HeaderMap::new();
    let bearer = format!("Bearer {}", config.api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&bearer)
            .map_err(|e| NimbusAiError::InvalidResponse(format!("invalid API key header: {e}")))?,
    );
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()?)
}

fn chat_endpoint(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, NimbusAiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(MAX_ERROR_BODY_CHARS);
    Err(NimbusAiError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}

fn first_choice_text(payload: &Value) -> Result<String, NimbusAiError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(|text| text.to_string())
        .ok_or_else(|| {
            NimbusAiError::InvalidResponse("completion payload has no message content".to_string())
        })
}

fn build_chat_body(model: &str, system_context: &str, user_text: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_context },
            { "role": "user", "content": user_text },
        ],
    })
}

fn build_caption_body(model: &str, image_bytes: &[u8]) -> Value {
    let encoded = BASE64_STANDARD.encode(image_bytes);
    json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": CAPTION_PROMPT },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{encoded}") }
                    },
                ],
            }
        ],
        "max_tokens": CAPTION_MAX_TOKENS,
    })
}

#[derive(Debug, Clone)]
/// Chat-completion client for the batched conversational turns.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiChatClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, NimbusAiError> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatGateway for OpenAiChatClient {
    async fn complete(
        &self,
        system_context: &str,
        user_text: &str,
    ) -> Result<String, NimbusAiError> {
        let body = build_chat_body(&self.config.chat_model, system_context, user_text);
        let response = self
            .client
            .post(chat_endpoint(&self.config.api_base))
            .json(&body)
            .send()
            .await?;
        let payload: Value = error_for_status(response).await?.json().await?;
        first_choice_text(&payload)
    }
}

#[derive(Debug, Clone)]
/// Speech-to-text client used to normalize voice notes into text fragments.
pub struct OpenAiTranscriptionClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiTranscriptionClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, NimbusAiError> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TranscriptionGateway for OpenAiTranscriptionClient {
    async fn transcribe(&self, audio_bytes: &[u8]) -> Result<String, NimbusAiError> {
        let file_part = reqwest::multipart::Part::bytes(audio_bytes.to_vec())
            .file_name("voice-note.ogg")
            .mime_str("audio/ogg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.config.transcription_model.clone());
        let endpoint = format!(
            "{}/audio/transcriptions",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self.client.post(endpoint).multipart(form).send().await?;
        let payload: Value = error_for_status(response).await?.json().await?;
        payload["text"]
            .as_str()
            .map(|text| text.to_string())
            .ok_or_else(|| {
                NimbusAiError::InvalidResponse(
                    "transcription payload has no text field".to_string(),
                )
            })
    }
}

#[derive(Debug, Clone)]
/// Vision client that turns an inbound image into a text description.
pub struct OpenAiCaptionClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiCaptionClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, NimbusAiError> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CaptionGateway for OpenAiCaptionClient {
    async fn describe(&self, image_bytes: &[u8]) -> Result<String, NimbusAiError> {
        let body = build_caption_body(&self.config.chat_model, image_bytes);
        let response = self
            .client
            .post(chat_endpoint(&self.config.api_base))
            .json(&body)
            .send()
            .await?;
        let payload: Value = error_for_status(response).await?.json().await?;
        first_choice_text(&payload)
    }
}

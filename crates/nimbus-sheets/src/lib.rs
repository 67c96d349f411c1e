//! Spreadsheet-backed row sink for completed forms.
//!
//! Implements the flow crate's [`RowSink`] against the spreadsheet
//! values-append endpoint. Appends are at-most-once: the caller reports a
//! failure to the user but never retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use nimbus_flow::RowSink;

const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_APPEND_RANGE: &str = "A2";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
/// Enumerates supported `SheetsError` values.
pub enum SheetsError {
    #[error("missing access token")]
    MissingToken,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sheets returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
/// Public struct `SheetsConfig` used across Nimbus components.
pub struct SheetsConfig {
    pub api_base: String,
    pub spreadsheet_id: String,
    pub access_token: String,
    pub append_range: String,
    pub request_timeout_ms: u64,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            access_token: access_token.into(),
            append_range: DEFAULT_APPEND_RANGE.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
/// Values-append client for one spreadsheet.
pub struct SheetsClient {
    client: reqwest::Client,
    config: SheetsConfig,
}

impl SheetsClient {
    pub fn new(config: SheetsConfig) -> Result<Self, SheetsError> {
        if config.access_token.trim().is_empty() {
            return Err(SheetsError::MissingToken);
        }
        if config.spreadsheet_id.trim().is_empty() {
            return Err(SheetsError::InvalidConfig(
                "spreadsheet id cannot be empty".to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.access_token.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| SheetsError::InvalidConfig(format!("invalid token header: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let endpoint = format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.config.api_base.trim_end_matches('/'),
            self.config.spreadsheet_id,
            self.config.append_range,
        );
        let response = self
            .client
            .post(endpoint)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(MAX_ERROR_BODY_CHARS);
            return Err(SheetsError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        debug!(rows = rows.len(), "appended rows to spreadsheet");
        Ok(())
    }
}

#[async_trait]
impl RowSink for SheetsClient {
    async fn append(&self, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
        self.append_rows(&rows).await?;
        Ok(())
    }
}

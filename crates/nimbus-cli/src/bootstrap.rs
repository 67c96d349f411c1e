use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nimbus_access::AccessControlStore;
use nimbus_aggregator::DebounceAggregator;
use nimbus_ai::{OpenAiCaptionClient, OpenAiChatClient, OpenAiConfig, OpenAiTranscriptionClient};
use nimbus_flow::{contact_flow, info_flow, FlowRouter, RowSink};
use nimbus_memory::ContextStore;
use nimbus_orchestrator::{ConversationOrchestrator, OrchestratorDeps, ReplySink};
use nimbus_sheets::{SheetsClient, SheetsConfig};

use crate::CliArgs;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Reply sink for the local transport loop: one line per reply on stdout.
pub(crate) struct StdoutReplySink;

#[async_trait]
impl ReplySink for StdoutReplySink {
    async fn send_reply(&self, sender_id: &str, text: &str) -> Result<()> {
        println!("-> {sender_id}: {text}");
        Ok(())
    }
}

/// Fallback sink used when no spreadsheet is configured: appends completed
/// form rows to a local JSONL file.
pub(crate) struct JsonlRowSink {
    path: PathBuf,
}

#[async_trait]
impl RowSink for JsonlRowSink {
    async fn append(&self, rows: Vec<Vec<String>>) -> Result<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        for row in &rows {
            let line = serde_json::to_string(row).context("failed to serialize row")?;
            writeln!(file, "{line}")
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
        }
        debug!(rows = rows.len(), path = %self.path.display(), "appended rows locally");
        Ok(())
    }
}

fn build_row_sink(args: &CliArgs) -> Result<Arc<dyn RowSink>> {
    match (&args.spreadsheet_id, &args.sheets_token) {
        (Some(spreadsheet_id), Some(token)) => {
            let client =
                SheetsClient::new(SheetsConfig::new(spreadsheet_id.as_str(), token.as_str()))?;
            info!(
                spreadsheet_id = spreadsheet_id.as_str(),
                "contact rows go to the spreadsheet"
            );
            Ok(Arc::new(client))
        }
        _ => {
            let path = args.data_dir.join("contact-rows.jsonl");
            info!(path = %path.display(), "no spreadsheet configured; contact rows go to a local file");
            Ok(Arc::new(JsonlRowSink { path }))
        }
    }
}

pub(crate) fn build_engine(
    args: &CliArgs,
    system_prompt: String,
    info_text: String,
    replies: Arc<dyn ReplySink>,
) -> Result<ConversationOrchestrator> {
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create {}", args.data_dir.display()))?;

    let access = Arc::new(AccessControlStore::load_with_limits(
        args.data_dir.join("access.json"),
        args.admin_ids.iter().cloned(),
        args.text_audio_limit,
        args.image_limit,
    )?);
    let context = Arc::new(ContextStore::new(args.data_dir.join("context")));

    let mut openai_config = OpenAiConfig::new(args.openai_api_key.clone());
    if let Some(api_base) = &args.openai_api_base {
        openai_config.api_base = api_base.clone();
    }
    let chat = Arc::new(OpenAiChatClient::new(openai_config.clone())?);
    let transcription = Arc::new(OpenAiTranscriptionClient::new(openai_config.clone())?);
    let caption = Arc::new(OpenAiCaptionClient::new(openai_config)?);

    let row_sink = build_row_sink(args)?;
    let router = Arc::new(
        FlowRouter::new(vec![info_flow(info_text), contact_flow(row_sink)])
            .with_admin_commands(Arc::clone(&access)),
    );

    Ok(ConversationOrchestrator::new(OrchestratorDeps {
        access,
        router,
        aggregator: DebounceAggregator::new(Duration::from_secs(args.debounce_seconds)),
        context,
        chat,
        transcription,
        caption,
        replies,
        system_prompt,
    }))
}

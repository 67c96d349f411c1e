//! Nimbus entrypoint: builds the conversation engine and runs a local
//! line-oriented transport loop.
//!
//! Each stdin line is one inbound frame, `sender_id<TAB>text`; replies are
//! written to stdout. The real chat transport is out of scope here; this
//! loop exists so the engine can be driven end to end from a terminal or a
//! pipe.

mod bootstrap;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use nimbus_orchestrator::InboundEvent;

use crate::bootstrap::{build_engine, init_tracing, StdoutReplySink};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful support assistant. Answer concisely and stay on topic.";
const DEFAULT_INFO_TEXT: &str = "Ask me anything, or type 'contact' to leave your details.";

#[derive(Debug, Parser)]
#[command(name = "nimbus", about = "Conversational middleware engine")]
pub struct CliArgs {
    /// Directory holding the access snapshot and per-user context records.
    #[arg(long, env = "NIMBUS_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Override the OpenAI-compatible API base URL.
    #[arg(long, env = "NIMBUS_OPENAI_API_BASE")]
    pub openai_api_base: Option<String>,

    /// Quiet period before a user's buffered fragments flush as one turn.
    #[arg(long, env = "NIMBUS_DEBOUNCE_SECONDS", default_value_t = 15)]
    pub debounce_seconds: u64,

    /// Sender ids allowed to use admin commands.
    #[arg(long = "admin-id", env = "NIMBUS_ADMIN_IDS", value_delimiter = ',')]
    pub admin_ids: Vec<String>,

    #[arg(long, env = "NIMBUS_TEXT_AUDIO_LIMIT", default_value_t = 20)]
    pub text_audio_limit: u64,

    #[arg(long, env = "NIMBUS_IMAGE_LIMIT", default_value_t = 3)]
    pub image_limit: u64,

    /// File with the operator system prompt; a built-in default applies.
    #[arg(long, env = "NIMBUS_SYSTEM_PROMPT_FILE")]
    pub system_prompt_file: Option<PathBuf>,

    /// File with the text the `info` keyword replies with.
    #[arg(long, env = "NIMBUS_INFO_FILE")]
    pub info_file: Option<PathBuf>,

    /// Spreadsheet id for completed contact forms. Without it (and a
    /// token), rows land in a local JSONL file under the data dir.
    #[arg(long, env = "NIMBUS_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    #[arg(long, env = "NIMBUS_SHEETS_TOKEN", hide_env_values = true)]
    pub sheets_token: Option<String>,
}

fn load_text_or(path: Option<&PathBuf>, fallback: &str) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => Ok(fallback.to_string()),
    }
}

/// Splits one stdin frame into `(sender_id, text)`.
fn parse_frame(line: &str) -> Option<(&str, &str)> {
    let (sender, text) = line.split_once('\t')?;
    let sender = sender.trim();
    if sender.is_empty() {
        return None;
    }
    Some((sender, text))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let system_prompt = load_text_or(args.system_prompt_file.as_ref(), DEFAULT_SYSTEM_PROMPT)?;
    let info_text = load_text_or(args.info_file.as_ref(), DEFAULT_INFO_TEXT)?;
    let replies = Arc::new(StdoutReplySink);
    let orchestrator = build_engine(&args, system_prompt, info_text, replies)?;

    info!(data_dir = %args.data_dir.display(), "nimbus engine ready; reading frames from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let Some((sender, text)) = parse_frame(&line) else {
            warn!(line = line.as_str(), "ignoring malformed frame");
            continue;
        };
        if let Err(error) = orchestrator
            .handle_event(InboundEvent::text(sender, text))
            .await
        {
            warn!(sender, error = %error, "event handling failed");
        }
    }
    info!("stdin closed; shutting down (pending batches are discarded)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_splits_on_first_tab() {
        assert_eq!(
            parse_frame("user-1\thello there"),
            Some(("user-1", "hello there"))
        );
        assert_eq!(
            parse_frame("user-1\ta\tb"),
            Some(("user-1", "a\tb"))
        );
    }

    #[test]
    fn parse_frame_rejects_malformed_lines() {
        assert_eq!(parse_frame("no tab here"), None);
        assert_eq!(parse_frame("\thello"), None);
        assert_eq!(parse_frame(""), None);
    }

    #[test]
    fn load_text_or_uses_fallback_without_a_path() {
        let text = load_text_or(None, "fallback").expect("load");
        assert_eq!(text, "fallback");
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

#[async_trait]
/// Terminal side effect of a flow, run over the captured fields.
pub trait FlowAction: Send + Sync {
    async fn run(&self, user_id: &str, captured: &BTreeMap<String, String>) -> anyhow::Result<()>;
}

#[async_trait]
/// Durable row-append sink (e.g. a spreadsheet) used by terminal actions.
pub trait RowSink: Send + Sync {
    async fn append(&self, rows: Vec<Vec<String>>) -> anyhow::Result<()>;
}

#[derive(Clone)]
/// One step of a flow.
pub enum FlowStep {
    /// Send a reply and advance immediately.
    Prompt(String),
    /// Send `prompt`, then hold the session until the user's next message,
    /// which is recorded under `field`.
    Capture { prompt: String, field: String },
    /// Run a side effect and advance immediately. Failure is reported to
    /// the user but never rolls the session back.
    Action(Arc<dyn FlowAction>),
}

/// A keyword-triggered flow, immutable after registration.
#[derive(Clone)]
pub struct FlowDefinition {
    pub name: String,
    pub triggers: Vec<String>,
    pub steps: Vec<FlowStep>,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>, triggers: Vec<String>, steps: Vec<FlowStep>) -> Self {
        Self {
            name: name.into(),
            triggers: triggers
                .into_iter()
                .map(|trigger| trigger.to_ascii_lowercase())
                .collect(),
            steps,
        }
    }

    /// A message triggers a flow when its first whitespace token equals one
    /// of the flow's keywords, case-insensitively.
    pub fn matches(&self, text: &str) -> bool {
        let Some(first_token) = text.split_whitespace().next() else {
            return false;
        };
        let normalized = first_token.to_ascii_lowercase();
        self.triggers.iter().any(|trigger| *trigger == normalized)
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::definition::{FlowAction, FlowDefinition, FlowStep, RowSink};

const CONTACT_WELCOME: &str =
    "Welcome to the contact form, I will ask you a couple of questions";
const CONTACT_THANKS: &str = "Thanks. Your details were recorded";

/// Terminal action of the contact flow: appends one `[name, email, motive]`
/// row to the durable sink. At-most-once; a failed append is not retried.
pub struct AppendContactRow {
    sink: Arc<dyn RowSink>,
}

impl AppendContactRow {
    pub fn new(sink: Arc<dyn RowSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FlowAction for AppendContactRow {
    async fn run(&self, _user_id: &str, captured: &BTreeMap<String, String>) -> Result<()> {
        let field = |name: &str| -> Result<String> {
            captured
                .get(name)
                .cloned()
                .with_context(|| format!("contact flow finished without captured field '{name}'"))
        };
        let row = vec![field("name")?, field("email")?, field("motive")?];
        self.sink.append(vec![row]).await
    }
}

/// The ordered-capture contact form: name, email, motive, then one row
/// appended to the sink.
pub fn contact_flow(sink: Arc<dyn RowSink>) -> FlowDefinition {
    FlowDefinition::new(
        "contact",
        vec!["contact".to_string()],
        vec![
            FlowStep::Prompt(CONTACT_WELCOME.to_string()),
            FlowStep::Capture {
                prompt: "Full name?".to_string(),
                field: "name".to_string(),
            },
            FlowStep::Capture {
                prompt: "Personal email?".to_string(),
                field: "email".to_string(),
            },
            FlowStep::Capture {
                prompt: "Reason for contacting us?".to_string(),
                field: "motive".to_string(),
            },
            FlowStep::Prompt(CONTACT_THANKS.to_string()),
            FlowStep::Action(Arc::new(AppendContactRow::new(sink))),
        ],
    )
}

/// Static informational answer triggered by the `info` keyword.
pub fn info_flow(info_text: impl Into<String>) -> FlowDefinition {
    FlowDefinition::new(
        "info",
        vec!["info".to_string()],
        vec![FlowStep::Prompt(info_text.into())],
    )
}

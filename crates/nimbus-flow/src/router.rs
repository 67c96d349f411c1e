use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use nimbus_access::AccessControlStore;
use tracing::{debug, warn};

use crate::admin::AdminCommands;
use crate::definition::{FlowDefinition, FlowStep};

const ACTION_FAILURE_REPLY: &str =
    "Something went wrong while saving your details. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the router did with an inbound message.
pub enum FlowOutcome {
    /// The message was handled by a flow or admin command; `replies` are
    /// sent back to the user in order.
    Consumed { replies: Vec<String> },
    /// No trigger matched and no session is active; default handling applies.
    PassThrough,
}

#[derive(Debug, Clone)]
struct FlowSession {
    flow_index: usize,
    step_index: usize,
    captured: BTreeMap<String, String>,
}

/// Dispatches inbound messages to flows and drives per-user sessions.
///
/// Admin commands are checked first: they are a single-action dispatch, not
/// a session, and bypass flow state entirely. At most one flow session is
/// active per user; an in-flight session consumes every message from that
/// user until it terminates.
pub struct FlowRouter {
    definitions: Vec<FlowDefinition>,
    admin: Option<AdminCommands>,
    sessions: Mutex<HashMap<String, FlowSession>>,
}

impl FlowRouter {
    pub fn new(definitions: Vec<FlowDefinition>) -> Self {
        Self {
            definitions,
            admin: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Enables the in-band admin command vocabulary, gated by `access`.
    pub fn with_admin_commands(mut self, access: Arc<AccessControlStore>) -> Self {
        self.admin = Some(AdminCommands::new(access));
        self
    }

    /// True when `text` would be consumed by the router right now, without
    /// running anything. Used by the orchestrator to decide gating.
    pub fn would_consume(&self, user_id: &str, text: &str) -> bool {
        if self.lock_sessions().contains_key(user_id) {
            return true;
        }
        if let Some(admin) = &self.admin {
            if admin.matches(text) {
                return true;
            }
        }
        self.definitions.iter().any(|flow| flow.matches(text))
    }

    /// Routes one inbound message for `user_id`.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> Result<FlowOutcome> {
        let session = self.lock_sessions().get(user_id).cloned();
        if let Some(session) = session {
            let replies = self.resume_session(user_id, session, text).await?;
            return Ok(FlowOutcome::Consumed { replies });
        }

        if let Some(admin) = &self.admin {
            if admin.matches(text) {
                let reply = admin.dispatch(user_id, text)?;
                return Ok(FlowOutcome::Consumed {
                    replies: vec![reply],
                });
            }
        }

        let Some(flow_index) = self.definitions.iter().position(|flow| flow.matches(text)) else {
            return Ok(FlowOutcome::PassThrough);
        };
        debug!(
            user_id,
            flow = self.definitions[flow_index].name.as_str(),
            "flow triggered"
        );
        let session = FlowSession {
            flow_index,
            step_index: 0,
            captured: BTreeMap::new(),
        };
        let replies = self.run_until_blocked(user_id, session).await?;
        Ok(FlowOutcome::Consumed { replies })
    }

    /// Feeds a captured message into an in-flight session and advances it.
    async fn resume_session(
        &self,
        user_id: &str,
        mut session: FlowSession,
        text: &str,
    ) -> Result<Vec<String>> {
        let flow = &self.definitions[session.flow_index];
        match flow.steps.get(session.step_index) {
            Some(FlowStep::Capture { field, .. }) => {
                session.captured.insert(field.clone(), text.to_string());
                session.step_index += 1;
            }
            // A session only ever parks on a capture step; anything else
            // means the table was mutated out from under us, so drop it.
            _ => {
                self.lock_sessions().remove(user_id);
                return Ok(Vec::new());
            }
        }
        self.run_until_blocked(user_id, session).await
    }

    /// Executes steps until one needs user input or the flow ends. The
    /// session table is updated (or cleared) before returning.
    async fn run_until_blocked(
        &self,
        user_id: &str,
        mut session: FlowSession,
    ) -> Result<Vec<String>> {
        let flow = self.definitions[session.flow_index].clone();
        let mut replies = Vec::new();
        loop {
            match flow.steps.get(session.step_index) {
                None => {
                    self.lock_sessions().remove(user_id);
                    debug!(user_id, flow = flow.name.as_str(), "flow completed");
                    return Ok(replies);
                }
                Some(FlowStep::Prompt(text)) => {
                    replies.push(text.clone());
                    session.step_index += 1;
                }
                Some(FlowStep::Capture { prompt, .. }) => {
                    replies.push(prompt.clone());
                    self.lock_sessions()
                        .insert(user_id.to_string(), session);
                    return Ok(replies);
                }
                Some(FlowStep::Action(action)) => {
                    if let Err(error) = action.run(user_id, &session.captured).await {
                        warn!(
                            user_id,
                            flow = flow.name.as_str(),
                            error = %error,
                            "flow action failed"
                        );
                        replies.push(ACTION_FAILURE_REPLY.to_string());
                    }
                    session.step_index += 1;
                }
            }
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, FlowSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Keyword-routed conversational flows with multi-step capture.
//!
//! A flow is a static, ordered list of steps triggered by a keyword. Steps
//! either send a prompt, capture the user's next message into a named field,
//! or run a terminal side effect over everything captured. The router keeps
//! at most one active session per user and hands non-matching messages back
//! to the caller untouched.

mod admin;
mod builtin;
mod definition;
mod router;

pub use admin::AdminCommands;
pub use builtin::{contact_flow, info_flow, AppendContactRow};
pub use definition::{FlowAction, FlowDefinition, FlowStep, RowSink};
pub use router::{FlowOutcome, FlowRouter};

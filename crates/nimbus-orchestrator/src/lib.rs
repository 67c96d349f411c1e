//! Top-level coordination of inbound conversation events.
//!
//! The orchestrator wires admission control, the debounce aggregator, the
//! flow router, and the external AI gateways together: it decides whether an
//! event is admitted, normalizes voice and image content into text, and
//! turns each flushed batch into one completion call plus a reply.

mod event;
mod orchestrator;

pub use event::{EventKind, InboundEvent, ReplySink};
pub use orchestrator::{ConversationOrchestrator, OrchestratorDeps};

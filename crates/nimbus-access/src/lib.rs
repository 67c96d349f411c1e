//! Admission control for inbound conversation events.
//!
//! Holds the durable blocklist and per-user interaction counters that gate
//! every inbound event before it reaches the aggregator or a flow. The whole
//! state is one JSON snapshot rewritten on every mutation; the check-then-
//! increment sequence runs under one lock so a burst of events cannot exceed
//! a limit.

mod store;

pub use store::{
    AccessControlStore, InteractionCounters, InteractionKind, DEFAULT_IMAGE_LIMIT,
    DEFAULT_TEXT_AUDIO_LIMIT,
};

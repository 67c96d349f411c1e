use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use nimbus_core::write_snapshot_atomic;

/// Lifetime cap on text and voice interactions per user. Counters never
/// reset; bounding paid completion calls is the whole point of the limit.
pub const DEFAULT_TEXT_AUDIO_LIMIT: u64 = 20;
/// Lifetime cap on image interactions per user.
pub const DEFAULT_IMAGE_LIMIT: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which interaction budget an event draws from.
pub enum InteractionKind {
    TextAudio,
    Image,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Per-user usage counts, monotonically non-decreasing.
pub struct InteractionCounters {
    pub text_audio: u64,
    pub image: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct AccessControlState {
    blocked_ids: BTreeSet<String>,
    counters: BTreeMap<String, InteractionCounters>,
}

/// Durable blocklist plus per-user interaction counters.
///
/// All mutating operations persist the full snapshot before they report
/// success; a persistence failure propagates and the in-memory state is
/// rolled back so memory and disk never silently diverge.
pub struct AccessControlStore {
    path: PathBuf,
    admin_ids: BTreeSet<String>,
    text_audio_limit: u64,
    image_limit: u64,
    state: Mutex<AccessControlState>,
}

impl AccessControlStore {
    /// Loads the snapshot at `path`, initializing empty state when absent.
    pub fn load(
        path: impl Into<PathBuf>,
        admin_ids: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        Self::load_with_limits(
            path,
            admin_ids,
            DEFAULT_TEXT_AUDIO_LIMIT,
            DEFAULT_IMAGE_LIMIT,
        )
    }

    pub fn load_with_limits(
        path: impl Into<PathBuf>,
        admin_ids: impl IntoIterator<Item = String>,
        text_audio_limit: u64,
        image_limit: u64,
    ) -> Result<Self> {
        let path = path.into();
        let state = read_state(&path)?;
        Ok(Self {
            path,
            admin_ids: admin_ids.into_iter().collect(),
            text_audio_limit,
            image_limit,
            state: Mutex::new(state),
        })
    }

    pub fn is_blocked(&self, id: &str) -> bool {
        self.lock_state().blocked_ids.contains(id)
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.admin_ids.contains(id)
    }

    /// Blocks `id`. Idempotent; already-blocked ids skip the snapshot write.
    pub fn block(&self, id: &str) -> Result<()> {
        let mut state = self.lock_state();
        if !state.blocked_ids.insert(id.to_string()) {
            return Ok(());
        }
        if let Err(error) = persist_state(&self.path, &state) {
            state.blocked_ids.remove(id);
            return Err(error);
        }
        debug!(user_id = id, "blocked user");
        Ok(())
    }

    /// Unblocks `id`. Idempotent unconditional removal.
    pub fn unblock(&self, id: &str) -> Result<()> {
        let mut state = self.lock_state();
        if !state.blocked_ids.remove(id) {
            return Ok(());
        }
        if let Err(error) = persist_state(&self.path, &state) {
            state.blocked_ids.insert(id.to_string());
            return Err(error);
        }
        debug!(user_id = id, "unblocked user");
        Ok(())
    }

    pub fn blocked_ids(&self) -> Vec<String> {
        self.lock_state().blocked_ids.iter().cloned().collect()
    }

    /// Charges one interaction of `kind` against `id`'s budget.
    ///
    /// Returns `Ok(false)` without mutating anything once the count for
    /// `kind` has reached its limit; otherwise increments, persists, and
    /// returns `Ok(true)`. First sight of `id` initializes zero counters.
    pub fn register_interaction(&self, id: &str, kind: InteractionKind) -> Result<bool> {
        let mut state = self.lock_state();
        let counters = state.counters.entry(id.to_string()).or_default();
        let (count, limit) = match kind {
            InteractionKind::TextAudio => (&mut counters.text_audio, self.text_audio_limit),
            InteractionKind::Image => (&mut counters.image, self.image_limit),
        };
        if *count >= limit {
            return Ok(false);
        }
        *count += 1;
        if let Err(error) = persist_state(&self.path, &state) {
            if let Some(counters) = state.counters.get_mut(id) {
                match kind {
                    InteractionKind::TextAudio => counters.text_audio -= 1,
                    InteractionKind::Image => counters.image -= 1,
                }
            }
            return Err(error);
        }
        Ok(true)
    }

    pub fn counters(&self, id: &str) -> InteractionCounters {
        self.lock_state().counters.get(id).copied().unwrap_or_default()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AccessControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_state(path: &Path) -> Result<AccessControlState> {
    if !path.exists() {
        return Ok(AccessControlState::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read access snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse access snapshot {}", path.display()))
}

fn persist_state(path: &Path, state: &AccessControlState) -> Result<()> {
    let raw = serde_json::to_string_pretty(state).context("failed to serialize access snapshot")?;
    write_snapshot_atomic(path, &raw)
}

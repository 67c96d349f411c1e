//! Per-user conversational context persistence.
//!
//! Each user gets one JSON file holding their most recent prior exchanges.
//! The file is rewritten wholesale on every update and capped to the last
//! [`CONTEXT_CAP`] entries so the completion prompt stays bounded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use nimbus_core::write_snapshot_atomic;

/// Most recent entries kept per user: five user/assistant pairs.
pub const CONTEXT_CAP: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Speaker of a prior exchange entry.
pub enum ExchangeRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One prior turn in a user's running conversation context.
pub struct Exchange {
    pub role: ExchangeRole,
    pub content: String,
}

impl Exchange {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ExchangeRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ExchangeRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct ContextRecord {
    exchanges: Vec<Exchange>,
}

/// Write-through store of per-user context records under one directory.
///
/// A small in-memory cache fronts the files; every mutation rewrites the
/// user's record before returning so a persistence failure propagates
/// instead of leaving memory and disk diverged.
pub struct ContextStore {
    dir: PathBuf,
    cache: Mutex<BTreeMap<String, ContextRecord>>,
}

impl ContextStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the prior exchanges for `user_id`, oldest first. Absent
    /// records read as empty.
    pub fn load(&self, user_id: &str) -> Result<Vec<Exchange>> {
        let mut cache = self.lock_cache();
        if let Some(record) = cache.get(user_id) {
            return Ok(record.exchanges.clone());
        }
        let record = read_record(&self.record_path(user_id))?;
        let exchanges = record.exchanges.clone();
        cache.insert(user_id.to_string(), record);
        Ok(exchanges)
    }

    /// Appends one user/assistant pair, truncates to the cap, persists.
    pub fn record_exchange(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        let mut cache = self.lock_cache();
        let mut record = match cache.get(user_id) {
            Some(record) => record.clone(),
            None => read_record(&self.record_path(user_id))?,
        };
        record.exchanges.push(Exchange::user(user_text));
        record.exchanges.push(Exchange::assistant(assistant_text));
        if record.exchanges.len() > CONTEXT_CAP {
            let overflow = record.exchanges.len() - CONTEXT_CAP;
            record.exchanges.drain(..overflow);
        }
        let raw =
            serde_json::to_string_pretty(&record).context("failed to serialize context record")?;
        write_snapshot_atomic(&self.record_path(user_id), &raw)?;
        debug!(user_id, entries = record.exchanges.len(), "recorded exchange");
        cache.insert(user_id.to_string(), record);
        Ok(())
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.json"))
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ContextRecord>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_record(path: &Path) -> Result<ContextRecord> {
    if !path.exists() {
        return Ok(ContextRecord::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read context record {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse context record {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_record_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContextStore::new(dir.path());
        assert!(store.load("user-1").expect("load").is_empty());
    }

    #[test]
    fn record_exchange_appends_pairs_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContextStore::new(dir.path());
        store
            .record_exchange("user-1", "hello", "hi there")
            .expect("record");
        let exchanges = store.load("user-1").expect("load");
        assert_eq!(
            exchanges,
            vec![Exchange::user("hello"), Exchange::assistant("hi there")]
        );
    }

    #[test]
    fn context_truncates_to_most_recent_cap_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContextStore::new(dir.path());
        for turn in 0..8 {
            store
                .record_exchange("user-1", &format!("q{turn}"), &format!("a{turn}"))
                .expect("record");
        }
        let exchanges = store.load("user-1").expect("load");
        assert_eq!(exchanges.len(), CONTEXT_CAP);
        assert_eq!(exchanges[0], Exchange::user("q3"));
        assert_eq!(exchanges[9], Exchange::assistant("a7"));
    }

    #[test]
    fn records_survive_a_fresh_store_over_the_same_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = ContextStore::new(dir.path());
            store
                .record_exchange("user-1", "hello", "hi")
                .expect("record");
        }
        let reopened = ContextStore::new(dir.path());
        assert_eq!(reopened.load("user-1").expect("load").len(), 2);
    }

    #[test]
    fn users_get_independent_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContextStore::new(dir.path());
        store.record_exchange("user-1", "a", "b").expect("record");
        assert!(store.load("user-2").expect("load").is_empty());
    }
}

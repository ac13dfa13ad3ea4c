//! Translation history and saved panel configuration.
//!
//! Both live in a [`KeyValueStore`] as JSON under fixed keys. The history
//! log is newest-first and capped at [`MAX_HISTORY_ENTRIES`]; the panel
//! configuration is a single last-write-wins slot.
//!
//! Every operation is best-effort: storage and serialization failures are
//! logged and swallowed, so writes become no-ops and reads come back
//! empty. History is a convenience cache, never a system of record.
//!
//! Read-modify-write cycles are not transactional. Two processes sharing
//! one store can clobber each other's truncation.

use crate::storage::{KeyValueStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

pub const HISTORY_KEY: &str = "translationHistory";
pub const PANELS_KEY: &str = "translatorPanels";
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// A panel as captured in a history entry (no loading state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTargetPanel {
    pub language: String,
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub language_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub source_text: String,
    pub source_language: String,
    pub target_panels: Vec<HistoryTargetPanel>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_checkpoint: bool,
}

/// Template for which panels should exist; restores shape, not content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPanelConfig {
    pub language: String,
    pub translated_text: String,
    pub loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub language_code: String,
}

static LAST_ENTRY_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp id, strictly increasing within this process even
/// when two entries are created in the same millisecond.
fn next_entry_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    let previous = LAST_ENTRY_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(millis.max(last + 1))
        })
        .unwrap_or(millis);
    millis.max(previous + 1).to_string()
}

/// Build a history entry stamped with the current time.
pub fn create_entry(
    source_text: &str,
    source_language: &str,
    target_panels: Vec<HistoryTargetPanel>,
    label: Option<String>,
    is_checkpoint: bool,
) -> HistoryEntry {
    let now = Utc::now();
    HistoryEntry {
        id: next_entry_id(now),
        source_text: source_text.to_string(),
        source_language: source_language.to_string(),
        target_panels,
        timestamp: now,
        label,
        is_checkpoint,
    }
}

/// Capped history log plus the saved panel configuration.
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    max_entries: usize,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            max_entries: MAX_HISTORY_ENTRIES,
        }
    }

    /// Prepend an entry, dropping the oldest beyond the cap.
    pub fn save_entry(&self, entry: HistoryEntry) {
        let mut entries = self.list_entries();
        entries.insert(0, entry);
        entries.truncate(self.max_entries);

        if let Err(e) = self.write_entries(&entries) {
            error!("Failed to save history entry: {}", e);
        }
    }

    /// All entries, newest first. Empty on any failure.
    pub fn list_entries(&self) -> Vec<HistoryEntry> {
        match self.read_json(HISTORY_KEY) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                error!("Failed to load translation history: {}", e);
                Vec::new()
            }
        }
    }

    pub fn get_entry(&self, id: &str) -> Option<HistoryEntry> {
        self.list_entries().into_iter().find(|entry| entry.id == id)
    }

    /// Remove the entry with `id`. Absent ids leave the log untouched.
    pub fn delete_entry(&self, id: &str) {
        let mut entries = self.list_entries();
        let Some(position) = entries.iter().position(|entry| entry.id == id) else {
            debug!("History entry {} not found, nothing to delete", id);
            return;
        };
        entries.remove(position);

        if let Err(e) = self.write_entries(&entries) {
            error!("Failed to delete history entry: {}", e);
        }
    }

    pub fn clear_all(&self) {
        if let Err(e) = self.store.delete(HISTORY_KEY) {
            error!("Failed to clear translation history: {}", e);
        }
    }

    pub fn save_config(&self, panels: &[SavedPanelConfig]) {
        let result = serde_json::to_string(panels)
            .map_err(StorageError::from)
            .and_then(|json| self.store.set(PANELS_KEY, &json));

        if let Err(e) = result {
            error!("Failed to save panel configuration: {}", e);
        }
    }

    pub fn load_config(&self) -> Vec<SavedPanelConfig> {
        match self.read_json(PANELS_KEY) {
            Ok(panels) => panels.unwrap_or_default(),
            Err(e) => {
                error!("Failed to load panel configuration: {}", e);
                Vec::new()
            }
        }
    }

    pub fn clear_config(&self) {
        if let Err(e) = self.store.delete(PANELS_KEY) {
            error!("Failed to clear panel configuration: {}", e);
        }
    }

    fn write_entries(&self, entries: &[HistoryEntry]) -> Result<(), StorageError> {
        let json = serde_json::to_string(entries)?;
        self.store.set(HISTORY_KEY, &json)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.store.get(key)? {
            Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    /// Store whose every operation fails, like a full or unavailable medium
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
        fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
    }

    fn memory_history() -> (HistoryStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (HistoryStore::new(store.clone()), store)
    }

    fn entry(text: &str) -> HistoryEntry {
        create_entry(
            text,
            "English",
            vec![HistoryTargetPanel {
                language: "Spanish".to_string(),
                translated_text: format!("es:{}", text),
                voice: None,
                language_code: "es".to_string(),
            }],
            None,
            true,
        )
    }

    fn config_panel(language: &str, code: &str) -> SavedPanelConfig {
        SavedPanelConfig {
            language: language.to_string(),
            translated_text: String::new(),
            loading: false,
            voice: None,
            language_code: code.to_string(),
        }
    }

    // ==================== Log Tests ====================

    #[test]
    fn test_save_prepends_newest_first() {
        let (history, _) = memory_history();

        history.save_entry(entry("first"));
        history.save_entry(entry("second"));

        let entries = history.list_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_text, "second");
        assert_eq!(entries[1].source_text, "first");
    }

    #[test]
    fn test_cap_keeps_fifty_most_recent() {
        let (history, _) = memory_history();

        for i in 0..51 {
            history.save_entry(entry(&format!("text {}", i)));
        }

        let entries = history.list_entries();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(entries[0].source_text, "text 50");
        assert_eq!(entries[49].source_text, "text 1");
        assert!(entries.iter().all(|e| e.source_text != "text 0"));
    }

    #[test]
    fn test_eviction_is_by_insertion_not_timestamp() {
        let (history, _) = memory_history();

        let mut old = entry("backdated");
        old.timestamp = DateTime::from_timestamp(0, 0).unwrap();
        history.save_entry(entry("real time"));
        history.save_entry(old);

        let entries = history.list_entries();
        assert_eq!(entries[0].source_text, "backdated");
    }

    #[test]
    fn test_delete_entry_removes_it() {
        let (history, _) = memory_history();
        let keep = entry("keep");
        let drop = entry("drop");
        let drop_id = drop.id.clone();
        history.save_entry(keep);
        history.save_entry(drop);

        history.delete_entry(&drop_id);

        let entries = history.list_entries();
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().all(|e| e.id != drop_id));
    }

    #[test]
    fn test_delete_missing_id_is_noop() {
        let (history, _) = memory_history();
        history.save_entry(entry("a"));
        history.save_entry(entry("b"));
        let before = history.list_entries();

        history.delete_entry("does-not-exist");

        assert_eq!(history.list_entries(), before);
    }

    #[test]
    fn test_get_entry() {
        let (history, _) = memory_history();
        let saved = entry("find me");
        let id = saved.id.clone();
        history.save_entry(saved);

        assert_eq!(history.get_entry(&id).unwrap().source_text, "find me");
        assert!(history.get_entry("nope").is_none());
    }

    #[test]
    fn test_clear_all() {
        let (history, _) = memory_history();
        history.save_entry(entry("a"));
        history.save_config(&[config_panel("French", "fr")]);

        history.clear_all();

        assert!(history.list_entries().is_empty());
        assert_eq!(history.load_config().len(), 1, "config slot is independent");
    }

    // ==================== Config Slot Tests ====================

    #[test]
    fn test_config_last_write_wins() {
        let (history, _) = memory_history();

        history.save_config(&[config_panel("French", "fr")]);
        history.save_config(&[config_panel("German", "de"), config_panel("Korean", "ko")]);

        let loaded = history.load_config();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].language, "German");
        assert_eq!(loaded[1].language_code, "ko");
    }

    #[test]
    fn test_config_empty_when_never_saved() {
        let (history, _) = memory_history();
        assert!(history.load_config().is_empty());
    }

    #[test]
    fn test_clear_config() {
        let (history, _) = memory_history();
        history.save_config(&[config_panel("French", "fr")]);
        history.clear_config();
        assert!(history.load_config().is_empty());
    }

    // ==================== Failure Semantics Tests ====================

    #[test]
    fn test_broken_store_is_silent() {
        let history = HistoryStore::new(Arc::new(BrokenStore));

        history.save_entry(entry("lost"));
        history.delete_entry("whatever");
        history.clear_all();
        history.save_config(&[config_panel("French", "fr")]);
        history.clear_config();

        assert!(history.list_entries().is_empty());
        assert!(history.load_config().is_empty());
    }

    #[test]
    fn test_corrupt_history_reads_empty_and_is_overwritten() {
        let (history, store) = memory_history();
        store.set(HISTORY_KEY, "{not json").unwrap();

        assert!(history.list_entries().is_empty());

        history.save_entry(entry("fresh"));
        assert_eq!(history.list_entries().len(), 1);
    }

    // ==================== Serialization Tests ====================

    #[test]
    fn test_timestamp_round_trips_to_the_second() {
        let (history, _) = memory_history();
        let original = entry("timed");
        let created = original.timestamp;
        history.save_entry(original);

        let restored = history.list_entries().remove(0);
        assert_eq!(restored.timestamp.timestamp(), created.timestamp());
        assert_eq!(restored.timestamp, created);
    }

    #[test]
    fn test_entries_use_camel_case_keys() {
        let json = serde_json::to_value(entry("x")).unwrap();
        assert!(json.get("sourceText").is_some());
        assert!(json.get("isCheckpoint").is_some());
        assert!(json["targetPanels"][0].get("languageCode").is_some());
        assert!(json.get("label").is_none(), "absent label is omitted");
    }

    #[test]
    fn test_reads_millisecond_iso_timestamps() {
        let (history, store) = memory_history();
        store
            .set(
                HISTORY_KEY,
                r#"[{"id":"1700000000000","sourceText":"hi","sourceLanguage":"English",
                    "targetPanels":[{"language":"French","translatedText":"salut","languageCode":"fr"}],
                    "timestamp":"2023-11-14T22:13:20.000Z","isCheckpoint":false}]"#,
            )
            .unwrap();

        let entries = history.list_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(entries[0].target_panels[0].voice, None);
    }

    #[test]
    fn test_entry_ids_strictly_increase() {
        let ids: Vec<i64> = (0..100)
            .map(|_| entry("fast").id.parse().unwrap())
            .collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}

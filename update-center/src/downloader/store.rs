//! In-memory table of update records and their latest transfer snapshot.

use std::collections::{BTreeMap, HashSet};

use crate::domain::{DownloadProgress, UpdateRecord, UpdateStatus};

use super::{DownloadState, RetryAction};

/// Everything the control plane knows about one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub record: UpdateRecord,
    /// Latest engine snapshot, replaced on every callback.
    pub progress: Option<DownloadProgress>,
    pub state: DownloadState,
    /// Classification of the most recent transfer failure.
    pub last_retry: Option<RetryAction>,
    /// A handshake retry was spent since the last `LOADING` snapshot.
    pub handshake_retried: bool,
}

impl StoreEntry {
    fn new(record: UpdateRecord) -> Self {
        Self {
            record,
            progress: None,
            state: DownloadState::Idle,
            last_retry: None,
            handshake_retried: false,
        }
    }

    pub fn tag(&self) -> &str {
        self.record.tag()
    }

    /// Snapshot to project, synthesizing an empty one when the engine never reported.
    pub fn progress_or_default(&self) -> DownloadProgress {
        self.progress
            .clone()
            .unwrap_or_else(|| DownloadProgress::new(self.tag(), Default::default()))
    }

    /// Entries that must survive a catalog refresh.
    fn is_pinned(&self) -> bool {
        self.state.is_busy()
            || self.state == DownloadState::Paused
            || self.record.status == UpdateStatus::Installing
    }
}

/// Outcome of replacing the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// Names not present in the previous catalog.
    pub added: Vec<String>,
    /// Records dropped because the catalog no longer lists them.
    pub superseded: Vec<String>,
    /// Records no longer listed but kept because they are in use.
    pub retained: Vec<String>,
}

impl CatalogDiff {
    pub fn has_new_updates(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Download record store.
///
/// Holds at most one entry per tag and at most one snapshot per entry.
#[derive(Debug, Default)]
pub struct RecordStore {
    entries: BTreeMap<String, StoreEntry>,
    /// Tag of the most recently requested transfer.
    current: Option<String>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Records ==========

    /// Insert or refresh a record, keeping the lifecycle state of an existing entry.
    pub fn upsert(&mut self, record: UpdateRecord) -> bool {
        match self.entries.get_mut(record.tag()) {
            Some(entry) => {
                let status = entry.record.status;
                let install_progress = entry.record.install_progress;
                let finalizing = entry.record.finalizing;
                entry.record = UpdateRecord {
                    status,
                    install_progress,
                    finalizing,
                    ..record
                };
                false
            }
            None => {
                self.entries
                    .insert(record.tag().to_string(), StoreEntry::new(record));
                true
            }
        }
    }

    pub fn get(&self, tag: &str) -> Option<&StoreEntry> {
        self.entries.get(tag)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut StoreEntry> {
        self.entries.get_mut(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn remove(&mut self, tag: &str) -> Option<StoreEntry> {
        if self.current.as_deref() == Some(tag) {
            self.current = None;
        }
        self.entries.remove(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreEntry> {
        self.entries.values()
    }

    /// Replace the catalog with `records`.
    ///
    /// Existing entries keep their lifecycle state. Entries missing from the
    /// new catalog are dropped unless a transfer or install still uses them.
    pub fn replace_catalog(&mut self, records: Vec<UpdateRecord>) -> CatalogDiff {
        let mut diff = CatalogDiff::default();
        let listed: HashSet<String> = records.iter().map(|r| r.name.clone()).collect();

        let unlisted: Vec<String> = self
            .entries
            .keys()
            .filter(|tag| !listed.contains(*tag))
            .cloned()
            .collect();
        for tag in unlisted {
            let pinned = self.entries.get(&tag).is_some_and(StoreEntry::is_pinned);
            if pinned {
                diff.retained.push(tag);
            } else {
                self.remove(&tag);
                diff.superseded.push(tag);
            }
        }

        for record in records {
            let name = record.name.clone();
            if self.upsert(record) {
                diff.added.push(name);
            }
        }

        diff
    }

    // ========== Queries ==========

    pub fn current_transfer(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn set_current_transfer(&mut self, tag: &str) {
        self.current = Some(tag.to_string());
    }

    /// A tag other than `tag` whose download is queued, running or
    /// waiting for the network.
    pub fn busy_other_than(&self, tag: &str) -> Option<&str> {
        self.entries
            .values()
            .find(|e| e.tag() != tag && e.state.is_busy())
            .map(StoreEntry::tag)
    }

    pub fn has_busy_downloads(&self) -> bool {
        self.entries.values().any(|e| e.state.is_busy())
    }

    pub fn installing_tag(&self) -> Option<&str> {
        self.entries
            .values()
            .find(|e| e.record.status == UpdateStatus::Installing)
            .map(StoreEntry::tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> UpdateRecord {
        UpdateRecord::new(name, format!("https://example.invalid/{}.zip", name))
    }

    #[test]
    fn test_upsert_keeps_single_entry_per_tag() {
        let mut store = RecordStore::new();
        assert!(store.upsert(record("A")));
        store.get_mut("A").unwrap().record.status = UpdateStatus::Downloading;

        assert!(!store.upsert(record("A").with_display_version("A 2")));
        assert_eq!(store.len(), 1);
        let entry = store.get("A").unwrap();
        assert_eq!(entry.record.display_version, "A 2");
        assert_eq!(entry.record.status, UpdateStatus::Downloading);
    }

    #[test]
    fn test_replace_catalog_reports_new_and_superseded() {
        let mut store = RecordStore::new();
        store.upsert(record("A"));
        store.upsert(record("B"));
        store.get_mut("B").unwrap().state = DownloadState::Active;

        let diff = store.replace_catalog(vec![record("C"), record("A")]);

        assert_eq!(diff.added, vec!["C".to_string()]);
        assert!(diff.superseded.is_empty());
        assert_eq!(diff.retained, vec!["B".to_string()]);
        assert!(diff.has_new_updates());
        assert!(store.contains("B"));

        store.get_mut("B").unwrap().state = DownloadState::Finished;
        let diff = store.replace_catalog(vec![record("A"), record("C")]);
        assert_eq!(diff.superseded, vec!["B".to_string()]);
        assert!(!diff.has_new_updates());
        assert!(!store.contains("B"));
    }

    #[test]
    fn test_remove_clears_current_transfer() {
        let mut store = RecordStore::new();
        store.upsert(record("A"));
        store.set_current_transfer("A");
        store.remove("A");
        assert_eq!(store.current_transfer(), None);
    }

    #[test]
    fn test_busy_other_than() {
        let mut store = RecordStore::new();
        store.upsert(record("A"));
        store.upsert(record("B"));
        store.get_mut("A").unwrap().state = DownloadState::Waiting;

        assert_eq!(store.busy_other_than("B"), Some("A"));
        assert_eq!(store.busy_other_than("A"), None);

        store.get_mut("A").unwrap().state = DownloadState::Error(RetryAction::WaitForNetwork);
        assert_eq!(store.busy_other_than("B"), Some("A"));

        store.get_mut("A").unwrap().state = DownloadState::Paused;
        assert_eq!(store.busy_other_than("B"), None);
    }
}

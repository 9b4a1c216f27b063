//! Append-only JSON log of model interactions.
//!
//! The file holds one JSON array. Appends rewrite the whole array into a
//! sibling temp file and rename it over the journal, so a crash mid-write
//! leaves the previous contents intact.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal at {path} is not a valid entry list: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode journal: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub kind: String,
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl JournalEntry {
    pub fn new(
        kind: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recorded_at,
            kind: kind.into(),
            input: input.into(),
            output: output.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub struct Journal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn entries(&self) -> Result<Vec<JournalEntry>, JournalError> {
        read_entries(&self.path).await
    }

    pub async fn entries_of_kind(&self, kind: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let entries = self.entries().await?;
        Ok(entries.into_iter().filter(|entry| entry.kind == kind).collect())
    }

    pub async fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let _guard = self.write_lock.lock().await;

        let mut entries = read_entries(&self.path).await?;
        entries.push(entry);
        let encoded = serde_json::to_vec_pretty(&entries)?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|source| JournalError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let temp_path = temp_path_for(&self.path);
        tokio::fs::write(&temp_path, encoded)
            .await
            .map_err(|source| JournalError::Io { path: temp_path.clone(), source })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|source| JournalError::Io { path: self.path.clone(), source })?;

        tracing::debug!(
            event_name = "system.journal.appended",
            path = %self.path.display(),
            entries = entries.len(),
            "journal entry appended"
        );
        Ok(())
    }
}

async fn read_entries(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(JournalError::Io { path: path.to_path_buf(), source }),
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&raw)
        .map_err(|source| JournalError::Corrupt { path: path.to_path_buf(), source })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{Journal, JournalEntry, JournalError};

    fn at(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).single().expect("timestamp")
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("agent_memory.json"));

        assert!(journal.entries().await.expect("entries").is_empty());
    }

    #[tokio::test]
    async fn append_preserves_prior_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("nested").join("agent_memory.json"));

        let first = JournalEntry::new("quote_summary", "prompt one", "reply one", at(0))
            .with_metadata("quote_id", "Q-1");
        let second = JournalEntry::new("quote_summary", "prompt two", "reply two", at(5));
        journal.append(first.clone()).await.expect("append first");
        journal.append(second.clone()).await.expect("append second");

        assert_eq!(journal.entries().await.expect("entries"), vec![first, second]);
        assert!(!dir.path().join("nested").join("agent_memory.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_and_left_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agent_memory.json");
        std::fs::write(&path, "{ not json").expect("seed corrupt journal");
        let journal = Journal::new(&path);

        assert!(matches!(journal.entries().await, Err(JournalError::Corrupt { .. })));
        let error = journal
            .append(JournalEntry::new("quote_summary", "p", "r", at(0)))
            .await
            .expect_err("append onto corrupt journal");
        assert!(matches!(error, JournalError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).expect("read back"), "{ not json");
    }

    #[tokio::test]
    async fn concurrent_appends_are_serialized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Arc::new(Journal::new(dir.path().join("agent_memory.json")));

        let mut handles = Vec::new();
        for index in 0..8u32 {
            let journal = Arc::clone(&journal);
            handles.push(tokio::spawn(async move {
                journal
                    .append(JournalEntry::new("note", format!("in {index}"), "out", at(index)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("append");
        }

        let entries = journal.entries_of_kind("note").await.expect("entries");
        assert_eq!(entries.len(), 8);
    }
}

//! Flat-file persistence of submissions.
//!
//! The store is a single JSON array. Each append reads the whole file, adds
//! one record, and rewrites it, so cost grows with the number of stored
//! submissions. A missing or empty file means no prior submissions.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Notification, NotificationSink, NotifyError};
use crate::BoxFuture;

/// One persisted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSubmission {
    pub name: String,
    pub email: String,
    pub message: String,
    pub client_id: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl From<&Notification> for StoredSubmission {
    fn from(n: &Notification) -> Self {
        Self {
            name: n.submission.name.clone(),
            email: n.submission.email.clone(),
            message: n.submission.message.clone(),
            client_id: n.client_id.clone(),
            user_agent: n.user_agent.clone(),
            received_at: n.received_at,
        }
    }
}

/// JSON-array file of every accepted submission.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored submission, oldest first.
    pub async fn load(&self) -> Result<Vec<StoredSubmission>, NotifyError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Append one record and rewrite the file. Returns the new record count.
    pub async fn append(&self, record: StoredSubmission) -> Result<usize, NotifyError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await?;
        records.push(record);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = records.len(), "Submission stored");
        Ok(records.len())
    }
}

impl NotificationSink for FileStore {
    fn name(&self) -> &str {
        "store"
    }

    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.append(StoredSubmission::from(notification)).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::SanitizedSubmission;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(name: &str) -> StoredSubmission {
        StoredSubmission {
            name: name.to_string(),
            email: format!("{}@x.com", name.to_lowercase()),
            message: "hello".to_string(),
            client_id: "198.51.100.1".to_string(),
            user_agent: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("none.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_empty_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("submissions.json");
        tokio::fs::write(&path, b"  \n").await.unwrap();
        let store = FileStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_accumulates_records() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("data").join("submissions.json"));

        assert_eq!(store.append(record("Ana")).await.unwrap(), 1);
        assert_eq!(store.append(record("Ben")).await.unwrap(), 2);

        let all = store.load().await.unwrap();
        let names: Vec<_> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben"]);
        assert!(!tmp.path().join("data").join("submissions.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("submissions.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.load().await, Err(NotifyError::Corrupt(_))));
        assert!(store.append(record("Ana")).await.is_err());
    }

    #[tokio::test]
    async fn test_deliver_stores_notification() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("submissions.json"));
        let n = Notification::new(
            SanitizedSubmission {
                name: "Ana".to_string(),
                email: "ana@x.com".to_string(),
                message: "hi".to_string(),
            },
            "unknown",
            Some("test-agent".to_string()),
        );

        store.deliver(&n).await.unwrap();

        let all = store.load().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], StoredSubmission::from(&n));
    }
}

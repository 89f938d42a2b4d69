//! File-backed remote client for offline runs.
//!
//! Reads a full snapshot from a JSON file and records would-be writes
//! instead of sending them anywhere. Useful for dry-runs against a captured
//! snapshot and as a second `RemoteClient` implementation in tests; the real
//! HTTP client lives outside this workspace.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use sync_core::remote::{
    CreateTask, RemoteClient, RemoteError, RemoteSnapshot, Result, TaskPatch,
};
use tracing::info;

/// On-disk shape: a snapshot plus the recently-deleted id list.
#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(flatten)]
    snapshot: RemoteSnapshot,
    #[serde(default)]
    recently_deleted: Vec<String>,
}

/// A write the engine attempted during a dry run.
#[derive(Debug, Clone)]
pub enum RecordedWrite {
    Create(CreateTask),
    Update(TaskPatch),
}

pub struct SnapshotFileClient {
    snapshot: RemoteSnapshot,
    recently_deleted: HashSet<String>,
    writes: Mutex<Vec<RecordedWrite>>,
    next_id: AtomicU64,
}

impl SnapshotFileClient {
    /// Load a snapshot file from disk.
    pub fn load(path: &Path) -> std::result::Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)?;
        let file: SnapshotFile = serde_json::from_str(&raw)?;
        Ok(Self {
            snapshot: file.snapshot,
            recently_deleted: file.recently_deleted.into_iter().collect(),
            writes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Everything the engine tried to write during the run.
    pub fn recorded_writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for SnapshotFileClient {
    async fn fetch_snapshot(&self) -> Result<RemoteSnapshot> {
        Ok(self.snapshot.clone())
    }

    async fn fetch_recently_deleted_ids(&self, limit: usize) -> Result<HashSet<String>> {
        Ok(self.recently_deleted.iter().take(limit).cloned().collect())
    }

    async fn create_task(&self, task: &CreateTask) -> Result<String> {
        let id = format!("dry-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        info!("Dry run: would create task '{}' as {}", task.content, id);
        self.writes
            .lock()
            .map_err(|e| RemoteError::Api(e.to_string()))?
            .push(RecordedWrite::Create(task.clone()));
        Ok(id)
    }

    async fn update_task(&self, patch: &TaskPatch) -> Result<()> {
        info!("Dry run: would update task {}", patch.id);
        self.writes
            .lock()
            .map_err(|e| RemoteError::Api(e.to_string()))?
            .push(RecordedWrite::Update(patch.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_snapshot_and_records_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{
                "items": [{"id": "A1", "content": "Buy milk", "project_id": "P1"}],
                "projects": [{"id": "P1", "name": "Personal"}],
                "sections": [],
                "user_id": "U1",
                "sync_token": "tok",
                "recently_deleted": ["A9"]
            }"#,
        )
        .unwrap();

        let client = SnapshotFileClient::load(&path).unwrap();
        let snapshot = client.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.sync_token, "tok");

        let deleted = client.fetch_recently_deleted_ids(100).await.unwrap();
        assert!(deleted.contains("A9"));

        let id = client
            .create_task(&CreateTask {
                content: "New".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(id.starts_with("dry-"));
        assert_eq!(client.recorded_writes().len(), 1);
    }
}

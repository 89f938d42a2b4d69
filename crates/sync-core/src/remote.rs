//! Contract for the remote task service.
//!
//! The HTTP client itself lives outside this crate; the engine consumes a
//! snapshot and issues create/update calls through [`RemoteClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Due information on a remote item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDue {
    /// ISO date `YYYY-MM-DD`
    pub date: Option<String>,
    /// Natural-language due string (doubles as the recurrence rule)
    pub string: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
}

/// Deadline information on a remote item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDeadline {
    /// ISO date `YYYY-MM-DD`
    pub date: String,
}

/// One task row from the remote snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    /// Task title
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checked: bool,
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub parent_id: Option<String>,
    /// 1 (normal) … 4 (urgent)
    #[serde(default = "default_priority")]
    pub priority: i64,
    pub due: Option<RemoteDue>,
    pub deadline: Option<RemoteDeadline>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub responsible_uid: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

fn default_priority() -> i64 {
    1
}

/// One project row from the remote snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
}

/// One section row from the remote snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSection {
    pub id: String,
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub is_archived: bool,
}

/// Full remote state as of one fetch, plus the token for the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub items: Vec<RemoteItem>,
    pub projects: Vec<RemoteProject>,
    pub sections: Vec<RemoteSection>,
    pub user_id: String,
    pub sync_token: String,
}

impl RemoteSnapshot {
    pub fn project(&self, id: &str) -> Option<&RemoteProject> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn section(&self, id: &str) -> Option<&RemoteSection> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&RemoteItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn project_name(&self, id: &str) -> Option<&str> {
        self.project(id).map(|p| p.name.as_str())
    }

    pub fn section_name(&self, id: &str) -> Option<&str> {
        self.section(id).map(|s| s.name.as_str())
    }

    /// id → name map over projects.
    pub fn project_names_by_id(&self) -> HashMap<String, String> {
        self.projects
            .iter()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect()
    }

    /// id → parent id map over projects.
    pub fn project_parents_by_id(&self) -> HashMap<String, Option<String>> {
        self.projects
            .iter()
            .map(|p| (p.id.clone(), p.parent_id.clone()))
            .collect()
    }

    /// id → name map over sections.
    pub fn section_names_by_id(&self) -> HashMap<String, String> {
        self.sections
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect()
    }

    /// section id → owning project id map.
    pub fn section_projects_by_id(&self) -> HashMap<String, String> {
        self.sections
            .iter()
            .map(|s| (s.id.clone(), s.project_id.clone()))
            .collect()
    }
}

/// Payload for a remote task creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTask {
    pub content: String,
    pub description: Option<String>,
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub parent_id: Option<String>,
    pub priority: Option<i64>,
    pub due_date: Option<String>,
    pub due_string: Option<String>,
    pub labels: Vec<String>,
}

/// A three-state update cell: untouched, cleared, or set.
///
/// Distinguishes "not provided" from "clear to empty" in update payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Build from an optional value where None means clear.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

/// Field-wise update for one remote task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub id: String,
    pub content: Patch<String>,
    pub description: Patch<String>,
    pub is_done: Patch<bool>,
    pub priority: Patch<i64>,
    pub due_date: Patch<String>,
    pub due_string: Patch<String>,
    pub labels: Patch<Vec<String>>,
}

/// The remote service, as the engine sees it.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the full snapshot: active projects, sections, non-deleted items,
    /// and the user identity. Called once per run, after push.
    async fn fetch_snapshot(&self) -> Result<RemoteSnapshot>;

    /// Fetch ids of recently deleted tasks from the activity log.
    async fn fetch_recently_deleted_ids(&self, limit: usize) -> Result<HashSet<String>>;

    /// Create a task; returns the new remote id.
    async fn create_task(&self, task: &CreateTask) -> Result<String>;

    /// Apply a field-wise update.
    async fn update_task(&self, patch: &TaskPatch) -> Result<()>;
}

/// Web URL for a remote task.
pub fn task_url(task_id: &str) -> String {
    format!("https://todoist.com/showTask?id={}", task_id)
}

/// Web URL for a remote project.
pub fn project_url(project_id: &str) -> String {
    format!("https://todoist.com/app/project/{}", project_id)
}

//! Typed views over managed-note frontmatter.
//!
//! The frontmatter bag stays dynamic (`vault_fs::Frontmatter`); this module
//! gives the engine named, typed reads over it plus the canonical enums for
//! task and sync state. Parsing is tolerant, serialization elsewhere is
//! strict.

use crate::fingerprint::LocalSyncFields;
use crate::props::{self, legacy, PropNames};
use chrono::{DateTime, SecondsFormat, Utc};
use vault_fs::Frontmatter;

/// Task completion state as stored in frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Open,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::Done => "Done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Open" | "open" => Some(TaskStatus::Open),
            "Done" | "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }

    pub fn is_done(self) -> bool {
        self == TaskStatus::Done
    }
}

/// Where a note stands relative to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    DirtyLocal,
    QueuedLocalCreate,
    LocalOnly,
    MissingRemote,
    CompletedRemote,
    ArchivedRemote,
    DeletedRemote,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::DirtyLocal => "dirty_local",
            SyncStatus::QueuedLocalCreate => "queued_local_create",
            SyncStatus::LocalOnly => "local_only",
            SyncStatus::MissingRemote => "missing_remote",
            SyncStatus::CompletedRemote => "completed_remote",
            SyncStatus::ArchivedRemote => "archived_remote",
            SyncStatus::DeletedRemote => "deleted_remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "synced" => Some(SyncStatus::Synced),
            "dirty_local" => Some(SyncStatus::DirtyLocal),
            "queued_local_create" => Some(SyncStatus::QueuedLocalCreate),
            "local_only" => Some(SyncStatus::LocalOnly),
            "missing_remote" => Some(SyncStatus::MissingRemote),
            "completed_remote" => Some(SyncStatus::CompletedRemote),
            "archived_remote" => Some(SyncStatus::ArchivedRemote),
            "deleted_remote" => Some(SyncStatus::DeletedRemote),
            _ => None,
        }
    }

    /// Terminal states are skipped by the back-link passes; the remote no
    /// longer owns these notes.
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::ArchivedRemote | SyncStatus::DeletedRemote)
    }
}

/// Display label for a remote priority (1 normal … 4 urgent).
///
/// The UI convention inverts the stored number: p1 is urgent.
pub fn priority_label(priority: i64) -> String {
    format!("p{}", 5 - priority.clamp(1, 4))
}

/// RFC 3339 UTC timestamp, second precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Typed read of a task note's frontmatter.
#[derive(Debug, Clone, Default)]
pub struct TaskNote {
    pub vault_uuid: Option<String>,
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub done: bool,
    pub task_id: Option<String>,
    pub pending_id: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub section_id: Option<String>,
    pub section_name: Option<String>,
    pub priority: Option<i64>,
    pub due_date: Option<String>,
    pub due_string: Option<String>,
    pub is_recurring: bool,
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub sync_flag: bool,
    pub sync_status: Option<SyncStatus>,
    pub import_signature: Option<String>,
    pub sync_signature: Option<String>,
    pub complete_instances: Vec<String>,
}

impl TaskNote {
    /// Read the typed view out of a frontmatter bag.
    pub fn read(fm: &Frontmatter, p: &PropNames) -> Self {
        Self {
            vault_uuid: props::get_string(fm, &p.vault_uuid, legacy::VAULT_UUID),
            title: props::get_string(fm, &p.task_title, legacy::TASK_TITLE),
            status: props::get_string(fm, &p.task_status, "")
                .as_deref()
                .and_then(TaskStatus::parse),
            done: props::get_bool(fm, &p.task_done, legacy::TASK_DONE).unwrap_or(false),
            task_id: props::get_id(fm, &p.task_id, legacy::TASK_ID),
            pending_id: props::get_id(fm, &p.pending_id, ""),
            project_id: props::get_id(fm, &p.project_id, legacy::PROJECT_ID),
            project_name: props::get_string(fm, &p.project_name, ""),
            section_id: props::get_id(fm, &p.section_id, legacy::SECTION_ID),
            section_name: props::get_string(fm, &p.section_name, ""),
            priority: props::get_i64(fm, &p.priority, ""),
            due_date: props::get_string(fm, &p.due_date, legacy::DUE_DATE),
            due_string: props::get_string(fm, &p.due_string, ""),
            is_recurring: props::get_bool(fm, &p.is_recurring, legacy::IS_RECURRING)
                .unwrap_or(false),
            deadline: props::get_string(fm, &p.deadline, ""),
            description: props::get_string(fm, &p.description, ""),
            labels: props::get_string_list(fm, &p.labels, ""),
            sync_flag: props::get_bool(fm, &p.sync_flag, legacy::SYNC_FLAG).unwrap_or(false),
            sync_status: props::get_string(fm, &p.sync_status, "")
                .as_deref()
                .and_then(SyncStatus::parse),
            import_signature: props::get_string(fm, &p.import_signature, legacy::IMPORT_SIGNATURE),
            sync_signature: props::get_string(fm, &p.sync_signature, legacy::SYNC_SIGNATURE),
            complete_instances: props::get_string_list(fm, &p.complete_instances, ""),
        }
    }

    /// Whether the note is done, from status or the boolean mirror.
    pub fn is_done(&self) -> bool {
        self.status.map(TaskStatus::is_done).unwrap_or(self.done)
    }

    /// The local-sync fingerprint projection of this note.
    pub fn local_sync_fields(&self) -> LocalSyncFields<'_> {
        LocalSyncFields {
            title: self.title.as_deref().unwrap_or(""),
            description: self.description.as_deref().unwrap_or(""),
            is_done: self.is_done(),
            is_recurring: self.is_recurring,
            project_id: self.project_id.as_deref(),
            section_id: self.section_id.as_deref(),
            due_date: self.due_date.as_deref(),
            due_string: self.due_string.as_deref(),
        }
    }
}

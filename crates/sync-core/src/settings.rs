//! Engine configuration.
//!
//! Every component takes its settings as an argument; there is no global
//! state. The daemon deserializes this from a YAML file, tests build it in
//! code via `Settings::default()` and field updates.

use crate::props::PropNames;
use serde::{Deserialize, Serialize};

/// Which side wins when a note is locally dirty and the remote changed too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Keep local title/status/priority/due/description; still absorb
    /// remote-owned metadata so the import fingerprint settles.
    LocalWins,
    /// Apply every remote field.
    RemoteWins,
}

/// What to do with a task note whose remote counterpart disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingRemoteMode {
    /// Mark the note, leave the file where it is.
    KeepInPlace,
    /// Mark the note and move it to the configured folder.
    MoveToFolder,
    /// Mark the note and strip its remote task ID so it becomes local-only.
    /// Only honored for deleted tasks.
    StopSyncing,
}

/// Auto-import filter applied to remote items before upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportFilter {
    /// Only import items assigned to the fetching user (or unassigned).
    pub assigned_to_me_only: bool,
    /// If non-empty, an item must carry at least one of these labels.
    pub required_labels: Vec<String>,
    /// Items carrying any of these labels are skipped.
    pub excluded_labels: Vec<String>,
    /// If non-empty, only items from these project names are imported.
    pub allowed_projects: Vec<String>,
    /// Items from these project names are skipped.
    pub excluded_projects: Vec<String>,
    /// Items from these section names are skipped.
    pub excluded_sections: Vec<String>,
}

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base folder for task notes.
    pub tasks_folder: String,
    /// Folder for project and section notes when subfolders are disabled.
    pub projects_folder: String,
    /// Mirror the remote project tree as subfolders under `tasks_folder`.
    pub use_project_subfolders: bool,
    /// Create a subfolder per section inside the project folder.
    pub use_section_subfolders: bool,
    /// Rename a task file when its title changes on the remote.
    pub auto_rename_files: bool,

    /// Conflict policy for locally-dirty notes.
    pub conflict_policy: ConflictPolicy,

    /// Handling for tasks that vanished from the active listing (completed).
    pub completed_mode: MissingRemoteMode,
    /// Destination folder for completed tasks in move-to-folder mode.
    pub completed_folder: String,
    /// Handling for tasks found in the recently-deleted set.
    pub deleted_mode: MissingRemoteMode,
    /// Destination folder for deleted tasks in move-to-folder mode.
    pub deleted_folder: String,

    /// Archive destination for project notes (and their folders).
    pub archive_projects_folder: String,
    /// Archive destination for section notes; falls back to the project
    /// archive when unset.
    pub archive_sections_folder: Option<String>,

    /// Auto-import filter.
    pub filter: ImportFilter,

    /// Frontmatter key table.
    pub props: PropNames,

    /// Templates for newly created notes; `None` uses built-in frontmatter.
    pub task_template: Option<String>,
    pub project_template: Option<String>,
    pub section_template: Option<String>,

    /// Tags stamped on every managed note.
    pub note_tags: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tasks_folder: "Tasks".to_string(),
            projects_folder: "Tasks/Projects".to_string(),
            use_project_subfolders: false,
            use_section_subfolders: false,
            auto_rename_files: true,
            conflict_policy: ConflictPolicy::LocalWins,
            completed_mode: MissingRemoteMode::KeepInPlace,
            completed_folder: "Tasks/Completed".to_string(),
            deleted_mode: MissingRemoteMode::KeepInPlace,
            deleted_folder: "Tasks/Deleted".to_string(),
            archive_projects_folder: "Archive/Projects".to_string(),
            archive_sections_folder: None,
            filter: ImportFilter::default(),
            props: PropNames::default(),
            task_template: None,
            project_template: None,
            section_template: None,
            note_tags: vec!["todoist".to_string()],
        }
    }
}

impl Settings {
    /// Archive folder for section notes, falling back to the project archive.
    pub fn section_archive_folder(&self) -> &str {
        self.archive_sections_folder
            .as_deref()
            .unwrap_or(&self.archive_projects_folder)
    }
}

//! Single-pass index over all managed files.
//!
//! Every lookup the engine does goes through ids, never paths; this is what
//! makes user renames and moves harmless. Classification rule: a note with a
//! task id is a TaskNote; otherwise a section id makes it a SectionNote even
//! when it also stores its owning project id for the back-link; otherwise a
//! project id makes it a ProjectNote.

use crate::props::{self, legacy, PropNames};
use crate::vault::{Result, Vault};
use std::collections::HashMap;
use tracing::warn;
use vault_fs::{FileSystem, Frontmatter};

/// Id-keyed maps over the vault, built once per run.
#[derive(Debug, Default)]
pub struct VaultIndex {
    /// remote task id -> note path (first-seen wins)
    pub tasks: HashMap<String, String>,
    /// remote project id -> note path
    pub projects: HashMap<String, String>,
    /// remote section id -> note path
    pub sections: HashMap<String, String>,
    /// vault uuid -> note path
    pub uuids: HashMap<String, String>,
    /// pending remote id (idempotency mark) -> note path
    pub pending: HashMap<String, String>,
    /// task ids that appeared on more than one file
    pub duplicate_task_ids: Vec<String>,
}

/// A note is managed iff it carries any remote linkage id.
pub fn is_managed(fm: &Frontmatter, p: &PropNames) -> bool {
    props::get_id(fm, &p.task_id, legacy::TASK_ID).is_some()
        || props::get_id(fm, &p.project_id, legacy::PROJECT_ID).is_some()
        || props::get_id(fm, &p.section_id, legacy::SECTION_ID).is_some()
}

impl VaultIndex {
    /// Scan all markdown files and build the id maps.
    pub async fn build<F: FileSystem>(vault: &mut Vault<F>, p: &PropNames) -> Result<Self> {
        let mut index = VaultIndex::default();

        for path in vault.list_markdown_files().await? {
            let Some(fm) = vault.read_frontmatter(&path).await? else {
                continue;
            };

            let task_id = props::get_id(&fm, &p.task_id, legacy::TASK_ID);
            let project_id = props::get_id(&fm, &p.project_id, legacy::PROJECT_ID);
            let section_id = props::get_id(&fm, &p.section_id, legacy::SECTION_ID);

            if let Some(id) = task_id {
                if index.tasks.contains_key(&id) {
                    if !index.duplicate_task_ids.contains(&id) {
                        index.duplicate_task_ids.push(id.clone());
                    }
                } else {
                    index.tasks.insert(id, path.clone());
                }
            } else if let Some(id) = section_id {
                index.sections.insert(id, path.clone());
            } else if let Some(id) = project_id {
                index.projects.insert(id, path.clone());
            }

            if let Some(pending) = props::get_id(&fm, &p.pending_id, "") {
                index.pending.insert(pending, path.clone());
            }
            if let Some(uuid) = props::get_string(&fm, &p.vault_uuid, legacy::VAULT_UUID) {
                index.uuids.insert(uuid, path.clone());
            }
        }

        index.duplicate_task_ids.sort();
        if !index.duplicate_task_ids.is_empty() {
            warn!(
                "Duplicate remote task ids in vault (first-seen wins): {}",
                index.duplicate_task_ids.join(", ")
            );
        }

        Ok(index)
    }

    /// Update every map after a file moved.
    pub fn file_moved(&mut self, from: &str, to: &str) {
        for map in [
            &mut self.tasks,
            &mut self.projects,
            &mut self.sections,
            &mut self.uuids,
            &mut self.pending,
        ] {
            for path in map.values_mut() {
                if path == from {
                    *path = to.to_string();
                }
            }
        }
    }

    /// Update every map after a folder moved (prefix rewrite).
    pub fn folder_moved(&mut self, from_folder: &str, to_folder: &str) {
        let prefix = format!("{}/", from_folder);
        for map in [
            &mut self.tasks,
            &mut self.projects,
            &mut self.sections,
            &mut self.uuids,
            &mut self.pending,
        ] {
            for path in map.values_mut() {
                if let Some(rest) = path.strip_prefix(&prefix) {
                    *path = format!("{}/{}", to_folder, rest);
                }
            }
        }
    }
}

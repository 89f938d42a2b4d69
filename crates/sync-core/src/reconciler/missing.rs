//! Missing-remote handling.
//!
//! After the pull, any indexed task id absent from the active snapshot is
//! classified: present in the recently-deleted set → deleted, otherwise →
//! completed (the active listing omits completed items). The configured
//! policy decides whether the note is marked in place, moved, or unlinked.

use super::{Result, RunSummary};
use crate::index::VaultIndex;
use crate::props::{self, legacy};
use crate::remote::RemoteSnapshot;
use crate::schema::{SyncStatus, TaskStatus};
use crate::settings::{MissingRemoteMode, Settings};
use crate::vault::{parent_folder, Vault};
use std::collections::HashSet;
use tracing::debug;
use vault_fs::FileSystem;

pub async fn apply<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    snapshot: &RemoteSnapshot,
    recently_deleted: &HashSet<String>,
    summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    let active: HashSet<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();

    let mut entries: Vec<(String, String)> = index
        .tasks
        .iter()
        .map(|(id, path)| (id.clone(), path.clone()))
        .collect();
    entries.sort();

    for (task_id, mut path) in entries {
        if active.contains(task_id.as_str()) {
            continue;
        }

        let deleted = recently_deleted.contains(&task_id);
        let mode = if deleted {
            settings.deleted_mode
        } else {
            settings.completed_mode
        };

        if deleted {
            vault
                .process_frontmatter(&path, &key_order, |fm| {
                    props::set_string(fm, &p.sync_status, "", SyncStatus::DeletedRemote.as_str());
                    props::set_bool(fm, &p.is_deleted, "", true);
                    if mode == MissingRemoteMode::StopSyncing {
                        // The note becomes local-only
                        fm.remove(&p.task_id);
                        fm.remove(legacy::TASK_ID);
                    }
                })
                .await?;

            if mode == MissingRemoteMode::MoveToFolder {
                path = move_to(vault, index, &path, &settings.deleted_folder).await?;
            }
            if mode == MissingRemoteMode::StopSyncing {
                index.tasks.remove(&task_id);
            }
            debug!("Task {} deleted on remote: {}", task_id, path);
        } else {
            vault
                .process_frontmatter(&path, &key_order, |fm| {
                    props::set_string(fm, &p.task_status, "", TaskStatus::Done.as_str());
                    props::set_bool(fm, &p.task_done, legacy::TASK_DONE, true);
                    props::set_string(fm, &p.sync_status, "", SyncStatus::ArchivedRemote.as_str());
                })
                .await?;

            if mode == MissingRemoteMode::MoveToFolder {
                path = move_to(vault, index, &path, &settings.completed_folder).await?;
            }
            debug!("Task {} completed on remote: {}", task_id, path);
        }

        summary.missing_handled += 1;
    }

    Ok(())
}

/// Move a note into a destination folder unless it is already there.
async fn move_to<F: FileSystem>(
    vault: &mut Vault<F>,
    index: &mut VaultIndex,
    path: &str,
    folder: &str,
) -> Result<String> {
    if parent_folder(path).as_deref() == Some(folder) {
        return Ok(path.to_string());
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    let desired = format!("{}/{}", folder, name);
    let target = vault.allocate_path(&desired).await?;
    vault.rename_file(path, &target).await?;
    index.file_moved(path, &target);
    Ok(target)
}

//! Archive and unarchive moves for project and section notes.
//!
//! Runs after the main reconcile, on fresh indexes. An archived project (or
//! section) moves into the configured archive folder; on unarchive the note
//! moves to its *computed* active path under the current name and parent
//! relationships, never back to a remembered pre-archive location. When a
//! project owns a folder, the whole folder moves, tasks and adopted
//! subfolders included.

use crate::index::VaultIndex;
use crate::reconciler::pull::{allocate_folder, PullContext, FOLDER_NOTE_NAME};
use crate::reconciler::{Result, RunSummary};
use crate::settings::Settings;
use crate::vault::{parent_folder, Vault};
use tracing::debug;
use vault_fs::FileSystem;

pub async fn apply_transitions<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    ctx: &PullContext<'_>,
    summary: &mut RunSummary,
) -> Result<()> {
    // Projects first: a section's active path depends on its project folder
    for project_id in &ctx.topo {
        let Some(project) = ctx.snapshot.project(project_id) else {
            continue;
        };
        let Some(path) = index.projects.get(project_id).cloned() else {
            continue;
        };

        let archive_folder = &settings.archive_projects_folder;
        let in_archive = is_under(&path, archive_folder);

        if project.is_archived && !in_archive {
            let landed = move_note(vault, index, &path, archive_folder, summary).await?;
            debug!("Archived project {}: {}", project_id, landed);
        } else if !project.is_archived && in_archive {
            let desired = ctx.project_note_path(settings, project_id);
            let landed = move_note_to_path(vault, index, &path, &desired, summary).await?;
            debug!("Unarchived project {}: {}", project_id, landed);
        }
    }

    let mut sections: Vec<_> = ctx.snapshot.sections.iter().collect();
    sections.sort_by(|a, b| (&a.project_id, &a.id).cmp(&(&b.project_id, &b.id)));

    for section in sections {
        let Some(path) = index.sections.get(&section.id).cloned() else {
            continue;
        };

        let archive_folder = settings.section_archive_folder().to_string();
        let in_archive = is_under(&path, &archive_folder);

        if section.is_archived && !in_archive {
            let landed = move_note(vault, index, &path, &archive_folder, summary).await?;
            debug!("Archived section {}: {}", section.id, landed);
        } else if !section.is_archived && in_archive {
            let desired = ctx.section_note_path(settings, &section.id);
            let landed = move_note_to_path(vault, index, &path, &desired, summary).await?;
            debug!("Unarchived section {}: {}", section.id, landed);
        }
    }

    Ok(())
}

fn is_under(path: &str, folder: &str) -> bool {
    path.starts_with(&format!("{}/", folder))
}

/// Move a note into a folder, keeping its name (or its whole folder when it
/// is a folder note).
async fn move_note<F: FileSystem>(
    vault: &mut Vault<F>,
    index: &mut VaultIndex,
    path: &str,
    dest_folder: &str,
    summary: &mut RunSummary,
) -> Result<String> {
    if let Some(own_folder) = folder_of_note(path) {
        let name = own_folder.rsplit('/').next().unwrap_or(&own_folder).to_string();
        let desired = format!("{}/{}", dest_folder, name);
        let target = allocate_folder(vault, &desired).await?;
        vault.move_folder(&own_folder, &target).await?;
        index.folder_moved(&own_folder, &target);
        summary.archive_moves += 1;
        Ok(format!("{}/{}", target, FOLDER_NOTE_NAME))
    } else {
        let name = path.rsplit('/').next().unwrap_or(path);
        let desired = format!("{}/{}", dest_folder, name);
        let target = vault.allocate_path(&desired).await?;
        vault.rename_file(path, &target).await?;
        index.file_moved(path, &target);
        summary.archive_moves += 1;
        Ok(target)
    }
}

/// Move a note to an exact computed path (unarchive).
async fn move_note_to_path<F: FileSystem>(
    vault: &mut Vault<F>,
    index: &mut VaultIndex,
    path: &str,
    desired: &str,
    summary: &mut RunSummary,
) -> Result<String> {
    if path == desired {
        return Ok(path.to_string());
    }
    match (folder_of_note(path), parent_folder(desired)) {
        (Some(own_folder), Some(desired_folder)) if desired.ends_with(FOLDER_NOTE_NAME) => {
            let target = allocate_folder(vault, &desired_folder).await?;
            vault.move_folder(&own_folder, &target).await?;
            index.folder_moved(&own_folder, &target);
            summary.archive_moves += 1;
            Ok(format!("{}/{}", target, FOLDER_NOTE_NAME))
        }
        _ => {
            let target = vault.allocate_path(desired).await?;
            vault.rename_file(path, &target).await?;
            index.file_moved(path, &target);
            summary.archive_moves += 1;
            Ok(target)
        }
    }
}

/// If the note is a folder note (`…/<folder>/_.md`), the folder it owns.
fn folder_of_note(path: &str) -> Option<String> {
    path.strip_suffix(&format!("/{}", FOLDER_NOTE_NAME))
        .map(str::to_string)
}

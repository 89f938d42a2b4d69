//! Push phase: local notes → remote.
//!
//! Creates are dispatched strictly before updates. Each create writes the
//! idempotency mark (`pending_remote_id`) the moment the remote returns an
//! id, so a crash before the final frontmatter commit leaves a note the next
//! run will skip and the pull will assimilate.

use super::{Result, RunSummary};
use crate::fingerprint::{local_sync_fingerprint, LocalSyncFields};
use crate::index::VaultIndex;
use crate::props::{self, legacy};
use crate::remote::{task_url, CreateTask, Patch, RemoteClient, TaskPatch};
use crate::schema::{format_timestamp, SyncStatus, TaskNote, TaskStatus};
use crate::settings::Settings;
use crate::vault::Vault;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use vault_fs::FileSystem;

/// A local note that qualifies for remote creation.
struct PendingCreate {
    path: String,
    note: TaskNote,
}

/// Dispatch remote creates for qualifying local notes.
///
/// A note qualifies iff it is sync-flagged, has no remote task id, carries
/// no pending mark, and has a non-empty title.
pub async fn dispatch_creates<F: FileSystem, R: RemoteClient + ?Sized>(
    vault: &mut Vault<F>,
    remote: &R,
    settings: &Settings,
    index: &mut VaultIndex,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();
    let candidates = list_pending_creates(vault, settings).await?;
    if candidates.is_empty() {
        return Ok(());
    }

    let project_ids = project_ids_by_name(vault, index, settings).await?;
    let section_ids = section_ids_by_name(vault, index, settings).await?;

    for PendingCreate { path, note } in candidates {
        let title = note.title.clone().unwrap_or_default();

        let project_id = note.project_id.clone().or_else(|| {
            note.project_name
                .as_ref()
                .and_then(|name| project_ids.get(name).cloned())
        });
        let section_id = note.section_id.clone().or_else(|| {
            match (&project_id, &note.section_name) {
                (Some(pid), Some(name)) => section_ids.get(&(pid.clone(), name.clone())).cloned(),
                _ => None,
            }
        });

        let fingerprint = local_sync_fingerprint(&LocalSyncFields {
            title: &title,
            description: note.description.as_deref().unwrap_or(""),
            is_done: note.is_done(),
            is_recurring: note.is_recurring,
            project_id: project_id.as_deref(),
            section_id: section_id.as_deref(),
            due_date: note.due_date.as_deref(),
            due_string: note.due_string.as_deref(),
        });

        let payload = CreateTask {
            content: title.clone(),
            description: note.description.clone(),
            project_id: project_id.clone(),
            section_id: section_id.clone(),
            parent_id: None,
            priority: note.priority,
            due_date: note.due_date.clone(),
            due_string: note.due_string.clone(),
            labels: note.labels.clone(),
        };

        let new_id = match remote.create_task(&payload).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to create remote task for {}: {}", path, e);
                summary.errors += 1;
                continue;
            }
        };

        // Idempotency mark, written before anything else can go wrong
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                props::set_string(fm, &p.pending_id, "", &new_id);
            })
            .await?;

        if note.is_done() {
            let patch = TaskPatch {
                id: new_id.clone(),
                is_done: Patch::Set(true),
                ..Default::default()
            };
            if let Err(e) = remote.update_task(&patch).await {
                warn!("Failed to complete just-created task {}: {}", new_id, e);
                summary.errors += 1;
            }
        }

        let done = note.is_done();
        let status = if done { TaskStatus::Done } else { TaskStatus::Open };
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                props::set_string(fm, &p.task_id, legacy::TASK_ID, &new_id);
                if let Some(pid) = &project_id {
                    props::set_string(fm, &p.project_id, legacy::PROJECT_ID, pid);
                }
                if let Some(sid) = &section_id {
                    props::set_string(fm, &p.section_id, legacy::SECTION_ID, sid);
                }
                props::set_string(fm, &p.task_status, "", status.as_str());
                props::set_bool(fm, &p.task_done, legacy::TASK_DONE, done);
                props::set_string(fm, &p.sync_status, "", SyncStatus::Synced.as_str());
                props::set_string(fm, &p.sync_signature, legacy::SYNC_SIGNATURE, &fingerprint);
                props::set_string(fm, &p.url, legacy::URL, &task_url(&new_id));
                props::set_string(fm, &p.last_imported_at, "", &format_timestamp(now));
                fm.remove(&p.pending_id);
            })
            .await?;

        debug!("Created remote task {} from {}", new_id, path);
        index.tasks.insert(new_id, path);
        summary.created_remote += 1;
    }

    Ok(())
}

/// Dispatch remote updates for locally-dirty notes.
///
/// A stale dirty mark (fingerprint equals the stored sync signature) is
/// reset to synced without a remote call.
pub async fn dispatch_updates<F: FileSystem, R: RemoteClient + ?Sized>(
    vault: &mut Vault<F>,
    remote: &R,
    settings: &Settings,
    index: &VaultIndex,
    summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    let mut entries: Vec<(String, String)> = index
        .tasks
        .iter()
        .map(|(id, path)| (id.clone(), path.clone()))
        .collect();
    entries.sort();

    for (task_id, path) in entries {
        let Some(fm) = vault.read_frontmatter(&path).await? else {
            continue;
        };
        let note = TaskNote::read(&fm, p);
        if note.sync_status != Some(SyncStatus::DirtyLocal) {
            continue;
        }

        let fingerprint = local_sync_fingerprint(&note.local_sync_fields());
        if note.sync_signature.as_deref() == Some(fingerprint.as_str()) {
            // Stale dirty mark: content matches what was last pushed
            vault
                .process_frontmatter(&path, &key_order, |fm| {
                    props::set_string(fm, &p.sync_status, "", SyncStatus::Synced.as_str());
                })
                .await?;
            summary.unchanged += 1;
            continue;
        }

        let patch = TaskPatch {
            id: task_id.clone(),
            content: Patch::Set(note.title.clone().unwrap_or_default()),
            description: Patch::from_option(note.description.clone()),
            is_done: Patch::Set(note.is_done()),
            priority: note.priority.map(Patch::Set).unwrap_or_default(),
            due_date: Patch::from_option(note.due_date.clone()),
            due_string: Patch::from_option(note.due_string.clone()),
            labels: Patch::Set(note.labels.clone()),
        };

        if let Err(e) = remote.update_task(&patch).await {
            warn!("Failed to push update for {}: {}", path, e);
            summary.errors += 1;
            continue;
        }

        // Recurring completion: record the instance being completed
        let completed_instance = (note.is_done() && note.is_recurring)
            .then(|| note.due_date.clone())
            .flatten();

        vault
            .process_frontmatter(&path, &key_order, |fm| {
                props::set_string(fm, &p.sync_status, "", SyncStatus::Synced.as_str());
                props::set_string(fm, &p.sync_signature, legacy::SYNC_SIGNATURE, &fingerprint);
                if let Some(instance) = &completed_instance {
                    let mut instances = props::get_string_list(fm, &p.complete_instances, "");
                    if !instances.contains(instance) {
                        instances.push(instance.clone());
                        props::set_string_list(fm, &p.complete_instances, "", &instances);
                    }
                }
            })
            .await?;

        debug!("Pushed update for task {}", task_id);
        summary.updated_remote += 1;
    }

    Ok(())
}

/// Enumerate qualifying notes in the active tasks folder.
async fn list_pending_creates<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
) -> Result<Vec<PendingCreate>> {
    let p = &settings.props;
    let prefix = format!("{}/", settings.tasks_folder);
    let mut pending = Vec::new();

    for path in vault.list_markdown_files().await? {
        if !path.starts_with(&prefix) {
            continue;
        }
        let Some(fm) = vault.read_frontmatter(&path).await? else {
            continue;
        };
        let note = TaskNote::read(&fm, p);
        let qualifies = note.sync_flag
            && note.task_id.is_none()
            && note.pending_id.is_none()
            && note.title.as_deref().map(|t| !t.is_empty()).unwrap_or(false);
        if qualifies {
            pending.push(PendingCreate { path, note });
        }
    }

    Ok(pending)
}

/// name → id over the vault's project notes.
async fn project_ids_by_name<F: FileSystem>(
    vault: &mut Vault<F>,
    index: &VaultIndex,
    settings: &Settings,
) -> Result<HashMap<String, String>> {
    let p = &settings.props;
    let mut map = HashMap::new();
    for (id, path) in &index.projects {
        let Some(fm) = vault.read_frontmatter(path).await? else {
            continue;
        };
        if let Some(name) = props::get_string(&fm, &p.project_name, "") {
            map.insert(name, id.clone());
        }
    }
    Ok(map)
}

/// (project id, section name) → section id over the vault's section notes.
async fn section_ids_by_name<F: FileSystem>(
    vault: &mut Vault<F>,
    index: &VaultIndex,
    settings: &Settings,
) -> Result<HashMap<(String, String), String>> {
    let p = &settings.props;
    let mut map = HashMap::new();
    for (id, path) in &index.sections {
        let Some(fm) = vault.read_frontmatter(path).await? else {
            continue;
        };
        let project = props::get_id(&fm, &p.project_id, legacy::PROJECT_ID);
        let name = props::get_string(&fm, &p.section_name, "");
        if let (Some(project), Some(name)) = (project, name) {
            map.insert((project, name), id.clone());
        }
    }
    Ok(map)
}

//! Pull phase: remote snapshot → vault.
//!
//! Projects and sections are ensured before the tasks that reference them;
//! tasks are upserted by remote id with fingerprint short-circuiting and the
//! configured conflict policy. Every path decision goes through
//! `path_policy`; every write goes through `process_frontmatter`.

use super::{Result, RunSummary};
use crate::fingerprint::{
    local_sync_fingerprint, remote_import_fingerprint, LocalSyncFields, RemoteImportFields,
};
use crate::index::VaultIndex;
use crate::path_policy;
use crate::props::{self, legacy, PropNames};
use crate::remote::{project_url, task_url, RemoteItem, RemoteSnapshot};
use crate::schema::{format_timestamp, priority_label, SyncStatus, TaskNote, TaskStatus};
use crate::settings::{ConflictPolicy, Settings};
use crate::template::{self, TemplateContext};
use crate::vault::{parent_folder, Vault};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;
use vault_fs::{FileSystem, Frontmatter};
use wiki_links::format_link;

/// Index-note file name used when a project or section owns a folder.
pub const FOLDER_NOTE_NAME: &str = "_.md";

/// Precomputed lookups for one pull.
pub struct PullContext<'a> {
    pub snapshot: &'a RemoteSnapshot,
    pub project_names: HashMap<String, String>,
    pub project_parents: HashMap<String, Option<String>>,
    /// Project ids, parents before children
    pub topo: Vec<String>,
    pub section_names: HashMap<String, String>,
    pub section_projects: HashMap<String, String>,
    /// Items to upsert: importable plus the ancestor closure, snapshot order
    pub import_items: Vec<&'a RemoteItem>,
    /// (child id, parent id) pairs among the imported items
    pub parent_pairs: Vec<(String, String)>,
}

impl<'a> PullContext<'a> {
    pub fn build(snapshot: &'a RemoteSnapshot, settings: &Settings) -> Self {
        let project_names = snapshot.project_names_by_id();
        let project_parents = snapshot.project_parents_by_id();
        let topo = path_policy::topological_order(&project_parents);
        let section_names = snapshot.section_names_by_id();
        let section_projects = snapshot.section_projects_by_id();

        let import_ids = importable_closure(snapshot, settings);
        let import_items: Vec<&RemoteItem> = snapshot
            .items
            .iter()
            .filter(|item| import_ids.contains(&item.id))
            .collect();

        let parent_pairs = import_items
            .iter()
            .filter_map(|item| {
                item.parent_id
                    .as_ref()
                    .map(|parent| (item.id.clone(), parent.clone()))
            })
            .collect();

        Self {
            snapshot,
            project_names,
            project_parents,
            topo,
            section_names,
            section_projects,
            import_items,
            parent_pairs,
        }
    }

    fn project_segments(&self, project_id: &str) -> Vec<String> {
        path_policy::project_folder_segments(
            project_id,
            &self.project_names,
            &self.project_parents,
            &self.topo,
        )
    }

    fn section_segment(&self, section_id: &str) -> String {
        path_policy::disambiguated_section_segment(
            section_id,
            &self.section_names,
            &self.section_projects,
        )
    }

    /// The folder a task belongs in, given current settings.
    fn task_folder(&self, settings: &Settings, item: &RemoteItem) -> String {
        if !settings.use_project_subfolders {
            return settings.tasks_folder.clone();
        }
        let segments = item
            .project_id
            .as_deref()
            .map(|pid| self.project_segments(pid))
            .unwrap_or_default();
        let section = match (&item.section_id, settings.use_section_subfolders) {
            (Some(sid), true) => Some(self.section_segment(sid)),
            _ => None,
        };
        path_policy::task_folder(&settings.tasks_folder, &segments, section.as_deref())
    }

    /// Desired path for a project note.
    pub fn project_note_path(&self, settings: &Settings, project_id: &str) -> String {
        if settings.use_project_subfolders {
            let folder = path_policy::task_folder(
                &settings.tasks_folder,
                &self.project_segments(project_id),
                None,
            );
            format!("{}/{}", folder, FOLDER_NOTE_NAME)
        } else {
            let segment =
                path_policy::disambiguated_project_segment(project_id, &self.project_names, &self.topo);
            format!("{}/{}.md", settings.projects_folder, segment)
        }
    }

    /// Desired path for a section note.
    pub fn section_note_path(&self, settings: &Settings, section_id: &str) -> String {
        let section_segment = self.section_segment(section_id);
        let project_id = self.section_projects.get(section_id);

        if settings.use_project_subfolders {
            let segments = project_id
                .map(|pid| self.project_segments(pid))
                .unwrap_or_default();
            let project_folder =
                path_policy::task_folder(&settings.tasks_folder, &segments, None);
            if settings.use_section_subfolders {
                format!("{}/{}/{}", project_folder, section_segment, FOLDER_NOTE_NAME)
            } else {
                format!("{}/{}.md", project_folder, section_segment)
            }
        } else {
            let project_segment = project_id
                .map(|pid| {
                    path_policy::disambiguated_project_segment(pid, &self.project_names, &self.topo)
                })
                .unwrap_or_else(|| "Untitled".to_string());
            format!(
                "{}/{} - {}.md",
                settings.projects_folder, project_segment, section_segment
            )
        }
    }
}

/// Apply the importable filter, then close over transitive parents so no
/// imported child orphans.
fn importable_closure(snapshot: &RemoteSnapshot, settings: &Settings) -> HashSet<String> {
    let filter = &settings.filter;
    let by_id: HashMap<&str, &RemoteItem> = snapshot
        .items
        .iter()
        .map(|item| (item.id.as_str(), item))
        .collect();

    let passes = |item: &RemoteItem| -> bool {
        if item.is_deleted {
            return false;
        }
        if filter.assigned_to_me_only {
            if let Some(uid) = &item.responsible_uid {
                if *uid != snapshot.user_id {
                    return false;
                }
            }
        }
        if !filter.required_labels.is_empty()
            && !item.labels.iter().any(|l| filter.required_labels.contains(l))
        {
            return false;
        }
        if item.labels.iter().any(|l| filter.excluded_labels.contains(l)) {
            return false;
        }
        let project_name = item
            .project_id
            .as_deref()
            .and_then(|pid| snapshot.project_name(pid));
        if let Some(name) = project_name {
            if !filter.allowed_projects.is_empty()
                && !filter.allowed_projects.iter().any(|p| p == name)
            {
                return false;
            }
            if filter.excluded_projects.iter().any(|p| p == name) {
                return false;
            }
        }
        if let Some(name) = item
            .section_id
            .as_deref()
            .and_then(|sid| snapshot.section_name(sid))
        {
            if filter.excluded_sections.iter().any(|s| s == name) {
                return false;
            }
        }
        true
    };

    let mut selected: HashSet<String> = snapshot
        .items
        .iter()
        .filter(|item| passes(item))
        .map(|item| item.id.clone())
        .collect();

    // Ancestor closure: walk parent chains of everything selected
    let roots: Vec<String> = selected.iter().cloned().collect();
    for id in roots {
        let mut current = by_id.get(id.as_str()).and_then(|i| i.parent_id.clone());
        let mut hops = 0;
        while let Some(parent_id) = current {
            if hops > snapshot.items.len() || !selected.insert(parent_id.clone()) {
                break;
            }
            hops += 1;
            current = by_id
                .get(parent_id.as_str())
                .and_then(|i| i.parent_id.clone());
        }
    }

    selected
}

/// Ensure a ProjectNote exists and is current for every active project.
pub async fn ensure_project_notes<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    ctx: &PullContext<'_>,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    for project_id in &ctx.topo {
        let Some(project) = ctx.snapshot.project(project_id) else {
            continue;
        };
        if project.is_archived {
            continue;
        }

        let desired = ctx.project_note_path(settings, project_id);
        let path = match index.projects.get(project_id).cloned() {
            Some(current) => {
                relocate_container_note(vault, settings, index, &current, &desired, summary).await?
            }
            None => {
                let target = vault.allocate_path(&desired).await?;
                let template_ctx = project_note_context(ctx, index, project_id);
                create_templated_note(
                    vault,
                    &target,
                    settings.project_template.as_deref(),
                    template_ctx,
                    now,
                    &key_order,
                )
                .await?;
                index.projects.insert(project_id.clone(), target.clone());
                debug!("Created project note {}", target);
                target
            }
        };

        // Hydration: the identity contract holds regardless of template output
        let name = project.name.clone();
        let color = project.color.clone();
        let url = project_url(project_id);
        let stamp = format_timestamp(now);
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                hydrate_common(fm, p, &settings.note_tags, &stamp);
                props::set_string(fm, &p.project_name, "", &name);
                props::set_string(fm, &p.project_id, legacy::PROJECT_ID, project_id);
                props::set_string(fm, &p.url, legacy::URL, &url);
                props::set_opt_string(fm, &p.color, "", color.as_deref());
            })
            .await?;
    }

    // Parent wikilinks, after every project note has settled at its path
    for project_id in &ctx.topo {
        let Some(parent_id) = ctx.project_parents.get(project_id).cloned().flatten() else {
            continue;
        };
        let (Some(path), Some(parent_path)) = (
            index.projects.get(project_id).cloned(),
            index.projects.get(&parent_id).cloned(),
        ) else {
            continue;
        };
        let parent_name = ctx
            .project_names
            .get(&parent_id)
            .cloned()
            .unwrap_or_default();
        let link = format_link(&parent_path, &parent_name);
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                props::set_string(fm, &p.parent_project_link, "", &link);
                props::set_string(fm, &p.parent_project_name, "", &parent_name);
            })
            .await?;
    }

    Ok(())
}

/// Ensure a SectionNote exists and is current for every active section.
pub async fn ensure_section_notes<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    ctx: &PullContext<'_>,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    let mut sections: Vec<_> = ctx.snapshot.sections.iter().collect();
    sections.sort_by(|a, b| (&a.project_id, &a.id).cmp(&(&b.project_id, &b.id)));

    for section in sections {
        if section.is_archived {
            continue;
        }

        let desired = ctx.section_note_path(settings, &section.id);
        let path = match index.sections.get(&section.id).cloned() {
            Some(current) => {
                relocate_container_note(vault, settings, index, &current, &desired, summary).await?
            }
            None => {
                let target = vault.allocate_path(&desired).await?;
                let template_ctx = section_note_context(ctx, index, &section.id);
                create_templated_note(
                    vault,
                    &target,
                    settings.section_template.as_deref(),
                    template_ctx,
                    now,
                    &key_order,
                )
                .await?;
                index.sections.insert(section.id.clone(), target.clone());
                debug!("Created section note {}", target);
                target
            }
        };

        let project_name = ctx
            .project_names
            .get(&section.project_id)
            .cloned()
            .unwrap_or_default();
        // Rename detection includes staleness of the project wikilink: the
        // link is recomputed from the project's current path every run.
        let project_link = index
            .projects
            .get(&section.project_id)
            .map(|target| format_link(target, &project_name));
        let name = section.name.clone();
        let project_id = section.project_id.clone();
        let stamp = format_timestamp(now);
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                hydrate_common(fm, p, &settings.note_tags, &stamp);
                props::set_string(fm, &p.section_name, "", &name);
                props::set_string(fm, &p.section_id, legacy::SECTION_ID, &section.id);
                props::set_string(fm, &p.project_name, "", &project_name);
                props::set_string(fm, &p.project_id, legacy::PROJECT_ID, &project_id);
                props::set_opt_string(fm, &p.project_link, "", project_link.as_deref());
            })
            .await?;
    }

    Ok(())
}

/// Move a project/section note (or its folder) toward its desired path.
///
/// Notes sitting under an archive folder are left alone; the archive mover
/// owns those transitions.
async fn relocate_container_note<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    current: &str,
    desired: &str,
    summary: &mut RunSummary,
) -> Result<String> {
    if current == desired {
        return Ok(current.to_string());
    }
    let archive_prefix = format!("{}/", settings.archive_projects_folder);
    let section_archive_prefix = format!("{}/", settings.section_archive_folder());
    if current.starts_with(&archive_prefix) || current.starts_with(&section_archive_prefix) {
        return Ok(current.to_string());
    }

    let folder_note = current.ends_with(&format!("/{}", FOLDER_NOTE_NAME))
        && desired.ends_with(&format!("/{}", FOLDER_NOTE_NAME));

    if folder_note {
        let (Some(from_folder), Some(to_folder)) = (parent_folder(current), parent_folder(desired))
        else {
            return Ok(current.to_string());
        };
        let target_folder = allocate_folder(vault, &to_folder).await?;
        vault.move_folder(&from_folder, &target_folder).await?;
        index.folder_moved(&from_folder, &target_folder);
        summary.relocated += 1;
        debug!("Moved folder {} -> {}", from_folder, target_folder);
        Ok(format!("{}/{}", target_folder, FOLDER_NOTE_NAME))
    } else {
        let target = vault.allocate_path(desired).await?;
        vault.rename_file(current, &target).await?;
        index.file_moved(current, &target);
        summary.relocated += 1;
        debug!("Moved note {} -> {}", current, target);
        Ok(target)
    }
}

/// Find a free folder path by appending `-2`, `-3`, …
pub async fn allocate_folder<F: FileSystem>(vault: &Vault<F>, desired: &str) -> Result<String> {
    if !vault.exists(desired).await? {
        return Ok(desired.to_string());
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{}-{}", desired, counter);
        if !vault.exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Upsert one remote item into the vault.
pub async fn upsert_task<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    ctx: &PullContext<'_>,
    item: &RemoteItem,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    let project_name = item
        .project_id
        .as_deref()
        .and_then(|pid| ctx.project_names.get(pid))
        .cloned();
    let section_name = item
        .section_id
        .as_deref()
        .and_then(|sid| ctx.section_names.get(sid))
        .cloned();

    let due = item.due.as_ref();
    let import_fp = remote_import_fingerprint(&RemoteImportFields {
        title: &item.content,
        description: &item.description,
        checked: item.checked,
        project_id: item.project_id.as_deref(),
        project_name: project_name.as_deref(),
        section_id: item.section_id.as_deref(),
        section_name: section_name.as_deref(),
        priority: item.priority,
        due_date: due.and_then(|d| d.date.as_deref()),
        due_string: due.and_then(|d| d.string.as_deref()),
        is_recurring: due.map(|d| d.is_recurring).unwrap_or(false),
        parent_id: item.parent_id.as_deref(),
        labels: &item.labels,
        deadline: item.deadline.as_ref().map(|d| d.date.as_str()),
    });

    let project_link = item
        .project_id
        .as_deref()
        .and_then(|pid| index.projects.get(pid))
        .map(|path| format_link(path, project_name.as_deref().unwrap_or("")));
    let section_link = item
        .section_id
        .as_deref()
        .and_then(|sid| index.sections.get(sid))
        .map(|path| format_link(path, section_name.as_deref().unwrap_or("")));

    // Match by remote id first, then by the pending mark (crash assimilation)
    let existing = index
        .tasks
        .get(&item.id)
        .cloned()
        .or_else(|| index.pending.get(&item.id).cloned());

    let Some(path) = existing else {
        create_task_note(
            vault, settings, index, ctx, item, &import_fp, project_name.as_deref(),
            section_name.as_deref(), project_link.as_deref(), section_link.as_deref(), now,
        )
        .await?;
        summary.imported_new += 1;
        return Ok(());
    };

    let Some(fm) = vault.read_frontmatter(&path).await? else {
        return Ok(());
    };
    let note = TaskNote::read(&fm, p);
    let assimilating = note.task_id.is_none();

    if !assimilating && note.import_signature.as_deref() == Some(import_fp.as_str()) {
        // Unchanged on the remote: only verify the wikilinks still point at
        // the current project/section note paths.
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                props::set_opt_string(fm, &p.project_link, "", project_link.as_deref());
                props::set_opt_string(fm, &p.section_link, "", section_link.as_deref());
            })
            .await?;
        summary.unchanged += 1;
        return Ok(());
    }

    let dirty = note.sync_status == Some(SyncStatus::DirtyLocal);
    let local_wins = dirty && settings.conflict_policy == ConflictPolicy::LocalWins;

    let is_recurring = due.map(|d| d.is_recurring).unwrap_or(false);
    let new_due = due.and_then(|d| d.date.clone());
    let new_due_string = due.and_then(|d| d.string.clone());

    // Recurring completion observed remotely: the due date advanced, so the
    // previous instance was completed. Record it exactly once.
    let completed_instance = if is_recurring && !local_wins {
        match (&note.due_date, &new_due) {
            (Some(prev), Some(next)) if due_advanced(prev, next) => {
                (!note.complete_instances.contains(prev)).then(|| prev.clone())
            }
            _ => None,
        }
    } else {
        None
    };

    let url = task_url(&item.id);
    let stamp = format_timestamp(now);
    let labels = item.labels.clone();
    let title = item.content.clone();
    let description = item.description.clone();
    let checked = item.checked;
    let priority = item.priority;
    let deadline = item.deadline.as_ref().map(|d| d.date.clone());
    let parent_cleared = item.parent_id.is_none();
    let sync_fp = local_sync_fingerprint(&LocalSyncFields {
        title: &item.content,
        description: &item.description,
        is_done: checked,
        is_recurring,
        project_id: item.project_id.as_deref(),
        section_id: item.section_id.as_deref(),
        due_date: new_due.as_deref(),
        due_string: new_due_string.as_deref(),
    });
    let item_id = item.id.clone();
    let project_id = item.project_id.clone();
    let section_id = item.section_id.clone();
    let project_name_cl = project_name.clone();
    let section_name_cl = section_name.clone();

    vault
        .process_frontmatter(&path, &key_order, move |fm| {
            // Remote-owned metadata is written under either policy
            props::set_string(fm, &p.task_id, legacy::TASK_ID, &item_id);
            fm.remove(&p.pending_id);
            props::set_opt_string(fm, &p.project_id, legacy::PROJECT_ID, project_id.as_deref());
            props::set_opt_string(fm, &p.project_name, "", project_name_cl.as_deref());
            props::set_opt_string(fm, &p.project_link, "", project_link.as_deref());
            props::set_opt_string(fm, &p.section_id, legacy::SECTION_ID, section_id.as_deref());
            props::set_opt_string(fm, &p.section_name, "", section_name_cl.as_deref());
            props::set_opt_string(fm, &p.section_link, "", section_link.as_deref());
            props::set_string_list(fm, &p.labels, "", &labels);
            props::set_string(fm, &p.url, legacy::URL, &url);
            if parent_cleared {
                fm.remove(&p.parent_task_link);
            }
            props::set_string(fm, &p.import_signature, legacy::IMPORT_SIGNATURE, &import_fp);
            props::set_string(fm, &p.last_imported_at, "", &stamp);

            if local_wins {
                // User-editable fields stay; the next push sends them out
                return;
            }

            if let Some(instance) = &completed_instance {
                let mut instances = props::get_string_list(fm, &p.complete_instances, "");
                instances.push(instance.clone());
                props::set_string_list(fm, &p.complete_instances, "", &instances);
            }

            props::set_string(fm, &p.task_title, legacy::TASK_TITLE, &title);
            let status = if checked { TaskStatus::Done } else { TaskStatus::Open };
            props::set_string(fm, &p.task_status, "", status.as_str());
            props::set_bool(fm, &p.task_done, legacy::TASK_DONE, status.is_done());
            props::set_i64(fm, &p.priority, "", priority);
            props::set_string(fm, &p.priority_label, "", &priority_label(priority));
            props::set_opt_string(fm, &p.due_date, legacy::DUE_DATE, new_due.as_deref());
            props::set_opt_string(fm, &p.due_string, "", new_due_string.as_deref());
            props::set_bool(fm, &p.is_recurring, legacy::IS_RECURRING, is_recurring);
            if is_recurring {
                // The recurrence rule is written once and kept verbatim
                if props::get_string(fm, &p.recurrence, "").is_none() {
                    if let Some(rule) = new_due_string.as_deref() {
                        props::set_string(fm, &p.recurrence, "", rule);
                    }
                }
            } else {
                fm.remove(&p.recurrence);
            }
            props::set_opt_string(fm, &p.deadline, "", deadline.as_deref());
            if description.is_empty() {
                fm.remove(&p.description);
            } else {
                props::set_string(fm, &p.description, "", &description);
            }
            props::set_string(fm, &p.sync_status, "", SyncStatus::Synced.as_str());
            props::set_string(fm, &p.sync_signature, legacy::SYNC_SIGNATURE, &sync_fp);
        })
        .await?;

    if assimilating {
        index.pending.remove(&item.id);
        index.tasks.insert(item.id.clone(), path.clone());
        debug!("Assimilated pending note {} as task {}", path, item.id);
    }

    relocate_task_note(vault, settings, index, ctx, item, &path, &note, summary).await?;
    summary.imported_updated += 1;
    Ok(())
}

/// Both dates ISO `YYYY-MM-DD`; true when `next` is strictly later.
fn due_advanced(prev: &str, next: &str) -> bool {
    match (
        NaiveDate::parse_from_str(prev, "%Y-%m-%d"),
        NaiveDate::parse_from_str(next, "%Y-%m-%d"),
    ) {
        (Ok(prev), Ok(next)) => next > prev,
        _ => false,
    }
}

/// Create a fresh task note from a remote item.
#[allow(clippy::too_many_arguments)]
async fn create_task_note<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    ctx: &PullContext<'_>,
    item: &RemoteItem,
    import_fp: &str,
    project_name: Option<&str>,
    section_name: Option<&str>,
    project_link: Option<&str>,
    section_link: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    let folder = ctx.task_folder(settings, item);
    let candidate = format!("{}/{}", folder, path_policy::task_file_name(&item.content));

    // Collision at the candidate path: suffix with the remote id, then fall
    // back to the numeric allocator.
    let path = if !vault.exists(&candidate).await? {
        candidate
    } else {
        let stem = candidate.strip_suffix(".md").unwrap_or(&candidate);
        let with_id = format!("{}-{}.md", stem, item.id);
        vault.allocate_path(&with_id).await?
    };

    if let Some(template) = settings.task_template.as_deref() {
        let body = template::resolve(
            template,
            now,
            &task_note_context(ctx, settings, item, project_link, section_link, now),
        );
        vault.ensure_folder(&folder).await?;
        vault.fs().write(&path, body.as_bytes()).await.map_err(crate::vault::VaultError::from)?;
        vault.invalidate(&path);
    } else {
        vault
            .create_note(&path, &Frontmatter::new(), "", &key_order)
            .await?;
    }

    let due = item.due.as_ref();
    let is_recurring = due.map(|d| d.is_recurring).unwrap_or(false);
    let new_due = due.and_then(|d| d.date.clone());
    let new_due_string = due.and_then(|d| d.string.clone());
    let status = if item.checked { TaskStatus::Done } else { TaskStatus::Open };
    let uuid = Uuid::new_v4().to_string();
    let stamp = format_timestamp(now);
    let url = task_url(&item.id);
    let sync_fp = local_sync_fingerprint(&LocalSyncFields {
        title: &item.content,
        description: &item.description,
        is_done: item.checked,
        is_recurring,
        project_id: item.project_id.as_deref(),
        section_id: item.section_id.as_deref(),
        due_date: new_due.as_deref(),
        due_string: new_due_string.as_deref(),
    });

    // Hydration: identity, linkage, and signature fields are enforced even
    // when a template rendered the file.
    vault
        .process_frontmatter(&path, &key_order, |fm| {
            if props::get_string(fm, &p.vault_uuid, legacy::VAULT_UUID).is_none() {
                props::set_string(fm, &p.vault_uuid, legacy::VAULT_UUID, &uuid);
            }
            if props::get_string(fm, &p.created, "").is_none() {
                props::set_string(fm, &p.created, "", &stamp);
            }
            props::set_string(fm, &p.modified, "", &stamp);
            props::set_string_list(fm, &p.tags, "", &settings.note_tags);

            props::set_string(fm, &p.task_title, legacy::TASK_TITLE, &item.content);
            props::set_string(fm, &p.task_status, "", status.as_str());
            props::set_bool(fm, &p.task_done, legacy::TASK_DONE, status.is_done());
            props::set_i64(fm, &p.priority, "", item.priority);
            props::set_string(fm, &p.priority_label, "", &priority_label(item.priority));
            props::set_opt_string(fm, &p.due_date, legacy::DUE_DATE, new_due.as_deref());
            props::set_opt_string(fm, &p.due_string, "", new_due_string.as_deref());
            props::set_bool(fm, &p.is_recurring, legacy::IS_RECURRING, is_recurring);
            if is_recurring {
                if let Some(rule) = new_due_string.as_deref() {
                    props::set_string(fm, &p.recurrence, "", rule);
                }
            }
            props::set_opt_string(
                fm,
                &p.deadline,
                "",
                item.deadline.as_ref().map(|d| d.date.as_str()),
            );
            if !item.description.is_empty() {
                props::set_string(fm, &p.description, "", &item.description);
            }
            props::set_string_list(fm, &p.labels, "", &item.labels);

            props::set_string(fm, &p.task_id, legacy::TASK_ID, &item.id);
            props::set_opt_string(fm, &p.project_id, legacy::PROJECT_ID, item.project_id.as_deref());
            props::set_opt_string(fm, &p.project_name, "", project_name);
            props::set_opt_string(fm, &p.project_link, "", project_link);
            props::set_opt_string(fm, &p.section_id, legacy::SECTION_ID, item.section_id.as_deref());
            props::set_opt_string(fm, &p.section_name, "", section_name);
            props::set_opt_string(fm, &p.section_link, "", section_link);
            props::set_string(fm, &p.url, legacy::URL, &url);

            props::set_bool(fm, &p.sync_flag, legacy::SYNC_FLAG, true);
            props::set_string(fm, &p.sync_status, "", SyncStatus::Synced.as_str());
            props::set_string(fm, &p.import_signature, legacy::IMPORT_SIGNATURE, import_fp);
            props::set_string(fm, &p.sync_signature, legacy::SYNC_SIGNATURE, &sync_fp);
            props::set_string(fm, &p.last_imported_at, "", &stamp);
        })
        .await?;

    index.tasks.insert(item.id.clone(), path.clone());
    debug!("Imported task {} -> {}", item.id, path);
    Ok(())
}

/// Post-update relocation: rename on title change, move on folder change.
async fn relocate_task_note<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &mut VaultIndex,
    ctx: &PullContext<'_>,
    item: &RemoteItem,
    path: &str,
    before: &TaskNote,
    summary: &mut RunSummary,
) -> Result<()> {
    let mut current = path.to_string();

    if settings.auto_rename_files {
        let title_changed = before.title.as_deref() != Some(item.content.as_str());
        if title_changed {
            let folder = parent_folder(&current).unwrap_or_default();
            let desired = format!("{}/{}", folder, path_policy::task_file_name(&item.content));
            if desired != current {
                let target = vault.allocate_path(&desired).await?;
                vault.rename_file(&current, &target).await?;
                index.file_moved(&current, &target);
                summary.relocated += 1;
                current = target;
            }
        }
    }

    if settings.use_project_subfolders {
        let desired_folder = ctx.task_folder(settings, item);
        if parent_folder(&current).as_deref() != Some(desired_folder.as_str()) {
            let name = current.rsplit('/').next().unwrap_or(&current).to_string();
            let desired = format!("{}/{}", desired_folder, name);
            let target = vault.allocate_path(&desired).await?;
            vault.rename_file(&current, &target).await?;
            index.file_moved(&current, &target);
            summary.relocated += 1;
        }
    }

    Ok(())
}

/// Write a template-rendered note, then return (hydration happens upstream).
async fn create_templated_note<F: FileSystem>(
    vault: &mut Vault<F>,
    path: &str,
    template: Option<&str>,
    ctx: TemplateContext,
    now: DateTime<Utc>,
    key_order: &[&str],
) -> Result<()> {
    match template {
        Some(template) => {
            let content = template::resolve(template, now, &ctx);
            if let Some(parent) = parent_folder(path) {
                vault.ensure_folder(&parent).await?;
            }
            vault
                .fs()
                .write(path, content.as_bytes())
                .await
                .map_err(crate::vault::VaultError::from)?;
            vault.invalidate(path);
        }
        None => {
            vault.create_note(path, &Frontmatter::new(), "", key_order).await?;
        }
    }
    Ok(())
}

/// Identity fields shared by project and section notes. Timestamps and the
/// uuid are write-once; tags are normalized every run.
fn hydrate_common(fm: &mut Frontmatter, p: &PropNames, tags: &[String], stamp: &str) {
    if props::get_string(fm, &p.vault_uuid, legacy::VAULT_UUID).is_none() {
        props::set_string(fm, &p.vault_uuid, legacy::VAULT_UUID, &Uuid::new_v4().to_string());
    }
    if props::get_string(fm, &p.created, "").is_none() {
        props::set_string(fm, &p.created, "", stamp);
    }
    if props::get_string(fm, &p.modified, "").is_none() {
        props::set_string(fm, &p.modified, "", stamp);
    }
    props::set_string_list(fm, &p.tags, "", tags);
}

fn project_note_context(
    ctx: &PullContext<'_>,
    index: &VaultIndex,
    project_id: &str,
) -> TemplateContext {
    let name = ctx.project_names.get(project_id).cloned().unwrap_or_default();
    let parent_link = ctx
        .project_parents
        .get(project_id)
        .cloned()
        .flatten()
        .and_then(|parent_id| {
            let path = index.projects.get(&parent_id)?;
            let parent_name = ctx.project_names.get(&parent_id).cloned().unwrap_or_default();
            Some(format_link(path, &parent_name))
        })
        .unwrap_or_default();
    TemplateContext::new()
        .with("project_name", name)
        .with("project_id", project_id)
        .with("parent_project_link", parent_link)
        .with("url", project_url(project_id))
}

fn section_note_context(
    ctx: &PullContext<'_>,
    index: &VaultIndex,
    section_id: &str,
) -> TemplateContext {
    let name = ctx.section_names.get(section_id).cloned().unwrap_or_default();
    let project_id = ctx
        .section_projects
        .get(section_id)
        .cloned()
        .unwrap_or_default();
    let project_name = ctx.project_names.get(&project_id).cloned().unwrap_or_default();
    let project_link = index
        .projects
        .get(&project_id)
        .map(|path| format_link(path, &project_name))
        .unwrap_or_default();
    TemplateContext::new()
        .with("section_name", name)
        .with("section_id", section_id)
        .with("project_name", project_name)
        .with("project_link", project_link)
        .with("url", project_url(&project_id))
        .with("project_id", project_id)
}

fn task_note_context(
    ctx: &PullContext<'_>,
    settings: &Settings,
    item: &RemoteItem,
    project_link: Option<&str>,
    section_link: Option<&str>,
    now: DateTime<Utc>,
) -> TemplateContext {
    let due = item.due.as_ref();
    let project_name = item
        .project_id
        .as_deref()
        .and_then(|pid| ctx.project_names.get(pid))
        .cloned()
        .unwrap_or_default();
    let section_name = item
        .section_id
        .as_deref()
        .and_then(|sid| ctx.section_names.get(sid))
        .cloned()
        .unwrap_or_default();
    TemplateContext::new()
        .with("title", item.content.clone())
        .with("description", item.description.clone())
        .with("due_date", due.and_then(|d| d.date.clone()).unwrap_or_default())
        .with("due_string", due.and_then(|d| d.string.clone()).unwrap_or_default())
        .with(
            "deadline_date",
            item.deadline.as_ref().map(|d| d.date.clone()).unwrap_or_default(),
        )
        .with("priority", item.priority.to_string())
        .with("priority_label", priority_label(item.priority))
        .with("project", project_name)
        .with("project_id", item.project_id.clone().unwrap_or_default())
        .with("section", section_name)
        .with("section_id", item.section_id.clone().unwrap_or_default())
        .with("todoist_id", item.id.clone())
        .with("url", task_url(&item.id))
        .with("tags", settings.note_tags.join(", "))
        .with("created", format_timestamp(now))
        .with("project_link", project_link.unwrap_or_default())
        .with("section_link", section_link.unwrap_or_default())
        // Parent links are applied by the back-link pass after creation
        .with("parent_task_link", "")
}

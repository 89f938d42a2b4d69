//! Parent/child cross-links over the task forest.
//!
//! Two passes over the id → path map using the parent pairs collected during
//! the pull: forward (each child points at its parent) and reverse (each
//! parent lists its sorted children). Files in terminal states are skipped;
//! the remote no longer owns them and a spurious write would dirty them.

use super::{Result, RunSummary};
use crate::index::VaultIndex;
use crate::props;
use crate::reconciler::pull::PullContext;
use crate::schema::TaskNote;
use crate::settings::Settings;
use crate::vault::Vault;
use std::collections::{BTreeMap, HashSet};
use vault_fs::FileSystem;
use wiki_links::format_link;

/// Apply parent links and child metadata after all upserts settled.
pub async fn apply<F: FileSystem>(
    vault: &mut Vault<F>,
    settings: &Settings,
    index: &VaultIndex,
    ctx: &PullContext<'_>,
    _summary: &mut RunSummary,
) -> Result<()> {
    let p = &settings.props;
    let key_order = p.key_order();

    // Forward: child -> parent wikilink
    for (child_id, parent_id) in &ctx.parent_pairs {
        let (Some(child_path), Some(parent_path)) = (
            index.tasks.get(child_id).cloned(),
            index.tasks.get(parent_id).cloned(),
        ) else {
            continue;
        };
        if is_terminal(vault, &child_path, settings).await? {
            continue;
        }
        let parent_title = note_title(vault, &parent_path, settings).await?;
        let link = format_link(&parent_path, &parent_title);
        vault
            .process_frontmatter(&child_path, &key_order, |fm| {
                props::set_string(fm, &p.parent_task_link, "", &link);
            })
            .await?;
    }

    // Reverse: parent -> sorted child link list
    let mut children_by_parent: BTreeMap<&String, Vec<String>> = BTreeMap::new();
    for (child_id, parent_id) in &ctx.parent_pairs {
        let Some(child_path) = index.tasks.get(child_id) else {
            continue;
        };
        let title = note_title(vault, child_path, settings).await?;
        children_by_parent
            .entry(parent_id)
            .or_default()
            .push(format_link(child_path, &title));
    }

    let parents_with_children: HashSet<&String> = children_by_parent.keys().copied().collect();

    for (parent_id, mut links) in children_by_parent.clone() {
        let Some(parent_path) = index.tasks.get(parent_id).cloned() else {
            continue;
        };
        if is_terminal(vault, &parent_path, settings).await? {
            continue;
        }
        links.sort();
        let count = links.len() as i64;
        vault
            .process_frontmatter(&parent_path, &key_order, |fm| {
                props::set_string_list(fm, &p.child_tasks, "", &links);
                props::set_bool(fm, &p.has_children, "", true);
                props::set_i64(fm, &p.child_count, "", count);
            })
            .await?;
    }

    // Tasks that stopped being parents lose their child metadata
    let mut entries: Vec<(&String, &String)> = index.tasks.iter().collect();
    entries.sort();
    for (task_id, path) in entries {
        if parents_with_children.contains(task_id) {
            continue;
        }
        let Some(fm) = vault.read_frontmatter(path).await? else {
            continue;
        };
        let had_children = props::get_bool(&fm, &p.has_children, "").unwrap_or(false);
        if !had_children {
            continue;
        }
        let path = path.clone();
        if is_terminal(vault, &path, settings).await? {
            continue;
        }
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                fm.remove(&p.child_tasks);
                fm.remove(&p.has_children);
                fm.remove(&p.child_count);
            })
            .await?;
    }

    Ok(())
}

async fn is_terminal<F: FileSystem>(
    vault: &mut Vault<F>,
    path: &str,
    settings: &Settings,
) -> Result<bool> {
    let Some(fm) = vault.read_frontmatter(path).await? else {
        return Ok(false);
    };
    let note = TaskNote::read(&fm, &settings.props);
    Ok(note.sync_status.map(|s| s.is_terminal()).unwrap_or(false))
}

async fn note_title<F: FileSystem>(
    vault: &mut Vault<F>,
    path: &str,
    settings: &Settings,
) -> Result<String> {
    let Some(fm) = vault.read_frontmatter(path).await? else {
        return Ok(String::new());
    };
    Ok(TaskNote::read(&fm, &settings.props).title.unwrap_or_default())
}

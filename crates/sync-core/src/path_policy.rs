//! Deterministic folder and file naming for task, project, and section notes.
//!
//! Pure functions over id-keyed maps. The project parent chain can contain
//! cycles (the remote should prevent them, corrupted data happens anyway);
//! every walk here detects them and produces a finite result with a warning.

use std::collections::HashMap;
use tracing::warn;

/// Display-character cap for a single path segment.
const MAX_SEGMENT_CHARS: usize = 80;

/// Fallback segment for empty or fully-stripped names.
const UNTITLED: &str = "Untitled";

/// Strip path-reserved characters, collapse whitespace, trim, and truncate.
///
/// Reserved set covers filesystem separators and Obsidian link syntax:
/// `\ / : * ? " < > | # ^ [ ]`.
pub fn sanitize(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '^' | '[' | ']'))
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_SEGMENT_CHARS).collect();
    let trimmed = truncated.trim().to_string();

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed
    }
}

/// Short suffix derived from an identifier, for name disambiguation.
fn short_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let start = chars.len().saturating_sub(6);
    chars[start..].iter().collect()
}

/// Order project ids so parents precede children.
///
/// Projects form a DAG under parent id; a cycle is broken at the first
/// back-edge encountered, deterministically (ids are visited in sorted
/// order). Returns every id exactly once.
pub fn topological_order(parent_by_id: &HashMap<String, Option<String>>) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        Visiting,
        Done,
    }

    fn visit(
        id: &str,
        parent_by_id: &HashMap<String, Option<String>>,
        state: &mut HashMap<String, State>,
        order: &mut Vec<String>,
    ) {
        match state.get(id).copied().unwrap_or(State::Unvisited) {
            State::Done => return,
            State::Visiting => {
                warn!("Project parent chain contains a cycle at {}", id);
                return;
            }
            State::Unvisited => {}
        }
        state.insert(id.to_string(), State::Visiting);
        if let Some(Some(parent)) = parent_by_id.get(id) {
            if parent_by_id.contains_key(parent) {
                visit(parent, parent_by_id, state, order);
            }
        }
        state.insert(id.to_string(), State::Done);
        order.push(id.to_string());
    }

    let mut ids: Vec<&String> = parent_by_id.keys().collect();
    ids.sort();

    let mut state = HashMap::new();
    let mut order = Vec::new();
    for id in ids {
        visit(id, parent_by_id, &mut state, &mut order);
    }
    order
}

/// Disambiguated folder segment for one project.
///
/// When several projects share a sanitized name, the first in topological
/// order keeps the plain name and the rest get a `-<id tail>` suffix.
pub fn disambiguated_project_segment(
    project_id: &str,
    names_by_id: &HashMap<String, String>,
    topo_order: &[String],
) -> String {
    let name = sanitize(names_by_id.get(project_id).map(String::as_str).unwrap_or(""));

    let first_with_name = topo_order.iter().find(|id| {
        names_by_id
            .get(*id)
            .map(|n| sanitize(n) == name)
            .unwrap_or(false)
    });

    match first_with_name {
        Some(first) if first != project_id => format!("{}-{}", name, short_id(project_id)),
        _ => name,
    }
}

/// Disambiguated folder segment for one section, scoped to its project.
pub fn disambiguated_section_segment(
    section_id: &str,
    names_by_id: &HashMap<String, String>,
    project_by_section: &HashMap<String, String>,
) -> String {
    let name = sanitize(names_by_id.get(section_id).map(String::as_str).unwrap_or(""));
    let project = project_by_section.get(section_id);

    // First-seen among same-named siblings, by sorted id
    let mut siblings: Vec<&String> = names_by_id
        .keys()
        .filter(|id| project_by_section.get(*id) == project)
        .filter(|id| {
            names_by_id
                .get(*id)
                .map(|n| sanitize(n) == name)
                .unwrap_or(false)
        })
        .collect();
    siblings.sort();

    match siblings.first() {
        Some(first) if first.as_str() != section_id => {
            format!("{}-{}", name, short_id(section_id))
        }
        _ => name,
    }
}

/// Folder segments from the root project down to the given project.
///
/// One disambiguated segment per level. A cycle in the parent chain makes
/// the first revisited node the root of that chain.
pub fn project_folder_segments(
    project_id: &str,
    names_by_id: &HashMap<String, String>,
    parent_by_id: &HashMap<String, Option<String>>,
    topo_order: &[String],
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut current = Some(project_id.to_string());

    while let Some(id) = current {
        if !seen.insert(id.clone()) {
            warn!("Project parent chain contains a cycle at {}", id);
            break;
        }
        chain.push(id.clone());
        current = parent_by_id
            .get(&id)
            .cloned()
            .flatten()
            .filter(|p| parent_by_id.contains_key(p) || names_by_id.contains_key(p));
    }

    chain
        .iter()
        .rev()
        .map(|id| disambiguated_project_segment(id, names_by_id, topo_order))
        .collect()
}

/// The folder a task note belongs in, given resolved segments.
pub fn task_folder(
    tasks_folder: &str,
    project_segments: &[String],
    section_segment: Option<&str>,
) -> String {
    let mut parts = vec![tasks_folder.to_string()];
    parts.extend(project_segments.iter().cloned());
    if let Some(section) = section_segment {
        parts.push(section.to_string());
    }
    parts.join("/")
}

/// File name for a task note (sanitized title).
pub fn task_file_name(title: &str) -> String {
    format!("{}.md", sanitize(title))
}

/// Candidate path for a task note; the reconciler resolves collisions by
/// appending `-<remote id>`.
pub fn task_file_path(
    title: &str,
    tasks_folder: &str,
    project_segments: &[String],
    section_segment: Option<&str>,
) -> String {
    format!(
        "{}/{}",
        task_folder(tasks_folder, project_segments, section_segment),
        task_file_name(title)
    )
}

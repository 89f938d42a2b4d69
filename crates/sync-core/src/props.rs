//! Frontmatter key table and typed accessors.
//!
//! Keys are configurable through [`PropNames`]; reading is tolerant and
//! falls back to the hard-coded legacy key a field carried in older vaults
//! (dual-read). Writing only ever writes the preferred key and strips a
//! legacy key when it differs.
//!
//! Also home to the signature-line repair routine, which fixes hand-mangled
//! signature values in the raw YAML without touching the rest of the file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use vault_fs::Frontmatter;

/// Legacy key names from older vault layouts, read as fallbacks.
pub mod legacy {
    pub const VAULT_UUID: &str = "note_id";
    pub const TASK_TITLE: &str = "task_name";
    pub const TASK_DONE: &str = "completed";
    pub const TASK_ID: &str = "task_id";
    pub const PROJECT_ID: &str = "project_id";
    pub const SECTION_ID: &str = "section_id";
    pub const DUE_DATE: &str = "due";
    pub const IS_RECURRING: &str = "is_recurring";
    pub const URL: &str = "url";
    pub const SYNC_FLAG: &str = "sync";
    pub const IMPORT_SIGNATURE: &str = "import_hash";
    pub const SYNC_SIGNATURE: &str = "sync_hash";
}

/// Configurable frontmatter key names.
///
/// Defaults are the canonical vault schema; a user can rename any key and
/// the engine keeps reading the old default as the legacy fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropNames {
    pub vault_uuid: String,
    pub created: String,
    pub modified: String,
    pub tags: String,

    pub task_title: String,
    pub task_status: String,
    pub task_done: String,
    pub task_id: String,
    pub project_id: String,
    pub project_name: String,
    pub project_link: String,
    pub section_id: String,
    pub section_name: String,
    pub section_link: String,
    pub priority: String,
    pub priority_label: String,
    pub due_date: String,
    pub due_string: String,
    pub is_recurring: String,
    pub deadline: String,
    pub description: String,
    pub labels: String,
    pub parent_task_link: String,
    pub child_tasks: String,
    pub has_children: String,
    pub child_count: String,
    pub url: String,

    pub sync_flag: String,
    pub sync_status: String,
    pub pending_id: String,
    pub import_signature: String,
    pub sync_signature: String,
    pub last_imported_at: String,
    pub is_deleted: String,
    pub recurrence: String,
    pub complete_instances: String,

    pub parent_project_link: String,
    pub parent_project_name: String,
    pub color: String,
}

impl Default for PropNames {
    fn default() -> Self {
        Self {
            vault_uuid: "uuid".into(),
            created: "created".into(),
            modified: "modified".into(),
            tags: "tags".into(),

            task_title: "title".into(),
            task_status: "status".into(),
            task_done: "done".into(),
            task_id: "todoist_id".into(),
            project_id: "todoist_project_id".into(),
            project_name: "project".into(),
            project_link: "project_link".into(),
            section_id: "todoist_section_id".into(),
            section_name: "section".into(),
            section_link: "section_link".into(),
            priority: "priority".into(),
            priority_label: "priority_label".into(),
            due_date: "due_date".into(),
            due_string: "due_string".into(),
            is_recurring: "recurring".into(),
            deadline: "deadline".into(),
            description: "description".into(),
            labels: "labels".into(),
            parent_task_link: "parent_task".into(),
            child_tasks: "subtasks".into(),
            has_children: "has_subtasks".into(),
            child_count: "subtask_count".into(),
            url: "todoist_url".into(),

            sync_flag: "todoist_sync".into(),
            sync_status: "sync_status".into(),
            pending_id: "todoist_pending_id".into(),
            import_signature: "import_signature".into(),
            sync_signature: "sync_signature".into(),
            last_imported_at: "last_imported".into(),
            is_deleted: "deleted".into(),
            recurrence: "recurrence".into(),
            complete_instances: "complete_instances".into(),

            parent_project_link: "parent_project_link".into(),
            parent_project_name: "parent_project".into(),
            color: "color".into(),
        }
    }
}

impl PropNames {
    /// Canonical key order for serialization: identity first, then task
    /// fields, linkage, and sync state. Unknown keys sort after these.
    pub fn key_order(&self) -> Vec<&str> {
        vec![
            &self.vault_uuid,
            &self.created,
            &self.modified,
            &self.tags,
            &self.task_title,
            &self.task_status,
            &self.task_done,
            &self.priority,
            &self.priority_label,
            &self.due_date,
            &self.due_string,
            &self.is_recurring,
            &self.recurrence,
            &self.deadline,
            &self.description,
            &self.labels,
            &self.task_id,
            &self.project_id,
            &self.project_name,
            &self.project_link,
            &self.section_id,
            &self.section_name,
            &self.section_link,
            &self.parent_project_link,
            &self.parent_project_name,
            &self.color,
            &self.parent_task_link,
            &self.child_tasks,
            &self.has_children,
            &self.child_count,
            &self.url,
            &self.sync_flag,
            &self.sync_status,
            &self.pending_id,
            &self.import_signature,
            &self.sync_signature,
            &self.last_imported_at,
            &self.is_deleted,
            &self.complete_instances,
        ]
    }
}

/// Read a trimmed string value; numbers stringify, everything else is None.
pub fn get_string(fm: &Frontmatter, key: &str, legacy_key: &str) -> Option<String> {
    value_to_string(fm.get(key).or_else(|| fm.get(legacy_key))?)
}

/// Read an identifier: accepts a string or a YAML integer.
pub fn get_id(fm: &Frontmatter, key: &str, legacy_key: &str) -> Option<String> {
    let value = fm.get(key).or_else(|| fm.get(legacy_key))?;
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a boolean: accepts `true`/`false` or the strings `"true"`/`"false"`.
pub fn get_bool(fm: &Frontmatter, key: &str, legacy_key: &str) -> Option<bool> {
    let value = fm.get(key).or_else(|| fm.get(legacy_key))?;
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read an integer value.
pub fn get_i64(fm: &Frontmatter, key: &str, legacy_key: &str) -> Option<i64> {
    let value = fm.get(key).or_else(|| fm.get(legacy_key))?;
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a list of strings; a scalar normalizes to a one-element list.
pub fn get_string_list(fm: &Frontmatter, key: &str, legacy_key: &str) -> Vec<String> {
    let Some(value) = fm.get(key).or_else(|| fm.get(legacy_key)) else {
        return Vec::new();
    };
    match value {
        JsonValue::Array(items) => items.iter().filter_map(value_to_string).collect(),
        other => value_to_string(other).into_iter().collect(),
    }
}

fn value_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Write a string under the preferred key, dropping a differing legacy key.
pub fn set_string(fm: &mut Frontmatter, key: &str, legacy_key: &str, value: &str) {
    strip_legacy(fm, key, legacy_key);
    fm.insert(key.to_string(), JsonValue::String(value.to_string()));
}

/// Write an optional string: Some sets the key, None removes it.
pub fn set_opt_string(fm: &mut Frontmatter, key: &str, legacy_key: &str, value: Option<&str>) {
    strip_legacy(fm, key, legacy_key);
    match value {
        Some(v) => {
            fm.insert(key.to_string(), JsonValue::String(v.to_string()));
        }
        None => {
            fm.remove(key);
        }
    }
}

pub fn set_bool(fm: &mut Frontmatter, key: &str, legacy_key: &str, value: bool) {
    strip_legacy(fm, key, legacy_key);
    fm.insert(key.to_string(), JsonValue::Bool(value));
}

pub fn set_i64(fm: &mut Frontmatter, key: &str, legacy_key: &str, value: i64) {
    strip_legacy(fm, key, legacy_key);
    fm.insert(key.to_string(), JsonValue::Number(value.into()));
}

pub fn set_string_list(fm: &mut Frontmatter, key: &str, legacy_key: &str, values: &[String]) {
    strip_legacy(fm, key, legacy_key);
    fm.insert(
        key.to_string(),
        JsonValue::Array(
            values
                .iter()
                .map(|v| JsonValue::String(v.clone()))
                .collect(),
        ),
    );
}

fn strip_legacy(fm: &mut Frontmatter, key: &str, legacy_key: &str) {
    if legacy_key != key {
        fm.remove(legacy_key);
    }
}

/// Repair malformed signature lines in a note's raw text.
///
/// The two signature keys must match
/// `key: ("hex8"|'hex8'|hex8|""|'')?` exactly; any line in the frontmatter
/// block that names a signature key but fails the pattern is replaced with
/// `key: ""`. Returns `Some(fixed)` when a repair was made.
pub fn repair_signature_lines(raw: &str, props: &PropNames) -> Option<String> {
    let (yaml, _) = vault_fs::split_frontmatter(raw);
    let yaml = yaml?;

    let mut repaired = false;
    let mut fixed_yaml = String::with_capacity(yaml.len());

    for line in yaml.lines() {
        let mut kept = line.to_string();
        for key in [&props.import_signature, &props.sync_signature] {
            if line_names_key(line, key) && !valid_signature_line(line, key) {
                kept = format!("{}: \"\"", key);
                repaired = true;
                break;
            }
        }
        fixed_yaml.push_str(&kept);
        fixed_yaml.push('\n');
    }

    if !repaired {
        return None;
    }

    // Splice the fixed YAML back between the original delimiters.
    let yaml_start = yaml.as_ptr() as usize - raw.as_ptr() as usize;
    let yaml_end = yaml_start + yaml.len();
    Some(format!(
        "{}{}{}",
        &raw[..yaml_start],
        fixed_yaml,
        &raw[yaml_end..]
    ))
}

fn line_names_key(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with(':') || rest.starts_with(':'))
        .unwrap_or(false)
}

fn valid_signature_line(line: &str, key: &str) -> bool {
    let pattern = format!(
        r#"^{}:\s*("[0-9a-f]{{8}}"|'[0-9a-f]{{8}}'|[0-9a-f]{{8}}|""|'')?\s*$"#,
        regex::escape(key)
    );
    Regex::new(&pattern).map(|re| re.is_match(line)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fm_from_yaml(yaml: &str) -> Frontmatter {
        let raw = format!("---\n{}---\n", yaml);
        vault_fs::parse_frontmatter(&raw).frontmatter.unwrap()
    }

    #[test]
    fn get_id_accepts_number_and_string() {
        let fm = fm_from_yaml("todoist_id: 12345\n");
        assert_eq!(get_id(&fm, "todoist_id", legacy::TASK_ID), Some("12345".into()));

        let fm = fm_from_yaml("todoist_id: \"12345\"\n");
        assert_eq!(get_id(&fm, "todoist_id", legacy::TASK_ID), Some("12345".into()));
    }

    #[test]
    fn get_id_falls_back_to_legacy_key() {
        let fm = fm_from_yaml("task_id: \"A7\"\n");
        assert_eq!(get_id(&fm, "todoist_id", legacy::TASK_ID), Some("A7".into()));
    }

    #[test]
    fn get_bool_accepts_string_forms() {
        let fm = fm_from_yaml("done: \"true\"\nrecurring: false\n");
        assert_eq!(get_bool(&fm, "done", legacy::TASK_DONE), Some(true));
        assert_eq!(get_bool(&fm, "recurring", legacy::IS_RECURRING), Some(false));
    }

    #[test]
    fn get_string_trims() {
        let fm = fm_from_yaml("title: \"  Buy milk  \"\n");
        assert_eq!(get_string(&fm, "title", legacy::TASK_TITLE), Some("Buy milk".into()));
    }

    #[test]
    fn get_string_list_normalizes_scalar() {
        let fm = fm_from_yaml("labels: urgent\n");
        assert_eq!(get_string_list(&fm, "labels", ""), vec!["urgent".to_string()]);

        let fm = fm_from_yaml("labels:\n  - a\n  - b\n");
        assert_eq!(get_string_list(&fm, "labels", ""), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn set_string_strips_differing_legacy_key() {
        let mut fm = fm_from_yaml("task_name: Old\n");
        set_string(&mut fm, "title", legacy::TASK_TITLE, "New");
        assert!(fm.get("task_name").is_none());
        assert_eq!(get_string(&fm, "title", legacy::TASK_TITLE), Some("New".into()));
    }

    #[test]
    fn repair_leaves_valid_signatures_alone() {
        let props = PropNames::default();
        let raw = "---\ntitle: T\nimport_signature: \"0a1b2c3d\"\nsync_signature: ''\n---\nbody\n";
        assert!(repair_signature_lines(raw, &props).is_none());
    }

    #[test]
    fn repair_replaces_malformed_signature_line() {
        let props = PropNames::default();
        let raw = "---\ntitle: T\nimport_signature: [oops\nsync_signature: deadbeef\n---\nbody\n";
        let fixed = repair_signature_lines(raw, &props).unwrap();
        assert!(fixed.contains("import_signature: \"\""));
        // Valid bare hex8 stays untouched
        assert!(fixed.contains("sync_signature: deadbeef"));
        assert!(fixed.ends_with("---\nbody\n"));
        assert!(fixed.contains("title: T"));
    }

    #[test]
    fn repair_rejects_wrong_length_hex() {
        let props = PropNames::default();
        let raw = "---\nimport_signature: abc\n---\n";
        let fixed = repair_signature_lines(raw, &props).unwrap();
        assert!(fixed.contains("import_signature: \"\""));
    }

    #[test]
    fn repair_handles_empty_unquoted_value() {
        let props = PropNames::default();
        let raw = "---\nimport_signature:\n---\n";
        assert!(repair_signature_lines(raw, &props).is_none());
    }
}

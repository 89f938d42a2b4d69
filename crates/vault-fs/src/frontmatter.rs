//! YAML frontmatter parsing and canonical serialization for vault notes.
//!
//! Parses the YAML frontmatter block at the start of markdown files:
//! ```markdown
//! ---
//! title: My Note
//! tags: [rust, todoist]
//! ---
//!
//! Note content here...
//! ```
//!
//! Reading is tolerant (any YAML mapping is accepted); writing is strict:
//! [`build_note`] emits keys in a caller-supplied canonical order so that an
//! unchanged note round-trips byte-identically.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Parsed frontmatter as a map of string keys to JSON values.
/// Using JSON values allows flexible typing (strings, numbers, arrays, objects).
pub type Frontmatter = HashMap<String, JsonValue>;

/// A parsed note with frontmatter separated from content.
///
/// The `content` field borrows from `raw` to avoid unnecessary allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote<'a> {
    /// The frontmatter key-value pairs, if present
    pub frontmatter: Option<Frontmatter>,
    /// The note content after the frontmatter (borrows from raw)
    pub content: &'a str,
    /// The raw file content (frontmatter + content)
    pub raw: &'a str,
}

/// Split a note into frontmatter YAML string and content, without parsing the YAML.
///
/// Returns (frontmatter_yaml, content) where frontmatter_yaml is None if
/// no valid frontmatter block was found. Both returned slices borrow from
/// `raw`, so callers can splice repairs back by offset.
pub fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    // The opening delimiter must be the very first line
    let Some(after_open) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return (None, raw);
    };

    // The closing delimiter is a line consisting of exactly ---
    let mut line_starts =
        std::iter::once(0).chain(after_open.match_indices('\n').map(|(i, _)| i + 1));
    let close = line_starts.find(|&start| {
        let rest = &after_open[start..];
        rest == "---" || rest == "---\r" || rest.starts_with("---\n") || rest.starts_with("---\r\n")
    });

    match close {
        Some(start) => {
            let yaml = &after_open[..start];
            let after_close = &after_open[start + 3..];
            let content = after_close
                .strip_prefix("\r\n")
                .or_else(|| after_close.strip_prefix('\n'))
                .unwrap_or(after_close);
            (Some(yaml), content)
        }
        None => (None, raw),
    }
}

/// Parse a note's raw content into frontmatter and content.
///
/// The frontmatter is parsed as YAML and converted to a HashMap with JSON values.
/// The returned `ParsedNote` borrows from the input string.
pub fn parse_frontmatter(raw: &str) -> ParsedNote<'_> {
    let (yaml_str, content) = split_frontmatter(raw);

    let frontmatter = yaml_str.and_then(|yaml| {
        serde_yaml::from_str::<serde_yaml::Value>(yaml)
            .ok()
            .and_then(yaml_to_json_map)
    });

    ParsedNote {
        frontmatter,
        content,
        raw,
    }
}

/// Build a complete note from frontmatter and body.
///
/// Keys named in `key_order` are written first, in that order; any remaining
/// keys follow alphabetically. Keys whose value is `Null` are omitted. This
/// fixed ordering is what makes an unchanged note byte-stable across runs.
pub fn build_note(frontmatter: &Frontmatter, body: &str, key_order: &[&str]) -> String {
    let yaml = frontmatter_to_yaml(frontmatter, key_order);
    format!("---\n{}---\n{}", yaml, body)
}

/// Replace (or insert) the frontmatter block of a raw note, leaving the body
/// untouched.
pub fn replace_frontmatter_block(raw: &str, frontmatter: &Frontmatter, key_order: &[&str]) -> String {
    let (_, content) = split_frontmatter(raw);
    build_note(frontmatter, content, key_order)
}

/// Serialize frontmatter to a YAML string with deterministic key order.
fn frontmatter_to_yaml(frontmatter: &Frontmatter, key_order: &[&str]) -> String {
    let mut mapping = serde_yaml::Mapping::new();

    for key in key_order {
        if let Some(value) = frontmatter.get(*key) {
            if !value.is_null() {
                mapping.insert(
                    serde_yaml::Value::String((*key).to_string()),
                    json_to_yaml(value),
                );
            }
        }
    }

    let mut rest: Vec<&String> = frontmatter
        .keys()
        .filter(|k| !key_order.contains(&k.as_str()))
        .collect();
    rest.sort();
    for key in rest {
        let value = &frontmatter[key];
        if !value.is_null() {
            mapping.insert(serde_yaml::Value::String(key.clone()), json_to_yaml(value));
        }
    }

    if mapping.is_empty() {
        return String::new();
    }

    // Mapping serialization preserves insertion order
    serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping)).unwrap_or_default()
}

/// Convert a JSON value to a YAML value for serialization
fn json_to_yaml(json: &JsonValue) -> serde_yaml::Value {
    match json {
        JsonValue::Null => serde_yaml::Value::Null,
        JsonValue::Bool(b) => serde_yaml::Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_yaml::Value::Number(f.into())
            } else {
                serde_yaml::Value::Null
            }
        }
        JsonValue::String(s) => serde_yaml::Value::String(s.clone()),
        JsonValue::Array(arr) => {
            serde_yaml::Value::Sequence(arr.iter().map(json_to_yaml).collect())
        }
        JsonValue::Object(obj) => {
            let mut mapping = serde_yaml::Mapping::new();
            for (k, v) in obj {
                mapping.insert(serde_yaml::Value::String(k.clone()), json_to_yaml(v));
            }
            serde_yaml::Value::Mapping(mapping)
        }
    }
}

/// Convert a YAML value to a JSON HashMap (for the top-level frontmatter)
fn yaml_to_json_map(yaml: serde_yaml::Value) -> Option<Frontmatter> {
    match yaml {
        serde_yaml::Value::Mapping(map) => {
            let mut result = HashMap::new();
            for (k, v) in map {
                if let serde_yaml::Value::String(key) = k {
                    result.insert(key, yaml_to_json(v));
                }
            }
            if result.is_empty() {
                None
            } else {
                Some(result)
            }
        }
        _ => None,
    }
}

/// Convert a YAML value to a JSON value
fn yaml_to_json(yaml: serde_yaml::Value) -> JsonValue {
    match yaml {
        serde_yaml::Value::Null => JsonValue::Null,
        serde_yaml::Value::Bool(b) => JsonValue::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            } else {
                JsonValue::Null
            }
        }
        serde_yaml::Value::String(s) => JsonValue::String(s),
        serde_yaml::Value::Sequence(seq) => {
            JsonValue::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let obj: serde_json::Map<String, JsonValue> = map
                .into_iter()
                .filter_map(|(k, v)| {
                    if let serde_yaml::Value::String(key) = k {
                        Some((key, yaml_to_json(v)))
                    } else {
                        None
                    }
                })
                .collect();
            JsonValue::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

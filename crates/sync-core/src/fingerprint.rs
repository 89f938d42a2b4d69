//! Content signatures for change detection.
//!
//! A fingerprint is FNV-1a (32-bit) over the UTF-8 bytes of a canonical JSON
//! array of a fixed field projection, zero-padded to 8 lowercase hex digits.
//! Two projections exist: the *remote-import* variant covers fields the
//! remote owns; the *local-sync* variant covers fields the local side pushes.
//!
//! Hashes are advisory: equal hashes mean "no change", a mismatch forces a
//! full reconcile of that record.

use serde_json::Value as JsonValue;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a 32-bit hash.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Remote-owned field projection for the import signature.
#[derive(Debug, Default)]
pub struct RemoteImportFields<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub checked: bool,
    pub project_id: Option<&'a str>,
    pub project_name: Option<&'a str>,
    pub section_id: Option<&'a str>,
    pub section_name: Option<&'a str>,
    pub priority: i64,
    pub due_date: Option<&'a str>,
    pub due_string: Option<&'a str>,
    pub is_recurring: bool,
    pub parent_id: Option<&'a str>,
    pub labels: &'a [String],
    pub deadline: Option<&'a str>,
}

/// Locally-pushed field projection for the sync signature.
#[derive(Debug, Default)]
pub struct LocalSyncFields<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub is_done: bool,
    pub is_recurring: bool,
    pub project_id: Option<&'a str>,
    pub section_id: Option<&'a str>,
    pub due_date: Option<&'a str>,
    pub due_string: Option<&'a str>,
}

/// Compute the remote-import fingerprint.
pub fn remote_import_fingerprint(fields: &RemoteImportFields<'_>) -> String {
    hash_fields(vec![
        string(fields.title),
        string(fields.description),
        flag(fields.checked),
        opt_string(fields.project_id),
        opt_string(fields.project_name),
        opt_string(fields.section_id),
        opt_string(fields.section_name),
        JsonValue::Number(fields.priority.into()),
        opt_string(fields.due_date),
        opt_string(fields.due_string),
        flag(fields.is_recurring),
        opt_string(fields.parent_id),
        string(&fields.labels.join("|")),
        opt_string(fields.deadline),
    ])
}

/// Compute the local-sync fingerprint.
pub fn local_sync_fingerprint(fields: &LocalSyncFields<'_>) -> String {
    hash_fields(vec![
        string(fields.title),
        string(fields.description),
        flag(fields.is_done),
        flag(fields.is_recurring),
        opt_string(fields.project_id),
        opt_string(fields.section_id),
        opt_string(fields.due_date),
        opt_string(fields.due_string),
    ])
}

fn string(value: &str) -> JsonValue {
    JsonValue::String(value.trim().to_string())
}

fn opt_string(value: Option<&str>) -> JsonValue {
    string(value.unwrap_or(""))
}

fn flag(value: bool) -> JsonValue {
    JsonValue::Number(i64::from(value).into())
}

fn hash_fields(fields: Vec<JsonValue>) -> String {
    // Canonical form: the serialized JSON array itself
    let canonical = serde_json::to_string(&fields).unwrap_or_default();
    format!("{:08x}", fnv1a_32(canonical.as_bytes()))
}

//! One-shot vault UUID back-fill.
//!
//! Every managed note gets a write-once `vault_uuid`. The uuid survives file
//! moves and remote re-linking, which makes it the only identity that never
//! changes for the lifetime of a note.

use crate::index::is_managed;
use crate::props::{self, legacy, PropNames};
use crate::vault::{Result, Vault};
use tracing::debug;
use uuid::Uuid;
use vault_fs::FileSystem;

/// Assign a fresh UUID to every managed note lacking one.
///
/// Existing uuids are never rewritten. Returns the number of notes stamped.
pub async fn assign_missing_uuids<F: FileSystem>(
    vault: &mut Vault<F>,
    p: &PropNames,
) -> Result<usize> {
    let mut assigned = 0;
    let key_order = p.key_order();

    for path in vault.list_markdown_files().await? {
        let Some(fm) = vault.read_frontmatter(&path).await? else {
            continue;
        };
        if !is_managed(&fm, p) {
            continue;
        }
        if props::get_string(&fm, &p.vault_uuid, legacy::VAULT_UUID).is_some() {
            continue;
        }

        let uuid = Uuid::new_v4().to_string();
        vault
            .process_frontmatter(&path, &key_order, |fm| {
                // Re-check against the live file; never overwrite
                if props::get_string(fm, &p.vault_uuid, legacy::VAULT_UUID).is_none() {
                    props::set_string(fm, &p.vault_uuid, legacy::VAULT_UUID, &uuid);
                }
            })
            .await?;
        debug!("Assigned vault uuid to {}", path);
        assigned += 1;
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_fs::InMemoryFs;

    #[tokio::test]
    async fn stamps_managed_notes_without_uuid() {
        let fs = InMemoryFs::new();
        fs.write("t.md", b"---\ntodoist_id: \"A1\"\n---\n")
            .await
            .unwrap();
        fs.write("plain.md", b"---\ntitle: no ids\n---\n")
            .await
            .unwrap();

        let mut vault = Vault::new(fs);
        let p = PropNames::default();
        let count = assign_missing_uuids(&mut vault, &p).await.unwrap();
        assert_eq!(count, 1);

        let fm = vault.read_frontmatter("t.md").await.unwrap().unwrap();
        let uuid = props::get_string(&fm, &p.vault_uuid, "").unwrap();
        assert!(!uuid.is_empty());

        // The unmanaged note is untouched
        let fm = vault.read_frontmatter("plain.md").await.unwrap().unwrap();
        assert!(props::get_string(&fm, &p.vault_uuid, "").is_none());
    }

    #[tokio::test]
    async fn never_overwrites_an_existing_uuid() {
        let fs = InMemoryFs::new();
        fs.write("t.md", b"---\ntodoist_id: \"A1\"\nuuid: keep-me\n---\n")
            .await
            .unwrap();

        let mut vault = Vault::new(fs);
        let p = PropNames::default();
        let count = assign_missing_uuids(&mut vault, &p).await.unwrap();
        assert_eq!(count, 0);

        let fm = vault.read_frontmatter("t.md").await.unwrap().unwrap();
        assert_eq!(
            props::get_string(&fm, &p.vault_uuid, ""),
            Some("keep-me".to_string())
        );
    }

    #[tokio::test]
    async fn is_idempotent_across_runs() {
        let fs = InMemoryFs::new();
        fs.write("t.md", b"---\ntodoist_project_id: \"P1\"\n---\n")
            .await
            .unwrap();

        let mut vault = Vault::new(fs);
        let p = PropNames::default();
        assign_missing_uuids(&mut vault, &p).await.unwrap();

        let fm = vault.read_frontmatter("t.md").await.unwrap().unwrap();
        let first = props::get_string(&fm, &p.vault_uuid, "").unwrap();

        let count = assign_missing_uuids(&mut vault, &p).await.unwrap();
        assert_eq!(count, 0);
        let fm = vault.read_frontmatter("t.md").await.unwrap().unwrap();
        assert_eq!(props::get_string(&fm, &p.vault_uuid, ""), Some(first));
    }
}

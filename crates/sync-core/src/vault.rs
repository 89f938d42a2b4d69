//! Vault: the engine's view of the markdown file tree.
//!
//! Wraps a [`FileSystem`] with a frontmatter cache and the write primitives
//! the reconciler needs. The cache serves scans and index lookups; every
//! mutation re-reads the live file first (`process_frontmatter`), so a user
//! edit between awaits is never clobbered with stale in-run state.

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use vault_fs::{build_note, parse_frontmatter, replace_frontmatter_block, FileSystem, Frontmatter, FsError};

/// Directory for engine state (sync token)
const SYNC_DIR: &str = ".sync";
/// Persisted sync token from the last snapshot
const SYNC_TOKEN_FILE: &str = ".sync/sync-token";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Not valid UTF-8: {0}")]
    Utf8(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// The vault, with a per-path frontmatter cache.
pub struct Vault<F: FileSystem> {
    fs: F,
    /// path -> parsed frontmatter (None = file has no frontmatter block)
    cache: HashMap<String, Option<Frontmatter>>,
}

impl<F: FileSystem> Vault<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            cache: HashMap::new(),
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// List all markdown files in the vault, skipping hidden directories.
    pub async fn list_markdown_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut dirs_to_visit = vec![String::new()]; // Start with root

        while let Some(dir) = dirs_to_visit.pop() {
            let entries = self.fs.list(&dir).await?;

            for entry in entries {
                let path = if dir.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", dir, entry.name)
                };

                if entry.name.starts_with('.') {
                    continue;
                }

                if entry.is_dir {
                    dirs_to_visit.push(path);
                } else if path.ends_with(".md") {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Read a file's full text.
    pub async fn read_text(&self, path: &str) -> Result<String> {
        let bytes = self.fs.read(path).await?;
        String::from_utf8(bytes).map_err(|e| VaultError::Utf8(e.to_string()))
    }

    /// Read a file's frontmatter through the cache.
    pub async fn read_frontmatter(&mut self, path: &str) -> Result<Option<Frontmatter>> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached.clone());
        }
        let raw = self.read_text(path).await?;
        let parsed = parse_frontmatter(&raw).frontmatter;
        self.cache.insert(path.to_string(), parsed.clone());
        Ok(parsed)
    }

    /// Drop a cache entry (after an external mutation).
    pub fn invalidate(&mut self, path: &str) {
        self.cache.remove(path);
    }

    /// Read-modify-write over one file's frontmatter.
    ///
    /// Reads the live file (not the cache), applies the mutation, and writes
    /// back only when the result differs. The cache is updated on every exit
    /// path that leaves the file changed.
    pub async fn process_frontmatter<M>(
        &mut self,
        path: &str,
        key_order: &[&str],
        mutate: M,
    ) -> Result<()>
    where
        M: FnOnce(&mut Frontmatter),
    {
        let raw = self.read_text(path).await?;
        let mut fm = parse_frontmatter(&raw).frontmatter.unwrap_or_default();

        mutate(&mut fm);

        let rebuilt = replace_frontmatter_block(&raw, &fm, key_order);
        if rebuilt != raw {
            self.fs.write(path, rebuilt.as_bytes()).await?;
            debug!("Updated frontmatter: {}", path);
        }
        self.cache.insert(path.to_string(), Some(fm));
        Ok(())
    }

    /// Read-modify-write over one file's raw text (for repairs that must not
    /// go through the YAML parser). `mutate` returns Some(fixed) to write.
    pub async fn process_raw<M>(&mut self, path: &str, mutate: M) -> Result<bool>
    where
        M: FnOnce(&str) -> Option<String>,
    {
        let raw = self.read_text(path).await?;
        if let Some(fixed) = mutate(&raw) {
            self.fs.write(path, fixed.as_bytes()).await?;
            self.cache
                .insert(path.to_string(), parse_frontmatter(&fixed).frontmatter);
            return Ok(true);
        }
        Ok(false)
    }

    /// Create a note file with frontmatter and body.
    pub async fn create_note(
        &mut self,
        path: &str,
        fm: &Frontmatter,
        body: &str,
        key_order: &[&str],
    ) -> Result<()> {
        if let Some(parent) = parent_folder(path) {
            self.fs.mkdir(&parent).await?;
        }
        let content = build_note(fm, body, key_order);
        self.fs.write(path, content.as_bytes()).await?;
        self.cache.insert(path.to_string(), Some(fm.clone()));
        Ok(())
    }

    /// Find a free path near `desired` by appending `-2`, `-3`, … before the
    /// extension. Returns `desired` itself when it is unoccupied.
    pub async fn allocate_path(&self, desired: &str) -> Result<String> {
        if !self.fs.exists(desired).await? {
            return Ok(desired.to_string());
        }
        let (stem, ext) = match desired.rfind('.') {
            Some(dot) if !desired[dot..].contains('/') => (&desired[..dot], &desired[dot..]),
            _ => (desired, ""),
        };
        let mut counter = 2;
        loop {
            let candidate = format!("{}-{}{}", stem, counter, ext);
            if !self.fs.exists(&candidate).await? {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Rename or move a note, carrying its cache entry along.
    pub async fn rename_file(&mut self, from: &str, to: &str) -> Result<()> {
        if let Some(parent) = parent_folder(to) {
            self.fs.mkdir(&parent).await?;
        }
        self.fs.rename(from, to).await?;
        if let Some(entry) = self.cache.remove(from) {
            self.cache.insert(to.to_string(), entry);
        }
        Ok(())
    }

    /// Move a folder and everything under it; cache entries follow.
    pub async fn move_folder(&mut self, from: &str, to: &str) -> Result<()> {
        if let Some(parent) = parent_folder(to) {
            self.fs.mkdir(&parent).await?;
        }
        self.fs.rename_dir(from, to).await?;

        let from_prefix = format!("{}/", from);
        let moved: Vec<String> = self
            .cache
            .keys()
            .filter(|p| p.starts_with(&from_prefix))
            .cloned()
            .collect();
        for old in moved {
            let new = format!("{}/{}", to, &old[from_prefix.len()..]);
            if let Some(entry) = self.cache.remove(&old) {
                self.cache.insert(new, entry);
            }
        }
        Ok(())
    }

    /// Move a note to the trash (recoverable).
    pub async fn trash(&mut self, path: &str) -> Result<String> {
        let landed = self.fs.trash(path).await?;
        self.cache.remove(path);
        Ok(landed)
    }

    /// Create a folder and all intermediate segments; idempotent.
    pub async fn ensure_folder(&self, path: &str) -> Result<()> {
        self.fs.mkdir(path).await?;
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.fs.exists(path).await?)
    }

    /// Sync token persisted from the previous run, if any.
    pub async fn load_sync_token(&self) -> Result<Option<String>> {
        if !self.fs.exists(SYNC_TOKEN_FILE).await? {
            return Ok(None);
        }
        let token = self.read_text(SYNC_TOKEN_FILE).await?;
        let token = token.trim().to_string();
        Ok((!token.is_empty()).then_some(token))
    }

    /// Persist the sync token for the next run.
    pub async fn store_sync_token(&self, token: &str) -> Result<()> {
        self.fs.mkdir(SYNC_DIR).await?;
        self.fs.write(SYNC_TOKEN_FILE, token.as_bytes()).await?;
        Ok(())
    }
}

/// Parent folder of a vault path, if it has one.
pub fn parent_folder(path: &str) -> Option<String> {
    path.rfind('/').map(|pos| path[..pos].to_string())
}

//! FileSystem trait abstraction for platform-independent vault operations.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in sync-daemon) - Uses tokio::fs
//!
//! All paths are vault-relative, `/`-separated, without a leading slash.
//! The surface is exactly what the sync engine needs: whole-file reads and
//! writes, directory listing, existence checks, folder creation, renames,
//! and a recoverable trash. Deletion only ever happens through `trash`.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

/// Folder that `trash` moves files into (recoverable delete).
pub const TRASH_DIR: &str = ".trash";

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Platform-independent filesystem abstraction.
///
/// Implementations must be `Send + Sync` for use across await points.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create directory (and parents if needed); idempotent
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Rename or move a single file. Fails if `to` already exists.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Rename or move a directory together with everything under it.
    /// Fails if `to` already exists.
    async fn rename_dir(&self, from: &str, to: &str) -> Result<()>;

    /// Move a file into the trash folder (recoverable delete).
    /// Returns the path the file landed at.
    async fn trash(&self, path: &str) -> Result<String>;
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
    dirs: RwLock<HashSet<String>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut dirs = HashSet::new();
        dirs.insert(String::new()); // Root directory
        Self {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(dirs),
        }
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn parent(path: &str) -> Option<String> {
        let normalized = Self::normalize(path);
        if normalized.is_empty() {
            None
        } else {
            match normalized.rfind('/') {
                Some(pos) => Some(normalized[..pos].to_string()),
                None => Some(String::new()),
            }
        }
    }

    /// Register a directory and all of its ancestors.
    fn ensure_dirs(&self, path: &str) {
        let mut dirs = self.dirs.write().unwrap();
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            dirs.insert(prefix.clone());
        }
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize(path);
        let files = self.files.read().unwrap();
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize(path);
        if let Some(parent) = Self::parent(&path) {
            self.ensure_dirs(&parent);
        }
        self.files.write().unwrap().insert(path, content.to_vec());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize(path);
        let dirs = self.dirs.read().unwrap();
        if !dirs.contains(&path) {
            return Err(FsError::NotFound(path));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let files = self.files.read().unwrap();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        // A child is a directory if it is registered as one, or if some
        // deeper path passes through it.
        let candidates = files
            .keys()
            .map(|f| (f, false))
            .chain(dirs.iter().map(|d| (d, true)));
        for (candidate, registered_dir) in candidates {
            let Some(rest) = candidate.strip_prefix(&prefix) else {
                continue;
            };
            let Some(name) = rest.split('/').next().filter(|n| !n.is_empty()) else {
                continue;
            };
            if seen.insert(name.to_string()) {
                entries.push(FileEntry {
                    name: name.to_string(),
                    is_dir: registered_dir || rest.contains('/'),
                });
            }
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize(path);
        Ok(self.files.read().unwrap().contains_key(&path)
            || self.dirs.read().unwrap().contains(&path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.ensure_dirs(&Self::normalize(path));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalize(from);
        let to = Self::normalize(to);

        if self.exists(&to).await? {
            return Err(FsError::AlreadyExists(to));
        }
        if let Some(parent) = Self::parent(&to) {
            self.ensure_dirs(&parent);
        }

        let mut files = self.files.write().unwrap();
        let content = files
            .remove(&from)
            .ok_or_else(|| FsError::NotFound(from.clone()))?;
        files.insert(to, content);
        Ok(())
    }

    async fn rename_dir(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalize(from);
        let to = Self::normalize(to);

        {
            let dirs = self.dirs.read().unwrap();
            if !dirs.contains(&from) {
                return Err(FsError::NotFound(from));
            }
            if dirs.contains(&to) {
                return Err(FsError::AlreadyExists(to));
            }
        }
        if let Some(parent) = Self::parent(&to) {
            self.ensure_dirs(&parent);
        }

        let from_prefix = format!("{}/", from);
        let rewrite = |path: &str| -> Option<String> {
            if path == from {
                Some(to.clone())
            } else {
                path.strip_prefix(&from_prefix)
                    .map(|rest| format!("{}/{}", to, rest))
            }
        };

        let mut dirs = self.dirs.write().unwrap();
        let rewritten: HashSet<String> = dirs
            .iter()
            .map(|d| rewrite(d).unwrap_or_else(|| d.clone()))
            .collect();
        *dirs = rewritten;
        drop(dirs);

        let mut files = self.files.write().unwrap();
        let rewritten: HashMap<String, Vec<u8>> = files
            .iter()
            .map(|(f, content)| (rewrite(f).unwrap_or_else(|| f.clone()), content.clone()))
            .collect();
        *files = rewritten;

        Ok(())
    }

    async fn trash(&self, path: &str) -> Result<String> {
        let path = Self::normalize(path);
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();

        // Find a free slot in the trash folder
        let mut candidate = format!("{}/{}", TRASH_DIR, name);
        let mut counter = 2;
        while self.exists(&candidate).await? {
            candidate = format!("{}/{} {}", TRASH_DIR, name, counter);
            counter += 1;
        }

        self.rename(&path, &candidate).await?;
        Ok(candidate)
    }
}

// Implement FileSystem for Arc<T> where T: FileSystem
// This allows sharing a filesystem between the vault and tests
#[async_trait]
impl<T: FileSystem + Send + Sync> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to).await
    }

    async fn rename_dir(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename_dir(from, to).await
    }

    async fn trash(&self, path: &str) -> Result<String> {
        (**self).trash(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_fs_basic_operations() {
        let fs = InMemoryFs::new();

        fs.write("test.txt", b"hello world").await.unwrap();

        let content = fs.read("test.txt").await.unwrap();
        assert_eq!(content, b"hello world");

        assert!(fs.exists("test.txt").await.unwrap());
        assert!(!fs.exists("nonexistent.txt").await.unwrap());

        let err = fs.read("nonexistent.txt").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inmemory_fs_directories() {
        let fs = InMemoryFs::new();

        // Write creates parent directories
        fs.write("a/b/c.txt", b"content").await.unwrap();

        assert!(fs.exists("a").await.unwrap());
        assert!(fs.exists("a/b").await.unwrap());

        let entries = fs.list("a").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b");
        assert!(entries[0].is_dir);

        let entries = fs.list("a/b").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "c.txt");
        assert!(!entries[0].is_dir);
    }

    #[tokio::test]
    async fn test_list_unknown_directory_errors() {
        let fs = InMemoryFs::new();
        let err = fs.list("nope").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_file() {
        let fs = InMemoryFs::new();
        fs.write("a/old.md", b"body").await.unwrap();

        fs.rename("a/old.md", "b/new.md").await.unwrap();

        assert!(!fs.exists("a/old.md").await.unwrap());
        assert_eq!(fs.read("b/new.md").await.unwrap(), b"body");
    }

    #[tokio::test]
    async fn test_rename_refuses_to_overwrite() {
        let fs = InMemoryFs::new();
        fs.write("a.md", b"a").await.unwrap();
        fs.write("b.md", b"b").await.unwrap();

        let err = fs.rename("a.md", "b.md").await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
        assert_eq!(fs.read("b.md").await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_rename_dir_moves_contents() {
        let fs = InMemoryFs::new();
        fs.write("Tasks/Home/a.md", b"a").await.unwrap();
        fs.write("Tasks/Home/sub/b.md", b"b").await.unwrap();

        fs.rename_dir("Tasks/Home", "Tasks/Household").await.unwrap();

        assert!(!fs.exists("Tasks/Home").await.unwrap());
        assert_eq!(fs.read("Tasks/Household/a.md").await.unwrap(), b"a");
        assert_eq!(fs.read("Tasks/Household/sub/b.md").await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_trash_is_collision_safe() {
        let fs = InMemoryFs::new();
        fs.write("note.md", b"one").await.unwrap();
        let first = fs.trash("note.md").await.unwrap();

        fs.write("note.md", b"two").await.unwrap();
        let second = fs.trash("note.md").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(fs.read(&first).await.unwrap(), b"one");
        assert_eq!(fs.read(&second).await.unwrap(), b"two");
    }
}

//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use vault_fs::fs::{FileEntry, FileSystem, FsError, Result, TRASH_DIR};

/// Native filesystem rooted at the vault directory
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        fs::read(&full_path)
            .await
            .map_err(|e| FsError::Io(e.to_string()))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::Io(e.to_string()))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| FsError::Io(e.to_string()))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| FsError::Io(e.to_string()))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| FsError::Io(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| FsError::Io(e.to_string()))?;

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(full_path.exists())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| FsError::Io(e.to_string()))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let to_full = self.full_path(to);
        if to_full.exists() {
            return Err(FsError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = to_full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::Io(e.to_string()))?;
        }
        fs::rename(self.full_path(from), &to_full)
            .await
            .map_err(|e| FsError::Io(e.to_string()))
    }

    async fn rename_dir(&self, from: &str, to: &str) -> Result<()> {
        // Directories and files rename identically at the OS level
        self.rename(from, to).await
    }

    async fn trash(&self, path: &str) -> Result<String> {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();

        let mut candidate = format!("{}/{}", TRASH_DIR, name);
        let mut counter = 2;
        while self.exists(&candidate).await? {
            candidate = format!("{}/{} {}", TRASH_DIR, name, counter);
            counter += 1;
        }

        self.rename(path, &candidate).await?;
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.write("Tasks/a.md", b"hello").await.unwrap();
        assert_eq!(fs.read("Tasks/a.md").await.unwrap(), b"hello");
        assert!(fs.exists("Tasks").await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_across_folders() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.write("a.md", b"x").await.unwrap();
        fs.rename("a.md", "sub/b.md").await.unwrap();

        assert!(!fs.exists("a.md").await.unwrap());
        assert_eq!(fs.read("sub/b.md").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn rename_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.write("a.md", b"a").await.unwrap();
        fs.write("b.md", b"b").await.unwrap();

        let err = fs.rename("a.md", "b.md").await.unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn trash_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.write("note.md", b"keep me").await.unwrap();
        let landed = fs.trash("note.md").await.unwrap();

        assert!(!fs.exists("note.md").await.unwrap());
        assert_eq!(fs.read(&landed).await.unwrap(), b"keep me");
    }
}

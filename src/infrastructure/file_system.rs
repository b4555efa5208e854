use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Disk persistence for uploaded documents. Files are stored under
/// server-generated UUID keys; client-supplied filenames never touch the
/// filesystem.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    upload_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(upload_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&upload_dir)
            .with_context(|| format!("Failed to create upload dir {:?}", upload_dir))?;
        Ok(Self { upload_dir })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    fn path_for(&self, storage_key: &str) -> PathBuf {
        self.upload_dir.join(format!("{}.pdf", storage_key))
    }

    /// Persists `bytes` under a fresh storage key and returns the key.
    pub fn save(&self, bytes: &[u8]) -> Result<String> {
        let storage_key = Uuid::new_v4().to_string();
        let path = self.path_for(&storage_key);
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
        log::debug!("Stored {} bytes at {:?}", bytes.len(), path);
        Ok(storage_key)
    }

    /// Removes the file for `storage_key` if it exists.
    pub fn delete(&self, storage_key: &str) -> Result<()> {
        let path = self.path_for(storage_key);
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
            log::debug!("Removed {:?}", path);
        }
        Ok(())
    }

    /// Deletes every file in the upload directory. Runs before each new
    /// ingestion so at most one document is ever on disk.
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.upload_dir)
            .with_context(|| format!("Failed to read upload dir {:?}", self.upload_dir))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::error!("Failed to remove stale upload {:?}: {}", path, e);
                }
            }
        }
        Ok(())
    }

    pub fn exists(&self, storage_key: &str) -> bool {
        self.path_for(storage_key).exists()
    }
}

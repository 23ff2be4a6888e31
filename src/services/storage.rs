use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local directory holding uploads for as long as their import runs.
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start receiving an upload whose job does not exist yet.
    pub async fn begin_upload(&self) -> Result<UploadWriter, StorageError> {
        let path = self.dir.join(format!("incoming-{}.csv", Uuid::new_v4()));
        let file = fs::File::create(&path).await?;
        Ok(UploadWriter {
            file,
            upload: TempUpload { path, len: 0, removed: false },
        })
    }

    /// Persist an in-memory upload.
    pub async fn persist_bytes(&self, data: &[u8]) -> Result<TempUpload, StorageError> {
        let mut writer = self.begin_upload().await?;
        writer.write_chunk(data).await?;
        writer.finish().await
    }

    /// Give a received upload its job-specific name.
    pub async fn assign(&self, mut upload: TempUpload, job_id: i64) -> Result<TempUpload, StorageError> {
        let target = self.dir.join(format!("import-{job_id}.csv"));
        fs::rename(&upload.path, &target).await?;
        upload.path = target;
        Ok(upload)
    }

    /// Take ownership of an upload left behind by a previous process.
    pub async fn adopt(&self, path: impl Into<PathBuf>) -> Result<TempUpload, StorageError> {
        let path = path.into();
        let len = fs::metadata(&path).await?.len();
        Ok(TempUpload { path, len, removed: false })
    }

    /// Fresh path for an export file. The caller owns the file it creates there.
    pub fn export_path(&self, job_id: i64) -> PathBuf {
        self.dir
            .join(format!("import-errors-{job_id}-{}.csv", Uuid::new_v4()))
    }
}

/// Streams an upload to disk chunk by chunk.
pub struct UploadWriter {
    file: fs::File,
    upload: TempUpload,
}

impl UploadWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(chunk).await?;
        self.upload.len += chunk.len() as u64;
        Ok(())
    }

    /// Flush the upload to stable storage.
    pub async fn finish(mut self) -> Result<TempUpload, StorageError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.upload)
    }
}

/// An upload on disk. The file is removed by [`TempUpload::delete`] or, failing
/// that, when the value is dropped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    len: u64,
    removed: bool,
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub async fn delete(mut self) -> Result<(), StorageError> {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove upload");
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

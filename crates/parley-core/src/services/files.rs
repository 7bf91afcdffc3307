use std::path::{Path, PathBuf};

use super::{FileService, UploadOutcome};
use crate::error::{ParleyError, Result};

/// Stores uploads under `<root>/uploads`. Picker answers are preselected by
/// the embedding front end; an unset save target counts as a cancel.
pub struct LocalFileService {
    upload_dir: PathBuf,
    picked_files: Vec<PathBuf>,
    save_target: Option<PathBuf>,
}

impl LocalFileService {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            upload_dir: root.as_ref().join("uploads"),
            picked_files: Vec::new(),
            save_target: None,
        }
    }

    pub fn with_picked_files(mut self, files: Vec<PathBuf>) -> Self {
        self.picked_files = files;
        self
    }

    pub fn with_save_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.save_target = Some(target.into());
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}

#[async_trait::async_trait]
impl FileService for LocalFileService {
    async fn upload_file(&self, source: &Path) -> UploadOutcome {
        let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
            return UploadOutcome::failed(format!("not a file: {}", source.display()));
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.upload_dir).await {
            return UploadOutcome::failed(format!("cannot create upload directory: {e}"));
        }

        let target = self
            .upload_dir
            .join(format!("{}-{}", uuid::Uuid::new_v4(), name));

        match tokio::fs::copy(source, &target).await {
            Ok(bytes) => {
                tracing::debug!("uploaded {} ({} bytes)", source.display(), bytes);
                UploadOutcome::stored(target.to_string_lossy())
            }
            Err(e) => UploadOutcome::failed(format!("{}: {}", source.display(), e)),
        }
    }

    async fn download_file(&self, stored: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(stored, destination).await?;
        Ok(())
    }

    async fn delete_file(&self, stored: &Path) -> Result<()> {
        if !stored.starts_with(&self.upload_dir) {
            return Err(ParleyError::Other(format!(
                "refusing to delete {} outside the upload directory",
                stored.display()
            )));
        }
        match tokio::fs::remove_file(stored).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn pick_files(&self) -> Vec<PathBuf> {
        self.picked_files.clone()
    }

    async fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
        let target = self.save_target.as_ref()?;
        if target.is_dir() {
            Some(target.join(suggested_name))
        } else {
            Some(target.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "remember the milk").unwrap();

        let service = LocalFileService::new(dir.path().join("data"));
        let outcome = service.upload_file(&source).await;
        assert!(outcome.success);
        let stored = PathBuf::from(outcome.path.unwrap());
        assert!(stored.starts_with(service.upload_dir()));

        let copy = dir.path().join("out").join("notes.txt");
        service.download_file(&stored, &copy).await.unwrap();
        assert_eq!(std::fs::read_to_string(&copy).unwrap(), "remember the milk");

        service.delete_file(&stored).await.unwrap();
        assert!(!stored.exists());
        assert!(service.delete_file(&source).await.is_err());
    }

    #[tokio::test]
    async fn test_upload_missing_source_fails_softly() {
        let dir = TempDir::new().unwrap();
        let service = LocalFileService::new(dir.path());
        let outcome = service.upload_file(&dir.path().join("nope.bin")).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_save_picker_cancel_and_directory_target() {
        let dir = TempDir::new().unwrap();
        let service = LocalFileService::new(dir.path());
        assert!(service.pick_save_path("chat.md").await.is_none());

        let service = service.with_save_target(dir.path());
        assert_eq!(
            service.pick_save_path("chat.md").await,
            Some(dir.path().join("chat.md"))
        );
    }
}

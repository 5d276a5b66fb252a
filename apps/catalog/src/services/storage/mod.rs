//! Media storage for uploaded covers and audio files.
//!
//! Files live in a single flat directory and are referenced from track rows
//! by bare file name. Uploads are written by the [`UploadGate`]; the
//! [`MediaStore`] resolves and removes them.

mod naming;
mod upload;

pub use naming::upload_file_name;
pub use upload::{
    MimeFilter, StoredFile, UploadError, UploadGate, UploadedForm, AUDIO_FIELD, COVER_FIELD,
};

use std::path::{Component, Path, PathBuf};

use crate::db::models::PLACEHOLDER_COVER;

/// Flat directory holding every uploaded media file.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the upload directory if it does not exist yet.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Resolves a stored file name to its path.
    ///
    /// Returns `None` for names that are not a single plain path component.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if !name.contains(['/', '\\']) => {
                Some(self.root.join(part))
            }
            _ => None,
        }
    }

    /// Removes a stored file. The placeholder cover is never touched.
    ///
    /// Missing files are ignored; other failures are logged, never returned.
    pub async fn remove(&self, name: &str) {
        if name.is_empty() || name == PLACEHOLDER_COVER {
            return;
        }

        let Some(path) = self.path_for(name) else {
            tracing::warn!(file = %name, "Refusing to remove file outside upload directory");
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = ?path, "File deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "File already gone");
            }
            Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to delete file"),
        }
    }

    /// Removes each of the given stored files.
    pub async fn remove_all<S: AsRef<str>>(&self, names: &[S]) {
        for name in names {
            self.remove(name.as_ref()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_for_rejects_traversal() {
        let store = MediaStore::new("/srv/uploads");

        assert_eq!(
            store.path_for("coverImage-1-2.png"),
            Some(PathBuf::from("/srv/uploads/coverImage-1-2.png"))
        );
        assert!(store.path_for("../secret").is_none());
        assert!(store.path_for("a/b.png").is_none());
        assert!(store.path_for("/etc/passwd").is_none());
        assert!(store.path_for("").is_none());
    }

    #[tokio::test]
    async fn test_remove_deletes_file() {
        let temp = TempDir::new().unwrap();
        let store = MediaStore::new(temp.path());
        let path = temp.path().join("audioFile-1-2.mp3");
        std::fs::write(&path, b"data").unwrap();

        store.remove("audioFile-1-2.mp3").await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_remove_skips_placeholder() {
        let temp = TempDir::new().unwrap();
        let store = MediaStore::new(temp.path());
        let path = temp.path().join(PLACEHOLDER_COVER);
        std::fs::write(&path, b"<svg/>").unwrap();

        store.remove(PLACEHOLDER_COVER).await;

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_remove_all_deletes_each_file() {
        let temp = TempDir::new().unwrap();
        let store = MediaStore::new(temp.path());
        for name in ["coverImage-1-1.png", "audioFile-1-2.mp3"] {
            std::fs::write(temp.path().join(name), b"data").unwrap();
        }

        let names = vec!["coverImage-1-1.png".to_string(), "audioFile-1-2.mp3".to_string()];
        store.remove_all(&names).await;

        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_quiet() {
        let temp = TempDir::new().unwrap();
        let store = MediaStore::new(temp.path());

        store.remove("coverImage-0-0.png").await;
    }
}

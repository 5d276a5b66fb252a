//! Multipart upload gate.
//!
//! Streams file parts to the media directory under generated names while
//! enforcing size, count and type limits. Text parts are collected as form
//! fields. A rejected request leaves nothing behind on disk.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::{naming::upload_file_name, MediaStore};
use crate::config::UploadConfig;
use crate::error::Result;

pub const COVER_FIELD: &str = "coverImage";
pub const AUDIO_FIELD: &str = "audioFile";

const AUDIO_TYPES: &[&str] = &["audio/mpeg", "audio/flac", "audio/wav", "audio/aac"];
const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/jpg"];

/// Reasons the gate turns a request away.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File exceeds the {limit} byte limit")]
    FileTooLarge { limit: u64 },

    #[error("Request body is too large")]
    PayloadTooLarge,

    #[error("Too many files, at most {limit} allowed")]
    TooManyFiles { limit: usize },

    #[error("Unsupported file type '{mime}' for field '{field}'")]
    UnsupportedType { field: String, mime: String },

    #[error("{0}")]
    Malformed(String),
}

impl UploadError {
    /// Error code reported to clients, distinct from validation errors.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            UploadError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            UploadError::TooManyFiles { .. } => "TOO_MANY_FILES",
            UploadError::UnsupportedType { .. } => "UNSUPPORTED_FILE_TYPE",
            UploadError::Malformed(_) => "UPLOAD_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::FileTooLarge { .. } | UploadError::PayloadTooLarge => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn from_multipart(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::PayloadTooLarge
        } else {
            UploadError::Malformed(err.body_text())
        }
    }
}

/// Content types accepted for a file field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeFilter {
    Any,
    Audio,
    Image,
}

impl MimeFilter {
    /// Filter for a field; type checks only apply when enforcement is on.
    pub fn for_field(field: &str, enforce: bool) -> Self {
        match field {
            _ if !enforce => MimeFilter::Any,
            COVER_FIELD => MimeFilter::Image,
            AUDIO_FIELD => MimeFilter::Audio,
            _ => MimeFilter::Any,
        }
    }

    pub fn accepts(&self, content_type: Option<&str>) -> bool {
        let allowed = match self {
            MimeFilter::Any => return true,
            MimeFilter::Audio => AUDIO_TYPES,
            MimeFilter::Image => IMAGE_TYPES,
        };

        content_type
            .and_then(|ct| ct.split(';').next())
            .map(|essence| essence.trim().to_ascii_lowercase())
            .is_some_and(|essence| allowed.contains(&essence.as_str()))
    }
}

/// A file part written to the media directory.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub field: String,
    /// Generated name, as referenced from track rows.
    pub file_name: String,
    pub original_name: Option<String>,
    pub content_type: Option<String>,
    pub path: PathBuf,
    pub size: u64,
}

/// Text fields and stored files of one request.
#[derive(Debug, Default)]
pub struct UploadedForm {
    pub fields: Map<String, Value>,
    pub files: Vec<StoredFile>,
}

impl UploadedForm {
    /// Wraps a JSON object body; such requests carry no files.
    pub fn from_json(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            files: Vec::new(),
        }
    }

    /// Removes every file still held by the form from disk.
    pub async fn discard(self, store: &MediaStore) {
        for file in &self.files {
            tracing::debug!(field = %file.field, file = %file.file_name, "Discarding upload");
            store.remove(&file.file_name).await;
        }
    }
}

/// Accepts multipart requests on behalf of the track routes.
#[derive(Debug, Clone)]
pub struct UploadGate {
    store: MediaStore,
    max_file_size: u64,
    max_file_count: usize,
    enforce_mime_types: bool,
}

impl UploadGate {
    pub fn new(
        store: MediaStore,
        max_file_size: u64,
        max_file_count: usize,
        enforce_mime_types: bool,
    ) -> Self {
        Self {
            store,
            max_file_size,
            max_file_count,
            enforce_mime_types,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            MediaStore::new(config.dir.clone()),
            config.max_file_size,
            config.max_file_count,
            config.enforce_mime_types,
        )
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    /// Reads every part of the request.
    ///
    /// On any error the files already written are removed before returning.
    pub async fn receive(&self, mut multipart: Multipart) -> Result<UploadedForm> {
        let mut form = UploadedForm::default();

        match self.read_parts(&mut multipart, &mut form).await {
            Ok(()) => {
                tracing::debug!(
                    fields = form.fields.len(),
                    files = form.files.len(),
                    "Upload received"
                );
                Ok(form)
            }
            Err(e) => {
                form.discard(&self.store).await;
                Err(e)
            }
        }
    }

    async fn read_parts(&self, multipart: &mut Multipart, form: &mut UploadedForm) -> Result<()> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(UploadError::from_multipart)?
        {
            let name = field.name().unwrap_or_default().to_string();

            if field.file_name().is_none() {
                let value = field.text().await.map_err(UploadError::from_multipart)?;
                form.fields.insert(name, Value::String(value));
                continue;
            }

            if form.files.len() >= self.max_file_count {
                return Err(UploadError::TooManyFiles {
                    limit: self.max_file_count,
                }
                .into());
            }

            let content_type = field.content_type().map(str::to_string);
            if !MimeFilter::for_field(&name, self.enforce_mime_types)
                .accepts(content_type.as_deref())
            {
                return Err(UploadError::UnsupportedType {
                    field: name,
                    mime: content_type.unwrap_or_else(|| "unknown".to_string()),
                }
                .into());
            }

            let original_name = field.file_name().map(str::to_string);
            let file_name =
                upload_file_name(&name, original_name.as_deref(), content_type.as_deref());
            let path = self.store.root().join(&file_name);

            form.files.push(StoredFile {
                field: name,
                file_name,
                original_name,
                content_type,
                path: path.clone(),
                size: 0,
            });

            let size = self.write_field(field, &path).await?;
            if let Some(stored) = form.files.last_mut() {
                stored.size = size;
            }
        }

        Ok(())
    }

    async fn write_field(&self, mut field: Field<'_>, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = field.chunk().await.map_err(UploadError::from_multipart)? {
            written += chunk.len() as u64;
            if written > self.max_file_size {
                return Err(UploadError::FileTooLarge {
                    limit: self.max_file_size,
                }
                .into());
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_only_apply_when_enforced() {
        assert_eq!(MimeFilter::for_field(COVER_FIELD, false), MimeFilter::Any);
        assert_eq!(MimeFilter::for_field(COVER_FIELD, true), MimeFilter::Image);
        assert_eq!(MimeFilter::for_field(AUDIO_FIELD, true), MimeFilter::Audio);
        assert_eq!(MimeFilter::for_field("notes", true), MimeFilter::Any);
    }

    #[test]
    fn test_image_filter() {
        let filter = MimeFilter::Image;
        assert!(filter.accepts(Some("image/png")));
        assert!(filter.accepts(Some("IMAGE/JPEG")));
        assert!(filter.accepts(Some("image/jpg")));
        assert!(!filter.accepts(Some("image/gif")));
        assert!(!filter.accepts(None));
    }

    #[test]
    fn test_audio_filter_ignores_parameters() {
        let filter = MimeFilter::Audio;
        assert!(filter.accepts(Some("audio/mpeg; charset=binary")));
        assert!(filter.accepts(Some("audio/flac")));
        assert!(!filter.accepts(Some("video/mp4")));
    }

    #[test]
    fn test_any_filter_accepts_missing_type() {
        assert!(MimeFilter::Any.accepts(None));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(UploadError::FileTooLarge { limit: 1 }.code(), "FILE_TOO_LARGE");
        assert_eq!(UploadError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            UploadError::UnsupportedType {
                field: "coverImage".to_string(),
                mime: "image/gif".to_string()
            }
            .code(),
            "UNSUPPORTED_FILE_TYPE"
        );
        assert_eq!(
            UploadError::Malformed("bad boundary".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

}

//! Audio properties and cover dimensions read from stored uploads.

use image::io::Reader as ImageReader;
use lofty::error::LoftyError;
use lofty::file::FileType;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db::models::Dimensions;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Unreadable audio: {0}")]
    Audio(#[from] LoftyError),

    #[error("Unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata task failed: {0}")]
    Task(String),
}

/// Technical properties of an audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioProperties {
    /// kbps
    pub bitrate: u32,
    /// seconds, rounded
    pub duration: u32,
    /// Hz
    pub sample_rate: u32,
    /// Short container name such as `mp3` or `flac`.
    pub file_type: String,
}

/// Probes an audio file by content, not by extension.
pub fn read_audio_properties(path: &Path) -> Result<AudioProperties, MetadataError> {
    let tagged_file = Probe::open(path)?.guess_file_type()?.read()?;
    let properties = tagged_file.properties();

    let file_type = container_name(tagged_file.file_type())
        .map(str::to_string)
        .or_else(|| file_type_from_extension(path))
        .unwrap_or_default();

    Ok(AudioProperties {
        bitrate: properties.audio_bitrate().unwrap_or(0),
        duration: properties.duration().as_secs_f64().round() as u32,
        sample_rate: properties.sample_rate().unwrap_or(0),
        file_type,
    })
}

fn container_name(file_type: FileType) -> Option<&'static str> {
    match file_type {
        FileType::Mpeg => Some("mp3"),
        FileType::Flac => Some("flac"),
        FileType::Wav => Some("wav"),
        FileType::Aac => Some("aac"),
        FileType::Aiff => Some("aiff"),
        FileType::Mp4 => Some("m4a"),
        FileType::Opus => Some("opus"),
        FileType::Vorbis => Some("ogg"),
        FileType::Ape => Some("ape"),
        FileType::WavPack => Some("wv"),
        _ => None,
    }
}

/// Lowercased extension of `path`, if any.
pub fn file_type_from_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Pixel size of an image, detected from its content.
pub fn read_image_dimensions(path: &Path) -> Result<Dimensions, MetadataError> {
    let (width, height) = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(Dimensions { width, height })
}

/// Runs [`read_audio_properties`] on the blocking pool.
pub async fn audio_properties(path: PathBuf) -> Result<AudioProperties, MetadataError> {
    tokio::task::spawn_blocking(move || read_audio_properties(&path))
        .await
        .map_err(|e| MetadataError::Task(e.to_string()))?
}

/// Runs [`read_image_dimensions`] on the blocking pool.
pub async fn image_dimensions(path: PathBuf) -> Result<Dimensions, MetadataError> {
    tokio::task::spawn_blocking(move || read_image_dimensions(&path))
        .await
        .map_err(|e| MetadataError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageOutputFormat};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        GrayImage::new(width, height)
            .write_to(&mut file, ImageOutputFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn test_image_dimensions_from_png() {
        let temp = TempDir::new().unwrap();
        let path = write_png(temp.path(), "cover.png", 40, 30);

        let dims = read_image_dimensions(&path).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                width: 40,
                height: 30
            }
        );
    }

    #[test]
    fn test_image_detected_by_content_not_extension() {
        let temp = TempDir::new().unwrap();
        let path = write_png(temp.path(), "coverImage-1-2", 8, 8);

        assert_eq!(read_image_dimensions(&path).unwrap().width, 8);
    }

    #[test]
    fn test_garbage_is_not_an_image() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cover.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(read_image_dimensions(&path).is_err());
    }

    #[test]
    fn test_garbage_is_not_audio() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("track.mp3");
        std::fs::write(&path, b"not audio").unwrap();

        assert!(read_audio_properties(&path).is_err());
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            file_type_from_extension(Path::new("audioFile-1-2.FLAC")),
            Some("flac".to_string())
        );
        assert_eq!(file_type_from_extension(Path::new("audioFile-1-2")), None);
    }

    #[tokio::test]
    async fn test_async_wrapper_runs_on_blocking_pool() {
        let temp = TempDir::new().unwrap();
        let path = write_png(temp.path(), "cover.png", 12, 16);

        let dims = image_dimensions(path).await.unwrap();
        assert_eq!(dims.height, 16);
    }
}

//! Generated names for uploaded files.
//!
//! Uploads land in a flat directory as `<field>-<unix millis>-<random>.<ext>`.

use rand::Rng;
use std::path::Path;

/// Upper bound (exclusive) of the random suffix.
const RANDOM_SUFFIX_BOUND: u32 = 1_000_000_000;

/// Builds a unique storage name for an uploaded part.
///
/// The extension comes from the client filename when it has one, otherwise
/// from the part's content type.
pub fn upload_file_name(
    field: &str,
    original_name: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = rand::thread_rng().gen_range(0..RANDOM_SUFFIX_BOUND);
    let stem = format!("{}-{}-{}", sanitize_component(field), millis, suffix);

    match extension_for(original_name, content_type) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn extension_for(original_name: Option<&str>, content_type: Option<&str>) -> Option<String> {
    let from_name = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string);

    from_name.or_else(|| content_type.and_then(extension_for_mime))
}

fn extension_for_mime(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let known = match essence.as_str() {
        "audio/mpeg" => Some("mp3"),
        "audio/flac" => Some("flac"),
        "audio/wav" => Some("wav"),
        "audio/aac" => Some("aac"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    };

    known.map(str::to_string).or_else(|| {
        mime_guess::get_mime_extensions_str(&essence)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(name: &str) -> Vec<&str> {
        name.split(['-', '.']).collect()
    }

    #[test]
    fn test_name_has_field_timestamp_random_and_extension() {
        let name = upload_file_name("coverImage", Some("My Cover.PNG"), Some("image/png"));
        let parts = parts(&name);

        assert_eq!(parts.len(), 4, "unexpected name {}", name);
        assert_eq!(parts[0], "coverImage");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u32>().unwrap() < RANDOM_SUFFIX_BOUND);
        assert_eq!(parts[3], "PNG");
    }

    #[test]
    fn test_extension_falls_back_to_content_type() {
        let name = upload_file_name("audioFile", Some("blob"), Some("audio/mpeg"));
        assert!(name.ends_with(".mp3"), "unexpected name {}", name);
    }

    #[test]
    fn test_no_extension_when_nothing_is_known() {
        let name = upload_file_name("audioFile", None, None);
        assert!(!name.contains('.'));
    }

    #[test]
    fn test_field_name_cannot_escape_directory() {
        let name = upload_file_name("../etc/passwd", Some("x.txt"), None);
        assert!(!name.contains('/'));
        assert!(name.starts_with("___etc_passwd-"));
    }

    #[test]
    fn test_successive_names_differ() {
        let a = upload_file_name("coverImage", Some("a.png"), None);
        let b = upload_file_name("coverImage", Some("a.png"), None);
        assert_ne!(a, b);
    }
}

//! Track form fields, as received from multipart or JSON bodies.
//!
//! Multipart bodies deliver every field as text; JSON bodies may use numbers
//! and structured lists. Both go through the same parsing here.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db::models::{Contributor, ContributorRole, TrackKind};
use crate::error::{AppError, Result};

/// Contributor input that could not be used; callers fall back instead of failing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("contributors ignored: {reason}")]
pub struct ContributorFallback {
    pub reason: String,
}

impl ContributorFallback {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type ParsedContributors = std::result::Result<Vec<Contributor>, ContributorFallback>;

/// Parses a contributor list given as JSON text or as a structured list.
///
/// Every entry needs a non-empty `name` and a known `role`.
pub fn parse_contributors(raw: &Value) -> ParsedContributors {
    let decoded;
    let list = match raw {
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text)
                .map_err(|e| ContributorFallback::new(format!("invalid JSON: {}", e)))?;
            &decoded
        }
        other => other,
    };

    let items = list
        .as_array()
        .ok_or_else(|| ContributorFallback::new("expected a list"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_contributor(index, item))
        .collect()
}

fn parse_contributor(
    index: usize,
    item: &Value,
) -> std::result::Result<Contributor, ContributorFallback> {
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ContributorFallback::new(format!("entry {} has no name", index)))?;

    let role = item
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| ContributorFallback::new(format!("entry {} has no role", index)))?
        .parse::<ContributorRole>()
        .map_err(ContributorFallback::new)?;

    Ok(Contributor {
        name: name.to_string(),
        role,
    })
}

/// What the request says about the parent album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlbumRef {
    /// Field not sent.
    #[default]
    Absent,
    /// Sent empty or `null`.
    Clear,
    Set(i64),
}

/// Caller-supplied audio properties, used when extraction yields nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioOverrides {
    pub bitrate: Option<u32>,
    pub duration: Option<u32>,
    pub sample_rate: Option<u32>,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTrack {
    pub title: String,
    pub kind: TrackKind,
    pub genre: String,
    /// `None` when the field was not sent.
    pub contributors: Option<ParsedContributors>,
    pub listen_count: Option<u64>,
    pub publish_date: Option<DateTime<Utc>>,
    pub album: AlbumRef,
    pub track_number: Option<u32>,
    pub audio: AudioOverrides,
}

impl CreateTrack {
    pub fn from_form(fields: &Map<String, Value>) -> Result<Self> {
        let form = FormFields(fields);

        let (Some(title), Some(kind), Some(genre)) =
            (form.text("title"), form.kind()?, form.text("genre"))
        else {
            return Err(AppError::validation("Title, kind, and genre are required"));
        };

        Ok(Self {
            title,
            kind,
            genre,
            contributors: form.contributors(),
            listen_count: form.integer("listenCount")?,
            publish_date: form.date("publishDate")?,
            album: form.album()?,
            track_number: form.integer("trackNumber")?,
            audio: form.audio_overrides()?,
        })
    }
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateTrack {
    pub title: Option<String>,
    pub kind: Option<TrackKind>,
    pub genre: Option<String>,
    pub contributors: Option<ParsedContributors>,
    pub listen_count: Option<u64>,
    pub publish_date: Option<DateTime<Utc>>,
    pub album: AlbumRef,
    pub track_number: Option<u32>,
    pub audio: AudioOverrides,
}

impl UpdateTrack {
    pub fn from_form(fields: &Map<String, Value>) -> Result<Self> {
        let form = FormFields(fields);

        Ok(Self {
            title: form.text("title"),
            kind: form.kind()?,
            genre: form.text("genre"),
            contributors: form.contributors(),
            listen_count: form.integer("listenCount")?,
            publish_date: form.date("publishDate")?,
            album: form.album()?,
            track_number: form.integer("trackNumber")?,
            audio: form.audio_overrides()?,
        })
    }
}

struct FormFields<'a>(&'a Map<String, Value>);

impl FormFields<'_> {
    /// Trimmed text; blank counts as absent.
    fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn integer<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: TryFrom<u64>,
    {
        let invalid = || AppError::validation(format!("{} must be a non-negative integer", key));

        let value = match self.0.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(invalid)?,
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
            Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| invalid())?,
            Some(_) => return Err(invalid()),
        };

        // Stored as SQLite INTEGER, which is signed 64-bit.
        if i64::try_from(value).is_err() {
            return Err(invalid());
        }

        T::try_from(value).map(Some).map_err(|_| invalid())
    }

    fn date(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(text) = self.text(key) else {
            return Ok(None);
        };

        if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
            return Ok(Some(parsed.with_timezone(&Utc)));
        }

        NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Some(naive.and_utc()))
            .ok_or_else(|| {
                AppError::validation(format!(
                    "{} must be an RFC 3339 timestamp or a YYYY-MM-DD date",
                    key
                ))
            })
    }

    /// `kind`, or the legacy `type` field.
    fn kind(&self) -> Result<Option<TrackKind>> {
        self.text("kind")
            .or_else(|| self.text("type"))
            .map(|value| value.parse::<TrackKind>().map_err(AppError::Validation))
            .transpose()
    }

    fn album(&self) -> Result<AlbumRef> {
        let invalid = || AppError::validation("Album must reference an existing album");

        match self.0.get("album") {
            None => Ok(AlbumRef::Absent),
            Some(Value::Null) => Ok(AlbumRef::Clear),
            Some(Value::Number(n)) => n.as_i64().map(AlbumRef::Set).ok_or_else(invalid),
            Some(Value::String(s)) => match s.trim() {
                "" | "null" => Ok(AlbumRef::Clear),
                id => id.parse::<i64>().map(AlbumRef::Set).map_err(|_| invalid()),
            },
            Some(_) => Err(invalid()),
        }
    }

    fn contributors(&self) -> Option<ParsedContributors> {
        match self.0.get("contributors")? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            raw => Some(parse_contributors(raw)),
        }
    }

    fn audio_overrides(&self) -> Result<AudioOverrides> {
        Ok(AudioOverrides {
            bitrate: self.integer("bitrate")?,
            duration: self.integer("duration")?,
            sample_rate: self.integer("sampleRate")?,
            file_type: self.text("fileType").map(|t| t.to_ascii_lowercase()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_create_requires_title_kind_and_genre() {
        for body in [
            json!({"kind": "Single", "genre": "Rock"}),
            json!({"title": "Song A", "genre": "Rock"}),
            json!({"title": "Song A", "kind": "Single"}),
            json!({"title": "   ", "kind": "Single", "genre": "Rock"}),
        ] {
            let err = CreateTrack::from_form(&fields(body)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[test]
    fn test_create_from_multipart_text() {
        let form = CreateTrack::from_form(&fields(json!({
            "title": "  Song A ",
            "kind": "single",
            "genre": "Rock",
            "listenCount": "12",
            "publishDate": "2024-03-01",
            "trackNumber": "2",
            "album": "5",
            "bitrate": "320",
            "fileType": "MP3",
        })))
        .unwrap();

        assert_eq!(form.title, "Song A");
        assert_eq!(form.kind, TrackKind::Single);
        assert_eq!(form.listen_count, Some(12));
        assert_eq!(form.track_number, Some(2));
        assert_eq!(form.album, AlbumRef::Set(5));
        assert_eq!(form.audio.bitrate, Some(320));
        assert_eq!(form.audio.file_type.as_deref(), Some("mp3"));
        assert_eq!(
            form.publish_date.unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
        assert!(form.contributors.is_none());
    }

    #[test]
    fn test_legacy_type_field_is_accepted() {
        let form = CreateTrack::from_form(&fields(json!({
            "title": "A", "type": "Album", "genre": "Jazz"
        })))
        .unwrap();
        assert_eq!(form.kind, TrackKind::Album);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = UpdateTrack::from_form(&fields(json!({"kind": "EP"}))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_negative_or_garbage_numbers_are_rejected() {
        for body in [
            json!({"listenCount": "-1"}),
            json!({"listenCount": "ten"}),
            json!({"trackNumber": -3}),
            json!({"sampleRate": "99999999999"}),
        ] {
            assert!(UpdateTrack::from_form(&fields(body)).is_err());
        }
    }

    #[test]
    fn test_counts_beyond_signed_range_are_rejected() {
        for body in [
            json!({"listenCount": "18446744073709551615"}),
            json!({"listenCount": 9223372036854775808u64}),
        ] {
            let err = UpdateTrack::from_form(&fields(body)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }

        let form = UpdateTrack::from_form(&fields(json!({"listenCount": i64::MAX}))).unwrap();
        assert_eq!(form.listen_count, Some(i64::MAX as u64));
    }

    #[test]
    fn test_rfc3339_publish_date() {
        let form =
            UpdateTrack::from_form(&fields(json!({"publishDate": "2023-05-06T07:08:09+02:00"})))
                .unwrap();
        assert_eq!(
            form.publish_date.unwrap().to_rfc3339(),
            "2023-05-06T05:08:09+00:00"
        );

        assert!(UpdateTrack::from_form(&fields(json!({"publishDate": "yesterday"}))).is_err());
    }

    #[test]
    fn test_album_reference_forms() {
        let parse = |value: Value| UpdateTrack::from_form(&fields(value)).map(|f| f.album);

        assert_eq!(parse(json!({})).unwrap(), AlbumRef::Absent);
        assert_eq!(parse(json!({"album": ""})).unwrap(), AlbumRef::Clear);
        assert_eq!(parse(json!({"album": "null"})).unwrap(), AlbumRef::Clear);
        assert_eq!(parse(json!({"album": null})).unwrap(), AlbumRef::Clear);
        assert_eq!(parse(json!({"album": 9})).unwrap(), AlbumRef::Set(9));
        assert!(parse(json!({"album": "65a1f0"})).is_err());
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let form = UpdateTrack::from_form(&Map::new()).unwrap();
        assert_eq!(form, UpdateTrack::default());
        assert_eq!(form.audio, AudioOverrides::default());
    }

    #[test]
    fn test_contributors_from_json_text() {
        let raw = json!(r#"[{"name":" Ada ","role":"Artist"},{"name":"Bo","role":"Producer"}]"#);
        let parsed = parse_contributors(&raw).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "Ada");
        assert_eq!(parsed[1].role, ContributorRole::Producer);
    }

    #[test]
    fn test_contributors_from_structured_list() {
        let raw = json!([{"name": "Ada", "role": "Composer"}]);
        assert_eq!(
            parse_contributors(&raw).unwrap(),
            vec![Contributor {
                name: "Ada".to_string(),
                role: ContributorRole::Composer
            }]
        );
    }

    #[test]
    fn test_contributor_fallback_cases() {
        for raw in [
            json!("not json"),
            json!(r#"{"name":"Ada"}"#),
            json!([{"name": "Ada", "role": "Drummer"}]),
            json!([{"name": "  ", "role": "Artist"}]),
            json!([{"role": "Artist"}]),
        ] {
            assert!(parse_contributors(&raw).is_err(), "accepted {}", raw);
        }
    }

    #[test]
    fn test_blank_contributors_count_as_absent() {
        let form = UpdateTrack::from_form(&fields(json!({"contributors": "  "}))).unwrap();
        assert!(form.contributors.is_none());

        let form = UpdateTrack::from_form(&fields(json!({"contributors": "oops"}))).unwrap();
        assert!(matches!(form.contributors, Some(Err(_))));
    }
}

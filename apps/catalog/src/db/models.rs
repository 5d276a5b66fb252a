use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Shared default cover; never validated, never deleted.
pub const PLACEHOLDER_COVER: &str = "placeholder-image.svg";

/// Exact pixel size every uploaded cover must have.
pub const REQUIRED_COVER_SIZE: Dimensions = Dimensions {
    width: 3000,
    height: 3000,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Single,
    Album,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Single => "Single",
            TrackKind::Album => "Album",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(TrackKind::Single),
            "album" => Ok(TrackKind::Album),
            other => Err(format!("Unknown kind '{}', expected Single or Album", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributorRole {
    Artist,
    Producer,
    Composer,
    Lyricist,
    Arranger,
    Engineer,
    Performer,
    Writer,
    Other,
}

impl ContributorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributorRole::Artist => "Artist",
            ContributorRole::Producer => "Producer",
            ContributorRole::Composer => "Composer",
            ContributorRole::Lyricist => "Lyricist",
            ContributorRole::Arranger => "Arranger",
            ContributorRole::Engineer => "Engineer",
            ContributorRole::Performer => "Performer",
            ContributorRole::Writer => "Writer",
            ContributorRole::Other => "Other",
        }
    }
}

impl FromStr for ContributorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Artist" => Ok(ContributorRole::Artist),
            "Producer" => Ok(ContributorRole::Producer),
            "Composer" => Ok(ContributorRole::Composer),
            "Lyricist" => Ok(ContributorRole::Lyricist),
            "Arranger" => Ok(ContributorRole::Arranger),
            "Engineer" => Ok(ContributorRole::Engineer),
            "Performer" => Ok(ContributorRole::Performer),
            "Writer" => Ok(ContributorRole::Writer),
            "Other" => Ok(ContributorRole::Other),
            other => Err(format!("Unknown contributor role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub role: ContributorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn is_required_cover_size(&self) -> bool {
        *self == REQUIRED_COVER_SIZE
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Audio columns carried only by singles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFields {
    pub audio_file: String,
    /// kbps
    pub bitrate: u32,
    /// seconds
    pub duration: u32,
    /// Hz
    pub sample_rate: u32,
    pub file_type: String,
}

/// Fields shared by singles and albums.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFields {
    pub title: String,
    pub genre: String,
    pub contributors: Vec<Contributor>,
    pub listen_count: u64,
    pub publish_date: DateTime<Utc>,
    pub cover_image: String,
    pub cover_image_dimensions: Dimensions,
    pub track_number: Option<u32>,
}

impl TrackFields {
    pub fn has_placeholder_cover(&self) -> bool {
        self.cover_image == PLACEHOLDER_COVER
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRecord {
    #[serde(flatten)]
    pub fields: TrackFields,
    /// Parent album; `None` for a standalone single.
    pub album: Option<i64>,
    #[serde(flatten)]
    pub audio: AudioFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRecord {
    #[serde(flatten)]
    pub fields: TrackFields,
    /// Number of tracks referencing this album, filled in by listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum TrackRecord {
    Single(SingleRecord),
    Album(AlbumRecord),
}

impl TrackRecord {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackRecord::Single(_) => TrackKind::Single,
            TrackRecord::Album(_) => TrackKind::Album,
        }
    }

    pub fn fields(&self) -> &TrackFields {
        match self {
            TrackRecord::Single(single) => &single.fields,
            TrackRecord::Album(album) => &album.fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut TrackFields {
        match self {
            TrackRecord::Single(single) => &mut single.fields,
            TrackRecord::Album(album) => &mut album.fields,
        }
    }

    pub fn audio(&self) -> Option<&AudioFields> {
        match self {
            TrackRecord::Single(single) => Some(&single.audio),
            TrackRecord::Album(_) => None,
        }
    }

    pub fn album(&self) -> Option<i64> {
        match self {
            TrackRecord::Single(single) => single.album,
            TrackRecord::Album(_) => None,
        }
    }

    /// Converts the record to `kind`, keeping the shared fields.
    ///
    /// Returns the audio fields dropped when a single becomes an album.
    pub fn into_kind(self, kind: TrackKind) -> (TrackRecord, Option<AudioFields>) {
        match (self, kind) {
            (TrackRecord::Single(single), TrackKind::Album) => (
                TrackRecord::Album(AlbumRecord {
                    fields: single.fields,
                    track_count: None,
                }),
                Some(single.audio),
            ),
            (TrackRecord::Album(album), TrackKind::Single) => (
                TrackRecord::Single(SingleRecord {
                    fields: album.fields,
                    album: None,
                    audio: AudioFields::default(),
                }),
                None,
            ),
            (record, _) => (record, None),
        }
    }

    /// Checks the invariants the store relies on.
    pub fn validate(&self) -> Result<(), String> {
        let fields = self.fields();
        if fields.title.trim().is_empty() {
            return Err("Title is required".to_string());
        }
        if fields.genre.trim().is_empty() {
            return Err("Genre is required".to_string());
        }
        if fields.cover_image.is_empty() {
            return Err("Cover image reference is missing".to_string());
        }
        if !fields.has_placeholder_cover() && !fields.cover_image_dimensions.is_required_cover_size()
        {
            return Err(format!(
                "Cover image must be exactly {} pixels",
                REQUIRED_COVER_SIZE
            ));
        }
        if fields.contributors.iter().any(|c| c.name.trim().is_empty()) {
            return Err("Contributor names cannot be empty".to_string());
        }
        Ok(())
    }

    /// Uploaded files owned by this record, excluding the shared placeholder.
    pub fn media_files(&self) -> Vec<&str> {
        let mut files = Vec::new();
        let fields = self.fields();
        if !fields.has_placeholder_cover() && !fields.cover_image.is_empty() {
            files.push(fields.cover_image.as_str());
        }
        if let Some(audio) = self.audio() {
            if !audio.audio_file.is_empty() {
                files.push(audio.audio_file.as_str());
            }
        }
        files
    }
}

/// A stored catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: i64,
    #[serde(flatten)]
    pub record: TrackRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//! Track service: catalog reads, and writes driven by uploaded forms.
//!
//! Handlers hand over an [`UploadedForm`]; the service validates it, measures
//! uploaded media, writes the store and removes any upload that did not end
//! up referenced by a saved record.

pub mod form;

use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::models::{
    AlbumRecord, AudioFields, Dimensions, SingleRecord, Track, TrackFields, TrackKind, TrackRecord,
    PLACEHOLDER_COVER, REQUIRED_COVER_SIZE,
};
use crate::db::queries::{self, CatalogFilter};
use crate::error::{AppError, Result};
use crate::services::metadata::{self, AudioProperties};
use crate::services::storage::{MediaStore, StoredFile, UploadedForm, AUDIO_FIELD, COVER_FIELD};

pub use form::{
    parse_contributors, AlbumRef, AudioOverrides, ContributorFallback, CreateTrack, UpdateTrack,
};

/// Genre values used by clients as listing categories rather than filters.
const UNFILTERED_GENRES: &[&str] = &["all", "new", "popular", "featured"];

/// Page selection for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    /// Page numbers start at 1; a zero size falls back to the default.
    pub fn new(page: Option<u32>, size: Option<u32>) -> Self {
        let size = match size {
            None | Some(0) => Self::DEFAULT_SIZE,
            Some(size) => size.min(Self::MAX_SIZE),
        };

        Self {
            page: page.unwrap_or(1).max(1),
            size,
        }
    }

    fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }

    fn pages(&self, count: u64) -> u64 {
        count.div_ceil(u64::from(self.size))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of catalog records.
#[derive(Debug, Serialize)]
pub struct TrackPage {
    pub tracks: Vec<Track>,
    pub page: u32,
    pub pages: u64,
    pub count: u64,
}

pub struct TrackService {
    db: Arc<Mutex<Connection>>,
    media: MediaStore,
}

impl TrackService {
    pub fn new(db: Arc<Mutex<Connection>>, media: MediaStore) -> Self {
        Self { db, media }
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Standalone singles and albums, newest first.
    pub async fn list(&self, genre: Option<&str>, page: PageRequest) -> Result<TrackPage> {
        let genre = genre
            .map(str::trim)
            .filter(|g| !g.is_empty() && !UNFILTERED_GENRES.contains(g));

        let filter = CatalogFilter { genre, text: None };
        self.page(&filter, page).await
    }

    /// Visible records whose title, genre or a contributor name contains `query`.
    pub async fn search(&self, query: Option<&str>, page: PageRequest) -> Result<TrackPage> {
        let text = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::validation("Search query is required"))?;

        let filter = CatalogFilter {
            genre: None,
            text: Some(text),
        };
        self.page(&filter, page).await
    }

    async fn page(&self, filter: &CatalogFilter<'_>, page: PageRequest) -> Result<TrackPage> {
        let db = self.db.lock().await;
        let count = queries::count_visible(&db, filter)?;
        let tracks = queries::list_visible(&db, filter, page.size, page.offset())?;

        Ok(TrackPage {
            tracks,
            page: page.page,
            pages: page.pages(count),
            count,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Track> {
        let id = parse_id(id)?;
        let db = self.db.lock().await;
        queries::find_track(&db, id)?.ok_or_else(AppError::track_not_found)
    }

    /// Children of an album by track number. Unknown ids yield an empty list.
    pub async fn album_tracks(&self, album_id: &str) -> Result<Vec<Track>> {
        let Ok(album_id) = album_id.trim().parse::<i64>() else {
            return Ok(Vec::new());
        };
        let db = self.db.lock().await;
        Ok(queries::album_tracks(&db, album_id)?)
    }

    pub async fn genres(&self) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        Ok(queries::distinct_genres(&db)?)
    }

    /// Creates a record from a form. Uploads the record does not use are removed.
    pub async fn create(&self, upload: UploadedForm) -> Result<Track> {
        let UploadedForm { fields, files } = upload;
        let form = CreateTrack::from_form(&fields);

        let result = match form {
            Ok(form) => self.create_record(form, &files).await,
            Err(e) => Err(e),
        };

        let keep = result
            .as_ref()
            .map(|track| track.record.media_files())
            .unwrap_or_default();
        self.discard_unused(&files, &keep).await;

        result
    }

    async fn create_record(&self, form: CreateTrack, files: &[StoredFile]) -> Result<Track> {
        let (cover_image, cover_image_dimensions) = match self.measure_cover(files).await? {
            Some(cover) => cover,
            None => (PLACEHOLDER_COVER.to_string(), REQUIRED_COVER_SIZE),
        };

        let contributors = match form.contributors {
            None => Vec::new(),
            Some(Ok(contributors)) => contributors,
            Some(Err(fallback)) => {
                tracing::warn!(reason = %fallback.reason, "Using empty contributor list");
                Vec::new()
            }
        };

        let fields = TrackFields {
            title: form.title,
            genre: form.genre,
            contributors,
            listen_count: form.listen_count.unwrap_or(0),
            publish_date: form.publish_date.unwrap_or_else(chrono::Utc::now),
            cover_image,
            cover_image_dimensions,
            track_number: form.track_number,
        };

        let mut record = match form.kind {
            TrackKind::Single => {
                let audio = find_file(files, AUDIO_FIELD);
                TrackRecord::Single(SingleRecord {
                    fields,
                    album: None,
                    audio: self.audio_fields(audio, &form.audio).await,
                })
            }
            TrackKind::Album => TrackRecord::Album(AlbumRecord {
                fields,
                track_count: None,
            }),
        };

        record.validate().map_err(AppError::Validation)?;

        let db = self.db.lock().await;
        apply_album_ref(&db, None, &mut record, form.album)?;
        let id = queries::insert_track(&db, &record)?;
        let track = queries::find_track(&db, id)?
            .ok_or_else(|| AppError::Internal(format!("Track {} vanished after insert", id)))?;

        tracing::info!(
            track_id = id,
            kind = %track.record.kind(),
            title = %track.record.fields().title,
            "Track created"
        );
        Ok(track)
    }

    /// Applies a partial update. Replaced media files are removed once saved.
    pub async fn update(&self, id: &str, upload: UploadedForm) -> Result<Track> {
        let UploadedForm { fields, files } = upload;

        let result = match (parse_id(id), UpdateTrack::from_form(&fields)) {
            (Ok(id), Ok(form)) => self.update_record(id, form, &files).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        match result {
            Ok((track, replaced)) => {
                self.discard_unused(&files, &track.record.media_files())
                    .await;
                self.media.remove_all(&replaced).await;
                Ok(track)
            }
            Err(e) => {
                self.discard_unused(&files, &[]).await;
                Err(e)
            }
        }
    }

    async fn update_record(
        &self,
        id: i64,
        form: UpdateTrack,
        files: &[StoredFile],
    ) -> Result<(Track, Vec<String>)> {
        let existing = {
            let db = self.db.lock().await;
            queries::find_track(&db, id)?.ok_or_else(AppError::track_not_found)?
        };

        let cover = self.measure_cover(files).await?;

        let kind = form.kind.unwrap_or(existing.record.kind());
        let (mut record, dropped_audio) = existing.record.clone().into_kind(kind);
        if let Some(audio) = &dropped_audio {
            tracing::debug!(track_id = id, file = %audio.audio_file, "Dropping audio of converted single");
        }

        apply_shared_fields(id, record.fields_mut(), &form, cover);

        if let TrackRecord::Single(single) = &mut record {
            match find_file(files, AUDIO_FIELD) {
                Some(file) => single.audio = self.audio_fields(Some(file), &form.audio).await,
                None => apply_overrides(&mut single.audio, &form.audio),
            }
        }

        record.validate().map_err(AppError::Validation)?;

        let db = self.db.lock().await;
        apply_album_ref(&db, Some(id), &mut record, form.album)?;

        if existing.record.kind() == TrackKind::Album && kind == TrackKind::Single {
            let detached = queries::detach_children(&db, id)?;
            if detached > 0 {
                tracing::info!(track_id = id, detached, "Detached tracks from former album");
            }
        }

        if !queries::save_track(&db, id, &record)? {
            return Err(AppError::track_not_found());
        }
        let track = queries::find_track(&db, id)?.ok_or_else(AppError::track_not_found)?;

        let current = track.record.media_files();
        let replaced = existing
            .record
            .media_files()
            .into_iter()
            .filter(|name| !current.contains(name))
            .map(str::to_string)
            .collect();

        tracing::info!(track_id = id, kind = %kind, "Track updated");
        Ok((track, replaced))
    }

    /// Deletes a record, then its cover and audio files.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = parse_id(id)?;

        let track = {
            let db = self.db.lock().await;
            let track = queries::find_track(&db, id)?.ok_or_else(AppError::track_not_found)?;
            if !queries::delete_track(&db, id)? {
                return Err(AppError::track_not_found());
            }
            track
        };

        self.media.remove_all(&track.record.media_files()).await;

        tracing::info!(track_id = id, kind = %track.record.kind(), "Track deleted");
        Ok(())
    }

    /// Measures the uploaded covers, if any. Every cover part must be
    /// 3000x3000; the first one is kept.
    async fn measure_cover(&self, files: &[StoredFile]) -> Result<Option<(String, Dimensions)>> {
        let mut first = None;

        for file in files.iter().filter(|f| f.field == COVER_FIELD) {
            let dimensions = metadata::image_dimensions(file.path.clone())
                .await
                .map_err(|e| {
                    tracing::debug!(file = %file.file_name, error = %e, "Unreadable cover image");
                    AppError::validation("Cover image could not be read")
                })?;

            if !dimensions.is_required_cover_size() {
                tracing::debug!(file = %file.file_name, %dimensions, "Cover image has wrong size");
                return Err(AppError::validation(format!(
                    "Cover image must be exactly {} pixels",
                    REQUIRED_COVER_SIZE
                )));
            }

            first.get_or_insert_with(|| (file.file_name.clone(), dimensions));
        }

        Ok(first)
    }

    /// Audio fields for a single: extracted values first, then overrides, then zero.
    async fn audio_fields(
        &self,
        file: Option<&StoredFile>,
        overrides: &AudioOverrides,
    ) -> AudioFields {
        let Some(file) = file else {
            let mut audio = AudioFields::default();
            apply_overrides(&mut audio, overrides);
            return audio;
        };

        let extracted = match metadata::audio_properties(file.path.clone()).await {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!(file = %file.file_name, error = %e, "Audio metadata extraction failed");
                AudioProperties::default()
            }
        };

        let file_type = Some(extracted.file_type)
            .filter(|t| !t.is_empty())
            .or_else(|| overrides.file_type.clone())
            .or_else(|| metadata::file_type_from_extension(&file.path))
            .unwrap_or_default();

        AudioFields {
            audio_file: file.file_name.clone(),
            bitrate: prefer_extracted(extracted.bitrate, overrides.bitrate),
            duration: prefer_extracted(extracted.duration, overrides.duration),
            sample_rate: prefer_extracted(extracted.sample_rate, overrides.sample_rate),
            file_type,
        }
    }

    async fn discard_unused(&self, files: &[StoredFile], keep: &[&str]) {
        for file in files {
            if !keep.contains(&file.file_name.as_str()) {
                tracing::debug!(field = %file.field, file = %file.file_name, "Discarding unused upload");
                self.media.remove(&file.file_name).await;
            }
        }
    }
}

/// Identifiers that do not parse are lookups that miss.
fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::track_not_found())
}

fn find_file<'a>(files: &'a [StoredFile], field: &str) -> Option<&'a StoredFile> {
    files.iter().find(|f| f.field == field)
}

fn prefer_extracted(extracted: u32, fallback: Option<u32>) -> u32 {
    if extracted > 0 {
        extracted
    } else {
        fallback.unwrap_or(0)
    }
}

fn apply_overrides(audio: &mut AudioFields, overrides: &AudioOverrides) {
    if let Some(bitrate) = overrides.bitrate {
        audio.bitrate = bitrate;
    }
    if let Some(duration) = overrides.duration {
        audio.duration = duration;
    }
    if let Some(sample_rate) = overrides.sample_rate {
        audio.sample_rate = sample_rate;
    }
    if let Some(file_type) = &overrides.file_type {
        audio.file_type = file_type.clone();
    }
}

fn apply_shared_fields(
    id: i64,
    fields: &mut TrackFields,
    form: &UpdateTrack,
    cover: Option<(String, Dimensions)>,
) {
    if let Some(title) = &form.title {
        fields.title = title.clone();
    }
    if let Some(genre) = &form.genre {
        fields.genre = genre.clone();
    }
    match &form.contributors {
        Some(Ok(contributors)) => fields.contributors = contributors.clone(),
        Some(Err(fallback)) => {
            tracing::warn!(track_id = id, reason = %fallback.reason, "Keeping existing contributors");
        }
        None => {}
    }
    if let Some(listen_count) = form.listen_count {
        fields.listen_count = listen_count;
    }
    if let Some(publish_date) = form.publish_date {
        fields.publish_date = publish_date;
    }
    if let Some(track_number) = form.track_number {
        fields.track_number = Some(track_number);
    }
    if let Some((cover_image, dimensions)) = cover {
        fields.cover_image = cover_image;
        fields.cover_image_dimensions = dimensions;
    }
}

/// Points a single at its album. Only existing albums other than the record
/// itself (`own_id`, when it is already stored) can be referenced.
fn apply_album_ref(
    db: &Connection,
    own_id: Option<i64>,
    record: &mut TrackRecord,
    album: AlbumRef,
) -> Result<()> {
    match (record, album) {
        (_, AlbumRef::Absent) => Ok(()),
        (TrackRecord::Single(single), AlbumRef::Clear) => {
            single.album = None;
            Ok(())
        }
        (TrackRecord::Album(_), AlbumRef::Clear) => Ok(()),
        (TrackRecord::Album(_), AlbumRef::Set(_)) => Err(AppError::validation(
            "Only singles can belong to an album",
        )),
        (TrackRecord::Single(_), AlbumRef::Set(album_id)) if own_id == Some(album_id) => Err(
            AppError::validation("A track cannot belong to itself"),
        ),
        (TrackRecord::Single(single), AlbumRef::Set(album_id)) => {
            match queries::find_kind(db, album_id)? {
                Some(TrackKind::Album) => {
                    single.album = Some(album_id);
                    Ok(())
                }
                _ => Err(AppError::validation(
                    "Album must reference an existing album",
                )),
            }
        }
    }
}

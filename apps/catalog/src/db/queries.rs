//! Catalog store queries.
//!
//! Every function takes a borrowed connection; callers own locking.

use chrono::{DateTime, Utc};
use rusqlite::{named_params, types::Type, Connection, OptionalExtension, Row};

use super::models::{
    AlbumRecord, AudioFields, Contributor, ContributorRole, Dimensions, SingleRecord, Track,
    TrackFields, TrackKind, TrackRecord,
};

const TRACK_COLUMNS: &str = r#"
    t.id, t.kind, t.title, t.genre, t.listen_count, t.publish_date,
    t.cover_image, t.cover_width, t.cover_height,
    t.audio_file, t.bitrate, t.duration, t.sample_rate, t.file_type,
    t.album_id, t.track_number, t.created_at, t.updated_at,
    (SELECT COUNT(*) FROM tracks c WHERE c.album_id = t.id) AS track_count
"#;

// Standalone singles and albums; ?1 = exact genre, ?2 = LIKE pattern.
const VISIBLE_WHERE: &str = r#"
    (t.kind = 'Album' OR (t.kind = 'Single' AND t.album_id IS NULL))
    AND (?1 IS NULL OR t.genre = ?1)
    AND (
        ?2 IS NULL
        OR casefold(t.title) LIKE ?2 ESCAPE '\'
        OR casefold(t.genre) LIKE ?2 ESCAPE '\'
        OR EXISTS (
            SELECT 1 FROM track_contributors tc
            WHERE tc.track_id = t.id AND casefold(tc.name) LIKE ?2 ESCAPE '\'
        )
    )
"#;

/// Filter applied to top-level listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogFilter<'a> {
    /// Exact genre match.
    pub genre: Option<&'a str>,
    /// Case-insensitive substring over title, genre and contributor names.
    pub text: Option<&'a str>,
}

impl CatalogFilter<'_> {
    fn like_pattern(&self) -> Option<String> {
        self.text.map(|text| format!("%{}%", escape_like(&text.to_lowercase())))
    }
}

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn map_track_row(row: &Row) -> rusqlite::Result<Track> {
    let kind: String = row.get("kind")?;
    let kind: TrackKind = kind.parse().map_err(|e| conversion_error(1, e))?;

    let fields = TrackFields {
        title: row.get("title")?,
        genre: row.get("genre")?,
        contributors: Vec::new(),
        listen_count: row.get("listen_count")?,
        publish_date: row.get("publish_date")?,
        cover_image: row.get("cover_image")?,
        cover_image_dimensions: Dimensions {
            width: row.get("cover_width")?,
            height: row.get("cover_height")?,
        },
        track_number: row.get("track_number")?,
    };

    let record = match kind {
        TrackKind::Single => TrackRecord::Single(SingleRecord {
            fields,
            album: row.get("album_id")?,
            audio: AudioFields {
                audio_file: row
                    .get::<_, Option<String>>("audio_file")?
                    .unwrap_or_default(),
                bitrate: row.get::<_, Option<u32>>("bitrate")?.unwrap_or(0),
                duration: row.get::<_, Option<u32>>("duration")?.unwrap_or(0),
                sample_rate: row.get::<_, Option<u32>>("sample_rate")?.unwrap_or(0),
                file_type: row
                    .get::<_, Option<String>>("file_type")?
                    .unwrap_or_default(),
            },
        }),
        TrackKind::Album => TrackRecord::Album(AlbumRecord {
            fields,
            track_count: Some(row.get("track_count")?),
        }),
    };

    Ok(Track {
        id: row.get("id")?,
        record,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_contributors(conn: &Connection, track: &mut Track) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, role FROM track_contributors WHERE track_id = ?1 ORDER BY position",
    )?;

    let contributors = stmt
        .query_map([track.id], |row| {
            let role: String = row.get(1)?;
            Ok(Contributor {
                name: row.get(0)?,
                role: role
                    .parse::<ContributorRole>()
                    .map_err(|e| conversion_error(1, e))?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    track.record.fields_mut().contributors = contributors;
    Ok(())
}

fn collect_tracks(
    conn: &Connection,
    rows: impl Iterator<Item = rusqlite::Result<Track>>,
) -> rusqlite::Result<Vec<Track>> {
    let mut tracks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    for track in &mut tracks {
        load_contributors(conn, track)?;
    }
    Ok(tracks)
}

/// One page of visible records, newest first.
pub fn list_visible(
    conn: &Connection,
    filter: &CatalogFilter<'_>,
    limit: u32,
    offset: u64,
) -> rusqlite::Result<Vec<Track>> {
    let sql = format!(
        "SELECT {TRACK_COLUMNS} FROM tracks t WHERE {VISIBLE_WHERE}
         ORDER BY t.created_at DESC, t.id DESC
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params![filter.genre, filter.like_pattern(), limit, offset],
        map_track_row,
    )?;
    collect_tracks(conn, rows)
}

/// Total number of visible records matching `filter`.
pub fn count_visible(conn: &Connection, filter: &CatalogFilter<'_>) -> rusqlite::Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM tracks t WHERE {VISIBLE_WHERE}");
    conn.query_row(
        &sql,
        rusqlite::params![filter.genre, filter.like_pattern()],
        |row| row.get(0),
    )
}

pub fn find_track(conn: &Connection, id: i64) -> rusqlite::Result<Option<Track>> {
    let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks t WHERE t.id = ?1");
    let track = conn.query_row(&sql, [id], map_track_row).optional()?;

    match track {
        Some(mut track) => {
            load_contributors(conn, &mut track)?;
            Ok(Some(track))
        }
        None => Ok(None),
    }
}

/// Kind of the record with `id`, if it exists.
pub fn find_kind(conn: &Connection, id: i64) -> rusqlite::Result<Option<TrackKind>> {
    let kind: Option<String> = conn
        .query_row("SELECT kind FROM tracks WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;

    kind.map(|k| k.parse().map_err(|e| conversion_error(0, e)))
        .transpose()
}

/// Records whose `album` reference equals `album_id`, by track number.
pub fn album_tracks(conn: &Connection, album_id: i64) -> rusqlite::Result<Vec<Track>> {
    let sql = format!(
        "SELECT {TRACK_COLUMNS} FROM tracks t WHERE t.album_id = ?1
         ORDER BY t.track_number ASC, t.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([album_id], map_track_row)?;
    collect_tracks(conn, rows)
}

pub fn distinct_genres(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT genre FROM tracks ORDER BY genre")?;
    let genres = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(genres)
}

/// Writes every column of `record`; `id = None` inserts a new row.
fn write_track(
    conn: &Connection,
    sql: &str,
    id: Option<i64>,
    record: &TrackRecord,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    let fields = record.fields();
    let audio = record.audio();

    conn.execute(
        sql,
        named_params! {
            ":id": id,
            ":kind": record.kind().as_str(),
            ":title": fields.title,
            ":genre": fields.genre,
            ":listen_count": fields.listen_count,
            ":publish_date": fields.publish_date,
            ":cover_image": fields.cover_image,
            ":cover_width": fields.cover_image_dimensions.width,
            ":cover_height": fields.cover_image_dimensions.height,
            ":audio_file": audio.map(|a| a.audio_file.as_str()),
            ":bitrate": audio.map(|a| a.bitrate),
            ":duration": audio.map(|a| a.duration),
            ":sample_rate": audio.map(|a| a.sample_rate),
            ":file_type": audio.map(|a| a.file_type.as_str()),
            ":album_id": record.album(),
            ":track_number": fields.track_number,
            ":now": now,
        },
    )
}

fn replace_contributors(
    conn: &Connection,
    track_id: i64,
    contributors: &[Contributor],
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM track_contributors WHERE track_id = ?1",
        [track_id],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO track_contributors (track_id, position, name, role)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, contributor) in contributors.iter().enumerate() {
        stmt.execute(rusqlite::params![
            track_id,
            position as i64,
            contributor.name,
            contributor.role.as_str()
        ])?;
    }
    Ok(())
}

/// Inserts a record and its contributors, returning the assigned id.
pub fn insert_track(conn: &Connection, record: &TrackRecord) -> rusqlite::Result<i64> {
    let tx = conn.unchecked_transaction()?;

    write_track(
        &tx,
        r#"
        INSERT INTO tracks (
            id, kind, title, genre, listen_count, publish_date,
            cover_image, cover_width, cover_height,
            audio_file, bitrate, duration, sample_rate, file_type,
            album_id, track_number, created_at, updated_at
        ) VALUES (
            :id, :kind, :title, :genre, :listen_count, :publish_date,
            :cover_image, :cover_width, :cover_height,
            :audio_file, :bitrate, :duration, :sample_rate, :file_type,
            :album_id, :track_number, :now, :now
        )
        "#,
        None,
        record,
        Utc::now(),
    )?;
    let id = tx.last_insert_rowid();

    replace_contributors(&tx, id, &record.fields().contributors)?;
    tx.commit()?;

    Ok(id)
}

/// Overwrites the stored row with `record`. Returns false if `id` is gone.
pub fn save_track(conn: &Connection, id: i64, record: &TrackRecord) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let updated = write_track(
        &tx,
        r#"
        UPDATE tracks SET
            kind = :kind, title = :title, genre = :genre,
            listen_count = :listen_count, publish_date = :publish_date,
            cover_image = :cover_image, cover_width = :cover_width,
            cover_height = :cover_height, audio_file = :audio_file,
            bitrate = :bitrate, duration = :duration,
            sample_rate = :sample_rate, file_type = :file_type,
            album_id = :album_id, track_number = :track_number,
            updated_at = :now
        WHERE id = :id
        "#,
        Some(id),
        record,
        Utc::now(),
    )?;

    if updated == 0 {
        return Ok(false);
    }

    replace_contributors(&tx, id, &record.fields().contributors)?;
    tx.commit()?;

    Ok(true)
}

/// Turns the children of `album_id` into standalone singles.
pub fn detach_children(conn: &Connection, album_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE tracks SET album_id = NULL WHERE album_id = ?1",
        [album_id],
    )
}

pub fn delete_track(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let deleted = conn.execute("DELETE FROM tracks WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

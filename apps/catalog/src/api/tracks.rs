//! Track and album endpoints.
//!
//! Reads are public. Create, update and delete require an admin token and
//! accept either `multipart/form-data` (fields plus `coverImage`/`audioFile`
//! parts) or a JSON object of fields.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware as axum_mw,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::models::Track;
use crate::error::{AppError, Result};
use crate::middleware;
use crate::services::storage::{UploadError, UploadedForm};
use crate::services::tracks::{PageRequest, TrackPage};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTracksQuery {
    /// Page number (1-indexed, default: 1).
    pub page: Option<u32>,
    /// Items per page (default: 10, max: 100).
    pub page_size: Option<u32>,
    /// Exact genre; `all`, `new`, `popular` and `featured` list everything.
    pub genre: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchTracksQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    /// Items per page (default: 10, max: 100).
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Track fields and uploads from a multipart or JSON body.
pub struct TrackForm(pub UploadedForm);

#[async_trait]
impl FromRequest<AppState> for TrackForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);

        match content_type.as_deref() {
            None => Ok(TrackForm(UploadedForm::default())),
            Some(ct) if ct.starts_with("multipart/form-data") => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(|e| UploadError::Malformed(e.body_text()))?;
                Ok(TrackForm(state.uploads().receive(multipart).await?))
            }
            Some(ct) if ct.starts_with("application/json") => {
                let Json(fields) = Json::<Map<String, Value>>::from_request(req, state)
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                Ok(TrackForm(UploadedForm::from_json(fields)))
            }
            Some(other) => Err(AppError::validation(format!(
                "Unsupported content type '{}', expected multipart/form-data or application/json",
                other
            ))),
        }
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    let create = post(create_track)
        .route_layer(axum_mw::from_fn(middleware::require_admin))
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let modify = patch(update_track)
        .delete(delete_track)
        .route_layer(axum_mw::from_fn(middleware::require_admin))
        .route_layer(axum_mw::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/", get(list_tracks).merge(create))
        .route("/search", get(search_tracks))
        .route("/genres", get(list_genres))
        .route("/album/:album_id", get(album_tracks))
        .route("/:id", get(get_track).merge(modify))
}

/// GET /api/tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<ListTracksQuery>,
) -> Result<Json<TrackPage>> {
    let page = PageRequest::new(query.page, query.page_size);
    let tracks = state.tracks().list(query.genre.as_deref(), page).await?;
    Ok(Json(tracks))
}

/// GET /api/tracks/search
pub async fn search_tracks(
    State(state): State<AppState>,
    Query(query): Query<SearchTracksQuery>,
) -> Result<Json<TrackPage>> {
    let page = PageRequest::new(query.page, query.limit);
    let tracks = state.tracks().search(query.q.as_deref(), page).await?;
    Ok(Json(tracks))
}

/// GET /api/tracks/genres
pub async fn list_genres(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.tracks().genres().await?))
}

/// GET /api/tracks/album/:album_id
pub async fn album_tracks(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
) -> Result<Json<Vec<Track>>> {
    Ok(Json(state.tracks().album_tracks(&album_id).await?))
}

/// GET /api/tracks/:id
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Track>> {
    Ok(Json(state.tracks().get(&id).await?))
}

/// POST /api/tracks
pub async fn create_track(
    State(state): State<AppState>,
    TrackForm(form): TrackForm,
) -> Result<(StatusCode, Json<Track>)> {
    let track = state.tracks().create(form).await?;
    Ok((StatusCode::CREATED, Json(track)))
}

/// PATCH /api/tracks/:id
pub async fn update_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    TrackForm(form): TrackForm,
) -> Result<Json<Track>> {
    Ok(Json(state.tracks().update(&id, form).await?))
}

/// DELETE /api/tracks/:id
pub async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.tracks().delete(&id).await?;
    Ok(Json(MessageResponse {
        message: "Track removed".to_string(),
    }))
}

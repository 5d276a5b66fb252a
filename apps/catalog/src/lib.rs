//! Catalog Backend Library
//!
//! Music catalog service: tracks, albums and their uploaded media.
//! This library exposes modules for use in integration tests.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod services;

use crate::config::{Config, ServerConfig};
use services::{AuthService, TrackService, UploadGate};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Mutex<Connection>>,
    pub auth_service: Arc<AuthService>,
    pub tracks: Arc<TrackService>,
    pub uploads: Arc<UploadGate>,
}

impl AppState {
    /// Wires the track service and upload gate around a shared connection.
    pub fn new(config: Config, conn: Connection, auth_service: AuthService) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let uploads = UploadGate::from_config(&config.uploads);
        let tracks = TrackService::new(Arc::clone(&db), uploads.store().clone());

        Self {
            config: Arc::new(config),
            db,
            auth_service: Arc::new(auth_service),
            tracks: Arc::new(tracks),
            uploads: Arc::new(uploads),
        }
    }

    /// Get a reference to the auth service.
    pub fn auth_service(&self) -> &AuthService {
        &self.auth_service
    }

    /// Get a reference to the track service.
    pub fn tracks(&self) -> &TrackService {
        &self.tracks
    }

    /// Get a reference to the upload gate.
    pub fn uploads(&self) -> &UploadGate {
        &self.uploads
    }
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub message: String,
    pub version: String,
}

pub async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Catalog backend is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Builds the full application router.
///
/// CORS is left to the binary so tests exercise the routes without it.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", api::auth::router(state.clone()))
        .nest("/api/tracks", api::tracks::router(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the configured origins.
///
/// If no origins are configured, only same-origin requests are allowed.
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::CONTENT_DISPOSITION,
    ];

    let cors = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(std::time::Duration::from_secs(3600));

    if server.cors_origins.is_empty() {
        tracing::info!("CORS: No origins configured, same-origin only");
        return cors;
    }

    let origins: Vec<_> = server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    tracing::info!("CORS: Allowing origins {:?}", server.cors_origins);

    cors.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use crate::config::{DatabaseConfig, UploadConfig};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(uploads: &TempDir) -> AppState {
        let config = Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            uploads: UploadConfig {
                dir: uploads.path().to_path_buf(),
                ..UploadConfig::default()
            },
        };
        let conn = db::init_db_memory().unwrap();
        AppState::new(config, conn, AuthService::new("secret".to_string(), 1))
    }

    #[tokio::test]
    async fn test_state_shares_upload_root() {
        let temp = TempDir::new().unwrap();
        let state = test_state(&temp);

        assert_eq!(state.uploads().store().root(), temp.path());
        assert_eq!(state.tracks().media().root(), temp.path());
    }

    #[tokio::test]
    async fn test_router_serves_health() {
        let temp = TempDir::new().unwrap();
        let app = router(test_state(&temp));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let server = ServerConfig {
            cors_origins: vec!["https://studio.example".to_string()],
            ..ServerConfig::default()
        };
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&server));

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, "https://studio.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(preflight).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://studio.example"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_cors_without_origins_is_same_origin() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&ServerConfig::default()));

        let request = Request::get("/")
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}

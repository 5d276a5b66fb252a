//! Test infrastructure for catalog backend integration tests.
//!
//! Provides a `TestApp` wrapper around `axum_test::TestServer` with helpers
//! for creating users, issuing tokens and building track uploads.

#![allow(dead_code)]

use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

use catalog::config::{Config, DatabaseConfig, ServerConfig, UploadConfig};
use catalog::db::models::UserRole;
use catalog::services::AuthService;
use catalog::{db, AppState};

pub const JWT_SECRET: &str = "test-jwt-secret-for-integration-tests";

/// Test application wrapper around axum_test::TestServer.
pub struct TestApp {
    server: TestServer,
    db: Arc<Mutex<Connection>>,
    auth_service: Arc<AuthService>,
    uploads: TempDir,
}

impl TestApp {
    /// Create a test application with an in-memory database and a
    /// temporary upload directory.
    pub async fn new() -> Self {
        Self::with_uploads(|_| {}).await
    }

    /// Like [`TestApp::new`], with the upload limits adjusted by `configure`.
    pub async fn with_uploads(configure: impl FnOnce(&mut UploadConfig)) -> Self {
        let uploads = TempDir::new().expect("Failed to create upload directory");

        let mut upload_config = UploadConfig {
            dir: uploads.path().to_path_buf(),
            ..UploadConfig::default()
        };
        configure(&mut upload_config);

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                jwt_secret: Some(JWT_SECRET.to_string()),
                ..ServerConfig::default()
            },
            database: DatabaseConfig {
                path: ":memory:".into(),
            },
            uploads: upload_config,
        };

        let conn = db::init_db_memory().expect("Failed to initialize test database");
        let auth_service = AuthService::new(JWT_SECRET.to_string(), 1);

        let state = AppState::new(config, conn, auth_service);
        let db = Arc::clone(&state.db);
        let auth_service = Arc::clone(&state.auth_service);

        let server =
            TestServer::new(catalog::router(state)).expect("Failed to create test server");

        Self {
            server,
            db,
            auth_service,
            uploads,
        }
    }

    pub fn server(&self) -> &TestServer {
        &self.server
    }

    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    pub fn auth_service(&self) -> &Arc<AuthService> {
        &self.auth_service
    }

    pub fn upload_dir(&self) -> &Path {
        self.uploads.path()
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.uploads.path().join(name)
    }

    /// Names of the files currently in the upload directory, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads.path())
            .expect("Failed to read upload directory")
            .map(|entry| {
                entry
                    .expect("Failed to read directory entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }

    /// Create a user and return its id.
    pub async fn create_test_user(&self, username: &str, password: &str, role: UserRole) -> i64 {
        let password_hash = self
            .auth_service
            .hash_password(password)
            .expect("Failed to hash password");

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
            rusqlite::params![username, password_hash, role.to_string()],
        )
        .expect("Failed to create test user");

        db.last_insert_rowid()
    }

    pub fn get_auth_token(&self, user_id: i64, role: UserRole) -> String {
        self.auth_service
            .create_token(user_id, role)
            .expect("Failed to create token")
    }

    pub fn auth_header(&self, token: &str) -> (HeaderName, HeaderValue) {
        (
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).expect("Invalid token format"),
        )
    }

    /// Create an admin and return its id and token.
    pub async fn create_admin(&self) -> (i64, String) {
        let user_id = self
            .create_test_user("admin", "adminpass", UserRole::Admin)
            .await;
        let token = self.get_auth_token(user_id, UserRole::Admin);
        (user_id, token)
    }

    /// Create a regular user and return its id and token.
    pub async fn create_user(&self) -> (i64, String) {
        let user_id = self
            .create_test_user("listener", "userpass", UserRole::User)
            .await;
        let token = self.get_auth_token(user_id, UserRole::User);
        (user_id, token)
    }
}

/// Encodes a blank PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::GrayImage::new(width, height);
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .expect("Failed to encode PNG");
    bytes.into_inner()
}

/// A 3000x3000 PNG cover part.
pub fn cover_part() -> Part {
    image_part(3000, 3000)
}

pub fn image_part(width: u32, height: u32) -> Part {
    Part::bytes(png_bytes(width, height))
        .file_name("cover.png")
        .mime_type("image/png")
}

/// An `audioFile` part whose bytes are not decodable audio.
pub fn audio_part(file_name: &str) -> Part {
    Part::bytes(b"not really audio".to_vec())
        .file_name(file_name)
        .mime_type("audio/mpeg")
}

/// Form with the fields every create request needs.
pub fn track_form(title: &str, kind: &str, genre: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("title", title)
        .add_text("kind", kind)
        .add_text("genre", genre)
}

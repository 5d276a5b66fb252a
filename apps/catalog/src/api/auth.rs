//! Authentication API endpoints.

use axum::{
    extract::State,
    middleware as axum_mw,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::UserRole;
use crate::error::{AppError, Result};
use crate::middleware;
use crate::services::Claims;
use crate::AppState;

/// Dummy hash for timing attack prevention.
/// This is a valid Argon2 hash that will always fail verification.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dGltaW5nYXR0YWNr$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// User information returned in responses (without password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new().route("/login", post(login)).route(
        "/me",
        get(me).layer(axum_mw::from_fn_with_state(
            state,
            middleware::auth_middleware,
        )),
    )
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::validation("Username and password are required"));
    }

    let db = state.db.lock().await;
    let auth_service = state.auth_service();

    let user_result = db.query_row(
        "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
        [body.username.trim()],
        |row| {
            let role: String = row.get(3)?;
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                UserRole::from_db(&role),
            ))
        },
    );

    // Unknown users still pay for one hash verification
    let (user_id, username, role) = match user_result {
        Ok((id, name, hash, role)) => {
            if !auth_service.verify_password(&body.password, &hash)? {
                tracing::debug!(username = %name, "Rejected login");
                return Err(AppError::Unauthorized);
            }
            (id, name, role)
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            let _ = auth_service.verify_password(&body.password, DUMMY_HASH);
            return Err(AppError::Unauthorized);
        }
        Err(e) => return Err(AppError::Sqlite(e)),
    };

    let token = auth_service.create_token(user_id, role)?;

    tracing::info!(user_id = user_id, username = %username, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserInfo {
            id: user_id,
            username,
            role,
        },
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserInfo>> {
    let db = state.db.lock().await;

    let user = db
        .query_row(
            "SELECT id, username, role FROM users WHERE id = ?1",
            [claims.sub],
            |row| {
                let role: String = row.get(2)?;
                Ok(UserInfo {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: UserRole::from_db(&role),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound("User not found".to_string())
            }
            _ => AppError::Sqlite(e),
        })?;

    Ok(Json(user))
}

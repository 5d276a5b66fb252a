use rand::Rng;
use rusqlite::Connection;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog::{config::Config, db, services::AuthService, AppState};

fn init_tracing() {
    // RUST_LOG overrides; default is debug for our crate, warn for dependencies
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("catalog=debug,tower_http=debug,axum=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Ensure a default admin user exists.
fn ensure_admin_user(conn: &Connection, auth_service: &AuthService) {
    let admin_exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if admin_exists {
        tracing::debug!("Admin user already exists");
        return;
    }

    let admin_password = std::env::var("CATALOG_ADMIN_PASSWORD").unwrap_or_else(|_| {
        let password = random_string(16);
        tracing::warn!("Generated admin password: {}", password);
        tracing::warn!("Set CATALOG_ADMIN_PASSWORD environment variable to use a fixed password");
        password
    });

    let password_hash = match auth_service.hash_password(&admin_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Failed to hash admin password: {}", e);
            return;
        }
    };

    match conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES ('admin', ?1, 'admin')",
        [&password_hash],
    ) {
        Ok(_) => tracing::info!("Created default admin user"),
        Err(e) => tracing::error!("Failed to create admin user: {}", e),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    tracing::info!("Starting catalog backend v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            tracing::debug!("Server: {}:{}", cfg.server.host, cfg.server.port);
            tracing::debug!("Database: {:?}", cfg.database.path);
            tracing::debug!("Uploads: {:?}", cfg.uploads);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
        }
    }

    let conn = match db::init_db(&config.database.path) {
        Ok(conn) => {
            tracing::info!("Database initialized at {:?}", config.database.path);
            conn
        }
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    // Development mode: generate a secret if none is configured
    let jwt_secret = config.server.jwt_secret.clone().unwrap_or_else(|| {
        tracing::warn!("No JWT secret configured, using random secret");
        tracing::warn!("Set CATALOG_SERVER__JWT_SECRET for production use");
        random_string(32)
    });

    let auth_service = AuthService::new(jwt_secret, config.server.token_ttl_hours);

    ensure_admin_user(&conn, &auth_service);

    let addr = config.server_addr();
    let cors = catalog::cors_layer(&config.server);
    let state = AppState::new(config, conn, auth_service);

    if let Err(e) = state.uploads().store().ensure_root().await {
        tracing::error!(
            "Failed to create upload directory {:?}: {}",
            state.uploads().store().root(),
            e
        );
        std::process::exit(1);
    }

    let app = catalog::router(state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Catalog backend listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

//! RBAC Backend
//! Mission: Cookie-borne JWT authentication with role/permission
//! authorization over a SQLite credential store

use std::{env, sync::Arc};

use anyhow::{Context, Result};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rbac_backend::app::build_router;
use rbac_backend::auth::{AuthState, JwtHandler, UserStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rbac_backend=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path = env::var("AUTH_DB_PATH").unwrap_or_else(|_| "rbac_auth.db".to_string());
    let cookie_secure = env::var("COOKIE_SECURE")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(false);

    let store = Arc::new(UserStore::new(&db_path)?);
    info!("Credential store ready at: {}", db_path);

    // Fresh signing key per process: a restart invalidates every
    // outstanding token. Intentional - nothing secret is ever persisted.
    let jwt = Arc::new(JwtHandler::new());

    let state = AuthState::new(store, jwt, cookie_secure);
    let app = build_router(state);

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

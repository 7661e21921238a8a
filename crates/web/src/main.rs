use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use repertoire_core::{Database, PracticeConfig, RepertoireStore};

mod config;
mod error;
mod live;
mod routes;

use config::ServerConfig;
use live::LiveSession;

pub struct AppState {
    pub store: Mutex<RepertoireStore<Database>>,
    /// Running practice, drill and review sessions by session id.
    pub sessions: Mutex<HashMap<String, LiveSession>>,
    pub practice: PracticeConfig,
}

impl AppState {
    pub fn new(db: Database, practice: PracticeConfig) -> Self {
        Self {
            store: Mutex::new(RepertoireStore::new(db)),
            sessions: Mutex::new(HashMap::new()),
            practice,
        }
    }
}

/// Locks a mutex, carrying on with the data if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::load().context("failed to load configuration")?;
    if let Some(parent) = Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path))?;

    let state = Arc::new(AppState::new(db, config.practice.clone()));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, db = %config.database_path, "server running");

    axum::serve(listener, app).await?;
    Ok(())
}

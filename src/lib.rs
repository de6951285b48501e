pub mod catalog;
pub mod config;
pub mod db;
pub mod middleware;
pub mod recommend;
pub mod server;
pub mod web;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] db::DbError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog::CatalogError),
    #[error("Server error: {0}")]
    Server(String),
}

pub fn load_config(config_path: &str, json_logs: bool) -> Result<config::Config, ServerError> {
    let mut config = config::Config::from_file(config_path)?;
    config.json_logs = json_logs;
    info!("Using config file: {}", config_path);
    Ok(config)
}

async fn open_database(config: &config::Config) -> Result<Arc<db::SqliteRepository>, ServerError> {
    let db_path = config
        .get_database_path()
        .ok_or_else(|| ServerError::Server("No database path configured".to_string()))?;

    info!("Opening database at {}", db_path);
    Ok(Arc::new(db::SqliteRepository::new(&db_path).await?))
}

/// Apply pending migrations, then serve.
pub async fn run(config: config::Config) -> Result<(), ServerError> {
    info!("Site name: {}", config.site.name);
    if config.debug {
        info!("Debug mode enabled");
    }

    let db = open_database(&config).await?;
    db.migrate().await?;
    db.clone().start_background_tasks(config.session_max_idle());

    let catalog = Arc::new(catalog::Catalog::new(db.clone())?);
    catalog.reindex().await?;

    let address = config.listen.address.as_deref().unwrap_or("[::]");
    let port = &config.listen.port;
    let addr: SocketAddr = format!("{}:{}", address, port)
        .parse()
        .map_err(|e| ServerError::Server(format!("Invalid address: {}", e)))?;

    let tls = match (&config.listen.tlscert, &config.listen.tlskey) {
        (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let state = server::AppState::new(config, db, catalog);
    let app = server::build_router(state);

    if let Some((cert_path, key_path)) = tls {
        info!("Loading TLS certificate from {}", cert_path);
        info!("Loading TLS key from {}", key_path);

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|e| ServerError::Server(format!("Failed to load TLS config: {}", e)))?;

        info!("Serving HTTPS on {}", addr);

        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Server(format!("Server error: {}", e)))?;
    } else {
        info!("Serving HTTP on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Server(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(format!("Server error: {}", e)))?;
    }

    Ok(())
}

/// Apply pending migrations and return their ids.
pub async fn migrate(config: &config::Config) -> Result<Vec<&'static str>, ServerError> {
    let db = open_database(config).await?;
    let applied = db.migrate().await?;
    db.pool().close().await;
    Ok(applied)
}

/// One `[X] id` or `[ ] id` line per known migration.
pub async fn show_migrations(config: &config::Config) -> Result<Vec<String>, ServerError> {
    let db = open_database(config).await?;
    let lines = db
        .migration_status()
        .await?
        .into_iter()
        .map(|m| match m.applied {
            Some(when) => format!("[X] {} ({})", m.id, when),
            None => format!("[ ] {}", m.id),
        })
        .collect();
    db.pool().close().await;
    Ok(lines)
}

/// Load movies from a JSON file into the catalog.
pub async fn import(config: &config::Config, path: &Path) -> Result<catalog::ImportSummary, ServerError> {
    let db = open_database(config).await?;
    db.migrate().await?;
    let catalog = catalog::Catalog::new(db.clone())?;
    let summary = catalog.import_file(path).await?;
    db.pool().close().await;
    Ok(summary)
}

/// Delete one movie from the catalog.
pub async fn remove_movie(config: &config::Config, movie_id: i64) -> Result<db::Movie, ServerError> {
    let db = open_database(config).await?;
    db.migrate().await?;
    let catalog = catalog::Catalog::new(db.clone())?;
    let movie = catalog.remove_movie(movie_id).await?;
    db.pool().close().await;
    Ok(movie)
}

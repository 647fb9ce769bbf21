/// Application context and dependency injection
use crate::{
    blob_store::{self, BlobBackend, BlobBackendType},
    config::ServerConfig,
    db,
    error::{InariError, InariResult},
    eventlog::{Clock, EventLog, SystemClock},
    publisher::Publisher,
    read_model::ReadModel,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub blobs: Arc<dyn BlobBackend>,
    pub event_log: EventLog,
    pub read_model: ReadModel,
    pub publisher: Publisher,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> InariResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        // Initialize projection database
        let db = db::create_pool(&config.storage.database_location, db::DatabaseOptions::default()).await?;

        // Run migrations
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        // Initialize blob storage for events and media
        let blobs = blob_store::open_backend(&config.storage.blobstore).await?;

        Ok(Self::from_parts(config, db, blobs, Arc::new(SystemClock)))
    }

    /// Wire services around existing stores
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        blobs: Arc<dyn BlobBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let event_log = EventLog::new(blobs.clone(), db.clone(), config.event_log_config());
        let read_model = ReadModel::new(db.clone());
        let publisher = Publisher::new(
            event_log.clone(),
            blobs.clone(),
            clock,
            config.publisher_config(),
        );

        Self {
            config: Arc::new(config),
            db,
            blobs,
            event_log,
            read_model,
            publisher,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> InariResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                InariError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        // Create blob storage directory if using disk storage
        if let BlobBackendType::Disk { location } = &config.storage.blobstore {
            tokio::fs::create_dir_all(location).await?;
        }

        Ok(())
    }
}

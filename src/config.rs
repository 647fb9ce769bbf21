/// Configuration management for Inari
use crate::{
    blob_store::BlobBackendType,
    error::{InariError, InariResult},
    eventlog::{EventLogConfig, NotePolicy, ProjectionConfig},
    publisher::PublisherConfig,
};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub events: EventsConfig,
    pub media: MediaConfig,
    pub site: SiteConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    /// SQLite file holding the projection
    pub database_location: PathBuf,
    pub blobstore: BlobBackendType,
}

/// Event log location
#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub bucket: String,
    pub prefix: String,
}

/// Media file location
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub bucket: String,
    /// Public url media file keys are served under
    pub base_url: String,
}

/// Site identity and projection policy
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub url: String,
    pub author: String,
    pub note_policy: NotePolicy,
}

/// Replay scheduling
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Rebuild the projection before doing anything else
    pub on_start: bool,
    /// Periodic reconciliation replay, disabled when `None`
    pub interval: Option<Duration>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = InariError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(InariError::Config(format!("unknown log format {:?}", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

fn parse_bool(key: &str, value: &str) -> InariResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(InariError::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> InariResult<Self> {
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> InariResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let data_directory: PathBuf = var("INARI_DATA_DIRECTORY", "./data").into();
        let database_location = lookup("INARI_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_directory.join("inari.sqlite"));

        let blobstore = match var("INARI_BLOBSTORE", "disk").trim().to_ascii_lowercase().as_str() {
            "disk" => BlobBackendType::Disk {
                location: lookup("INARI_BLOBSTORE_DISK_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_directory.join("blobs")),
            },
            "memory" => BlobBackendType::Memory,
            "s3" => BlobBackendType::S3 {
                region: var("INARI_BLOBSTORE_S3_REGION", "eu-central-1"),
                access_key_id: lookup("INARI_BLOBSTORE_S3_ACCESS_KEY_ID")
                    .ok_or_else(|| InariError::Config("S3 access key required".to_string()))?,
                secret_access_key: lookup("INARI_BLOBSTORE_S3_SECRET_ACCESS_KEY")
                    .ok_or_else(|| InariError::Config("S3 secret key required".to_string()))?,
                endpoint: lookup("INARI_BLOBSTORE_S3_ENDPOINT"),
            },
            other => {
                return Err(InariError::Config(format!(
                    "unknown blobstore {:?} (expected disk, memory or s3)",
                    other
                )))
            }
        };

        let site_url = var("INARI_SITE_URL", "http://localhost:8091");
        let author = lookup("INARI_AUTHOR").unwrap_or_else(|| site_url.clone());
        let note_policy: NotePolicy = var("INARI_NOTE_POLICY", "include").parse()?;

        let on_start = parse_bool("INARI_REPLAY_ON_START", &var("INARI_REPLAY_ON_START", "true"))?;
        let interval = match lookup("INARI_REPLAY_INTERVAL_SECS") {
            Some(secs) => {
                let secs: u64 = secs.trim().parse().map_err(|_| {
                    InariError::Config(format!("INARI_REPLAY_INTERVAL_SECS must be a number, got {:?}", secs))
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let log_level = var("RUST_LOG", "inari=info");
        let log_format: LogFormat = var("INARI_LOG_FORMAT", "pretty").parse()?;

        Ok(ServerConfig {
            storage: StorageConfig {
                data_directory,
                database_location,
                blobstore,
            },
            events: EventsConfig {
                bucket: var("INARI_EVENTS_BUCKET", "events"),
                prefix: var("INARI_EVENTS_PREFIX", "events"),
            },
            media: MediaConfig {
                bucket: var("INARI_MEDIA_BUCKET", "media"),
                base_url: var("INARI_MEDIA_BASE_URL", "http://localhost:8091/media"),
            },
            site: SiteConfig {
                url: site_url,
                author,
                note_policy,
            },
            replay: ReplayConfig { on_start, interval },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> InariResult<()> {
        if self.events.bucket.trim().is_empty() {
            return Err(InariError::Config("Events bucket cannot be empty".to_string()));
        }

        if self.media.bucket.trim().is_empty() {
            return Err(InariError::Config("Media bucket cannot be empty".to_string()));
        }

        if self.media.base_url.trim().is_empty() {
            return Err(InariError::Config("Media base url cannot be empty".to_string()));
        }

        if self.site.url.trim().is_empty() {
            return Err(InariError::Config("Site url cannot be empty".to_string()));
        }

        if self.replay.interval.is_some_and(|i| i.is_zero()) {
            return Err(InariError::Config(
                "Replay interval must be at least one second".to_string(),
            ));
        }

        Ok(())
    }

    pub fn event_log_config(&self) -> EventLogConfig {
        EventLogConfig {
            bucket: self.events.bucket.clone(),
            prefix: self.events.prefix.clone(),
            projection: ProjectionConfig {
                media_base_url: self.media.base_url.clone(),
                note_policy: self.site.note_policy,
            },
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            site_url: self.site.url.clone(),
            author: self.site.author.clone(),
            media_bucket: self.media.bucket.clone(),
        }
    }
}

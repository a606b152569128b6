use crate::error::{AppError, AppResult};

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;

// Heartbeat: ping every interval, drop after `missed_limit` silent intervals.
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_MISSED_HEARTBEAT_LIMIT: u32 = 2;

// Per-connection outbound queue depth. A consumer that falls this far behind
// is force-disconnected rather than allowed to stall broadcasts.
const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 64;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Text content limit; media goes through the upload service, never inline.
pub const MAX_MESSAGE_CONTENT_BYTES: usize = 16 * 1024;

/// Longest accepted reaction emoji, in chars (covers ZWJ sequences).
pub const MAX_EMOJI_CHARS: usize = 16;

const DEFAULT_TYPING_TTL_SECS: i64 = 10;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DbConfig {
    fn from_env() -> Self {
        Self {
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            acquire_timeout_secs: env_parse("DB_ACQUIRE_TIMEOUT_SECS", 30),
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT_SECS", 600),
        }
    }
}

/// Connection hub and pagination tuning.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub heartbeat_interval_secs: u64,
    pub missed_heartbeat_limit: u32,
    pub outbound_queue_size: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_message_content_bytes: usize,
    pub typing_ttl_secs: i64,
}

impl ChatConfig {
    fn from_env() -> Self {
        Self {
            heartbeat_interval_secs: env_parse(
                "HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            ),
            missed_heartbeat_limit: env_parse(
                "MISSED_HEARTBEAT_LIMIT",
                DEFAULT_MISSED_HEARTBEAT_LIMIT,
            ),
            outbound_queue_size: env_parse("OUTBOUND_QUEUE_SIZE", DEFAULT_OUTBOUND_QUEUE_SIZE),
            default_page_size: env_parse("DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            max_page_size: env_parse("MAX_PAGE_SIZE", MAX_PAGE_SIZE),
            max_message_content_bytes: env_parse(
                "MAX_MESSAGE_CONTENT_BYTES",
                MAX_MESSAGE_CONTENT_BYTES,
            ),
            typing_ttl_secs: env_parse("TYPING_TTL_SECS", DEFAULT_TYPING_TTL_SECS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Salt for hashed user identifiers in logs.
    pub hash_salt: String,
}

impl LoggingConfig {
    fn from_env() -> Self {
        let hash_salt = std::env::var("LOG_HASH_SALT")
            .unwrap_or_else(|_| "default-salt-please-change".to_string());
        Self { hash_salt }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Base URL of the external upload-lookup service.
    pub upload_service_url: String,
    pub rust_log: String,
    pub db: DbConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL must be set".to_string()))?;
        let upload_service_url = std::env::var("UPLOAD_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8090".to_string());

        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            upload_service_url,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db: DbConfig::from_env(),
            chat: ChatConfig::from_env(),
            logging: LoggingConfig::from_env(),
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            missed_heartbeat_limit: DEFAULT_MISSED_HEARTBEAT_LIMIT,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_message_content_bytes: MAX_MESSAGE_CONTENT_BYTES,
            typing_ttl_secs: DEFAULT_TYPING_TTL_SECS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

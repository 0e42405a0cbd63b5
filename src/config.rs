use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_OBJECT_STORE_BACKEND: &str = "in-memory";
const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 25 * 1024 * 1024;
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 30;
const DEFAULT_UPLOAD_RESERVE_MILLIS: u64 = 500;

/// Object store configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ObjectStoreConfig {
    /// Backend: "in-memory" or "http"
    #[serde(default = "default_object_store_backend")]
    pub backend: String,

    /// Base URL for the http backend
    #[serde(default)]
    pub base_url: Option<String>,

    /// Access token for the http backend
    #[serde(default)]
    pub access_token: Option<String>,

    /// Maximum accepted document size in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,

    /// Reserve subtracted from the request deadline for uploads
    #[serde(default = "default_upload_reserve_millis")]
    pub upload_deadline_reserve_millis: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_object_store_backend(),
            base_url: None,
            access_token: None,
            max_document_bytes: default_max_document_bytes(),
            upload_deadline_reserve_millis: default_upload_reserve_millis(),
        }
    }
}

/// Application configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment: development, staging, production
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level for the service target
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs instead of human-readable
    #[serde(default)]
    pub log_json: bool,

    /// Apply pending schema revisions on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Maximum database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Per-request deadline in seconds
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,

    /// Base URL for the outbound HTTP client
    #[serde(default)]
    pub outbound_base_url: Option<String>,

    /// Object store settings
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_request_deadline_secs() -> u64 {
    DEFAULT_REQUEST_DEADLINE_SECS
}
fn default_object_store_backend() -> String {
    DEFAULT_OBJECT_STORE_BACKEND.to_string()
}
fn default_max_document_bytes() -> u64 {
    DEFAULT_MAX_DOCUMENT_BYTES
}
fn default_upload_reserve_millis() -> u64 {
    DEFAULT_UPLOAD_RESERVE_MILLIS
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Deadline left for an object-store upload once the reserve is held back.
    pub fn upload_deadline(&self) -> std::time::Duration {
        let total = std::time::Duration::from_secs(self.request_deadline_secs);
        let reserve =
            std::time::Duration::from_millis(self.object_store.upload_deadline_reserve_millis);
        total.saturating_sub(reserve)
    }
}

/// Loads configuration from `config/default.toml`, an optional
/// environment-specific file, and `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }
    let env_path = Path::new(CONFIG_DIR).join(format!("{run_env}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let cfg: AppConfig = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

/// Initialises the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("opsline_api={level},tower_http=info");
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let registry = tracing_subscriber::registry().with(EnvFilter::new(filter));
    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer()).try_init();
    }
}

use std::path::PathBuf;

use thiserror::Error;

use crate::ocr::{PollSettings, RetryPolicy};

/// Application-level constants
pub const APP_NAME: &str = "agcert";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_OCR_URL: &str = "http://localhost:8501";
const DEFAULT_OCR_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SIGNED_URL_TTL_SECS: i64 = 900;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,agcert=debug,agcert_lib=debug,tower_http=info,hyper=warn,reqwest=warn"
}

/// Default data directory: the platform data dir, or `./agcert-data` when
/// the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("agcert-data"))
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime configuration. Every field has a default; `AGCERT_*` environment
/// variables override them.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub bind_addr: String,
    /// Base for signed object URLs.
    pub public_url: String,
    pub ocr_base_url: String,
    pub ocr_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub poll: PollSettings,
    /// JSON mapping configuration; the built-in mapping is used when unset.
    pub mapping_path: Option<PathBuf>,
    /// Key for signed URLs. Generated per process when unset.
    pub signing_key: Option<String>,
    pub signed_url_ttl_secs: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl AppConfig {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("agcert.db"),
            storage_dir: data_dir.join("objects"),
            data_dir,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            public_url: format!("http://{DEFAULT_BIND_ADDR}/objects"),
            ocr_base_url: DEFAULT_OCR_URL.to_string(),
            ocr_timeout_secs: DEFAULT_OCR_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            poll: PollSettings::default(),
            mapping_path: None,
            signing_key: None,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = match var("AGCERT_DATA_DIR") {
            Some(dir) => Self::with_data_dir(PathBuf::from(dir)),
            None => Self::default(),
        };

        if let Some(path) = var("AGCERT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = var("AGCERT_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(addr) = var("AGCERT_BIND") {
            config.public_url = format!("http://{addr}/objects");
            config.bind_addr = addr;
        }
        if let Some(url) = var("AGCERT_PUBLIC_URL") {
            config.public_url = url;
        }
        if let Some(url) = var("AGCERT_OCR_URL") {
            config.ocr_base_url = url;
        }
        if let Some(v) = var("AGCERT_OCR_TIMEOUT_SECS") {
            config.ocr_timeout_secs = parse("AGCERT_OCR_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("AGCERT_OCR_MAX_ATTEMPTS") {
            let attempts: u32 = parse("AGCERT_OCR_MAX_ATTEMPTS", &v)?;
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "AGCERT_OCR_MAX_ATTEMPTS",
                    value: v,
                });
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(v) = var("AGCERT_OCR_POLL_INTERVAL_MS") {
            config.poll.interval_ms = parse("AGCERT_OCR_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("AGCERT_OCR_MAX_POLLS") {
            config.poll.max_polls = parse("AGCERT_OCR_MAX_POLLS", &v)?;
        }
        if let Some(path) = var("AGCERT_MAPPING") {
            config.mapping_path = Some(PathBuf::from(path));
        }
        config.signing_key = var("AGCERT_SIGNING_KEY");
        if let Some(v) = var("AGCERT_SIGNED_URL_TTL_SECS") {
            config.signed_url_ttl_secs = parse("AGCERT_SIGNED_URL_TTL_SECS", &v)?;
        }

        Ok(config)
    }

    pub fn signed_url_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.signed_url_ttl_secs)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

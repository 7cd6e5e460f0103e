use crate::ConfigError;
pub use pilot_core::LogSortField;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub version: u32,
    pub profile_name: String,
    pub api: ApiConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    /// Unset leaves the HTTP client's own defaults in charge.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStorage {
    /// Token in the OS keychain, cached profile in the data dir.
    Keychain,
    /// Token and profile together in one file in the data dir.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub storage: SessionStorage,
    pub keychain_service: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogsConfig {
    pub page_size: usize,
    pub default_sort: LogSortField,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            default_sort: LogSortField::SentAt,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            profile_name: "default".to_string(),
            api: ApiConfig {
                base_url: "http://localhost:8080".to_string(),
                timeout_secs: None,
                user_agent: concat!("mail-pilot/", env!("CARGO_PKG_VERSION")).to_string(),
            },
            session: SessionConfig {
                storage: SessionStorage::Keychain,
                keychain_service: "io.mailpilot.cli".to_string(),
                file_name: "session.json".to_string(),
            },
            logs: LogsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checked, trailing-slash-free form of `api.base_url`.
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        normalize_base_url(&self.api.base_url)
    }
}

pub fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = || ConfigError::InvalidBaseUrl(raw.trim().to_string());
    let url = Url::parse(trimmed).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

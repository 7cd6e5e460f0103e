use crate::{normalize_base_url, AppConfig, ConfigError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const ORG: &str = "io";
const AUTHOR: &str = "MailPilot";
const APP: &str = "MailPilot";

/// Overrides `api.base_url` when set and non-empty.
pub const ENV_API_URL: &str = "MAIL_PILOT_API_URL";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(ORG, AUTHOR, APP).ok_or(ConfigError::MissingDirectories)?;
        Self::from_dirs(
            dirs.config_dir().to_path_buf(),
            dirs.data_dir().to_path_buf(),
            dirs.cache_dir().to_path_buf(),
        )
    }

    /// Lays out `config/`, `data/` and `cache/` under one root directory.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        Self::from_dirs(root.join("config"), root.join("data"), root.join("cache"))
    }

    fn from_dirs(
        config_dir: PathBuf,
        data_dir: PathBuf,
        cache_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        fs::create_dir_all(&config_dir)?;
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&cache_dir)?;

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            let initial = AppConfig::default();
            let content = toml::to_string_pretty(&initial)?;
            fs::write(&config_path, content)?;
            tracing::info!(path = %config_path.display(), "wrote default config");
        }

        Ok(Self {
            config_path,
            data_dir,
            cache_dir,
        })
    }

    /// Reads `config.toml` and applies the environment override.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        apply_env_override(&mut config, std::env::var(ENV_API_URL).ok())?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn apply_env_override(config: &mut AppConfig, value: Option<String>) -> Result<(), ConfigError> {
    let Some(raw) = value.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(());
    };
    normalize_base_url(&raw)?;
    tracing::debug!(base_url = raw.trim(), "api base url overridden from environment");
    config.api.base_url = raw.trim().trim_end_matches('/').to_string();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_writes_default_config() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = ConfigManager::with_root(root.path()).expect("manager");

        assert!(manager.config_path().exists());
        assert!(manager.data_dir().is_dir());
        assert!(manager.cache_dir().is_dir());

        let text = fs::read_to_string(manager.config_path()).expect("read");
        let parsed: AppConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn saved_config_survives_reopen() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = ConfigManager::with_root(root.path()).expect("manager");

        let mut config = AppConfig::default();
        config.profile_name = "work".to_string();
        config.logs.page_size = 25;
        manager.save(&config).expect("save");

        let reopened = ConfigManager::with_root(root.path()).expect("reopen");
        let text = fs::read_to_string(reopened.config_path()).expect("read");
        let parsed: AppConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.profile_name, "work");
        assert_eq!(parsed.logs.page_size, 25);
    }

    #[test]
    fn env_override_replaces_base_url() {
        let mut config = AppConfig::default();
        apply_env_override(&mut config, Some(" https://mail.example.com/ ".to_string()))
            .expect("override");
        assert_eq!(config.api.base_url, "https://mail.example.com");
    }

    #[test]
    fn blank_env_override_is_ignored() {
        let mut config = AppConfig::default();
        apply_env_override(&mut config, Some("  ".to_string())).expect("noop");
        assert_eq!(config.api.base_url, AppConfig::default().api.base_url);
    }

    #[test]
    fn invalid_env_override_is_rejected() {
        let mut config = AppConfig::default();
        let err = apply_env_override(&mut config, Some("mail.example.com".to_string()))
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
    }
}

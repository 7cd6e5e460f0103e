use anyhow::Context;
use pilot_api::{BearerToken, HttpBackend, HttpSettings};
use pilot_config::{AppConfig, ConfigManager, SessionStorage};
use pilot_security::{FileSessionStore, KeychainSessionStore, SecretStore, SessionStore};
use pilot_session::AuthController;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub(crate) config_manager: ConfigManager,
    pub(crate) config: AppConfig,
    pub(crate) backend: Arc<HttpBackend>,
    pub(crate) session: AuthController,
}

impl AppState {
    /// Loads config, wires the HTTP client and session store, and restores
    /// any stored session.
    pub async fn initialize() -> anyhow::Result<Self> {
        let config_manager = ConfigManager::new().context("initialize config manager")?;
        let config = config_manager.load().context("load app config")?;

        let bearer = BearerToken::new();
        let settings = http_settings_from_config(&config)?;
        let backend = Arc::new(
            HttpBackend::new(&settings, bearer.clone()).context("build http client")?,
        );
        let store = session_store_from_config(&config, &config_manager);
        let session = AuthController::new(backend.clone(), store, bearer);

        let phase = session.initialize().await;
        tracing::debug!(?phase, base_url = %settings.base_url, "session initialized");

        Ok(Self {
            config_manager,
            config,
            backend,
            session,
        })
    }
}

fn http_settings_from_config(config: &AppConfig) -> anyhow::Result<HttpSettings> {
    Ok(HttpSettings {
        base_url: config.api_base_url().context("read api.base_url")?,
        timeout: config.api.timeout_secs.map(Duration::from_secs),
        user_agent: config.api.user_agent.clone(),
    })
}

fn session_store_from_config(
    config: &AppConfig,
    config_manager: &ConfigManager,
) -> Arc<dyn SessionStore> {
    match config.session.storage {
        SessionStorage::Keychain => Arc::new(KeychainSessionStore::new(
            SecretStore::new(config.session.keychain_service.clone()),
            config_manager.data_dir(),
        )),
        SessionStorage::File => Arc::new(FileSessionStore::new(
            config_manager.data_dir().join(&config.session.file_name),
        )),
    }
}

//! Persistence for the two session entries: the bearer token and the cached user.
//!
//! Only the session controller writes through these stores. Both entries are
//! cleared together.

use crate::{SecretKey, SecretStore, SecurityError};
use pilot_core::{Session, UserProfile};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait SessionStore: Send + Sync {
    /// A cached user that cannot be decoded is dropped and reported as absent.
    fn load(&self) -> Result<Session, SecurityError>;

    /// Writes the token and, when present, the cached user.
    fn save(&self, session: &Session) -> Result<(), SecurityError>;

    fn clear(&self) -> Result<(), SecurityError>;
}

/// Token in the OS keychain, cached profile as JSON next to the app data.
#[derive(Debug, Clone)]
pub struct KeychainSessionStore {
    secrets: SecretStore,
    user_path: PathBuf,
}

impl KeychainSessionStore {
    pub fn new(secrets: SecretStore, data_dir: &Path) -> Self {
        Self {
            secrets,
            user_path: data_dir.join("cached_user.json"),
        }
    }

    fn token_key() -> SecretKey {
        SecretKey::new("session", "bearer_token")
    }
}

impl SessionStore for KeychainSessionStore {
    fn load(&self) -> Result<Session, SecurityError> {
        let token = self.secrets.get(&Self::token_key())?;
        let user = read_cached_user(&self.user_path)?;
        Ok(Session { token, user })
    }

    fn save(&self, session: &Session) -> Result<(), SecurityError> {
        match &session.token {
            Some(token) => self.secrets.set(&Self::token_key(), token)?,
            None => self.secrets.delete(&Self::token_key())?,
        }
        if let Some(user) = &session.user {
            write_atomic(&self.user_path, &serde_json::to_vec_pretty(user)?)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SecurityError> {
        self.secrets.delete(&Self::token_key())?;
        remove_if_exists(&self.user_path)
    }
}

fn read_cached_user(path: &Path) -> Result<Option<UserProfile>, SecurityError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(user) => Ok(Some(user)),
        Err(err) => {
            tracing::warn!(path = %path.display(), "discarding unreadable cached user: {err}");
            remove_if_exists(path)?;
            Ok(None)
        }
    }
}

/// Token and profile together in a single owner-only JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session, SecurityError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Session::default())
            }
            Err(err) => return Err(err.into()),
        };

        let mut raw: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "discarding unreadable session file: {err}");
                return Ok(Session::default());
            }
        };

        let token = raw
            .get("token")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let user = match raw.get_mut("user").map(serde_json::Value::take) {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match serde_json::from_value(value) {
                Ok(user) => Some(user),
                Err(err) => {
                    tracing::warn!("discarding unreadable cached user: {err}");
                    None
                }
            },
        };
        Ok(Session { token, user })
    }

    fn save(&self, session: &Session) -> Result<(), SecurityError> {
        let mut next = session.clone();
        if next.user.is_none() {
            next.user = self.load()?.user;
        }
        write_atomic(&self.path, &serde_json::to_vec_pretty(&next)?)
    }

    fn clear(&self) -> Result<(), SecurityError> {
        remove_if_exists(&self.path)
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    pub fn current(&self) -> Session {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Session, SecurityError> {
        Ok(self.current())
    }

    fn save(&self, session: &Session) -> Result<(), SecurityError> {
        let mut guard = self.lock();
        guard.token = session.token.clone();
        if session.user.is_some() {
            guard.user = session.user.clone();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SecurityError> {
        *self.lock() = Session::default();
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SecurityError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    restrict_permissions(&tmp)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), SecurityError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), SecurityError> {
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), SecurityError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

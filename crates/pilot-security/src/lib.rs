mod error;
mod keychain;
mod session_store;

pub use error::SecurityError;
pub use keychain::{SecretKey, SecretStore};
pub use session_store::{
    FileSessionStore, KeychainSessionStore, MemorySessionStore, SessionStore,
};

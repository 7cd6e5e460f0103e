mod error;
mod manager;
mod model;

pub use error::ConfigError;
pub use manager::{ConfigManager, ENV_API_URL};
pub use model::*;

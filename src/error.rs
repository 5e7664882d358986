use thiserror::Error;

use crate::detect::DetectError;
use crate::registry::error::RegistryError;
use crate::registry::store::StoreError;

#[derive(Error, Debug)]
pub enum ScanmarkError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Detection error: {0}")]
    Detect(#[from] DetectError),

    #[error("Server error: {message}")]
    Server { message: String },
}

impl ScanmarkError {
    pub fn server<S: Into<String>>(message: S) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanmarkError>;

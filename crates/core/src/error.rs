use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    pub fn invalid_config(key: &str, reason: impl Into<String>) -> Self {
        CoreError::InvalidConfig {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

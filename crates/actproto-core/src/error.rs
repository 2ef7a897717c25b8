use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown vital key '{0}': expected confidence, safety, memory or focus")]
    UnknownVital(String),

    #[error("pipeline fault: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{tool} is not usable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Executable not found: {0}")]
    ToolNotFound(String),

    #[error("{description} timed out after {after:?}")]
    ToolTimeout { description: String, after: Duration },

    #[error("{description} failed: {diagnostic}")]
    ToolFailed { description: String, diagnostic: String },

    #[error("Metadata probe error: {0}")]
    Probe(String),
}

pub type Result<T> = std::result::Result<T, ConverterError>;

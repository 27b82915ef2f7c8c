use crate::log::RecordId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("log batch contains no usable records")]
    BatchEmpty,

    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("no record with id {0}")]
    UnknownRecord(RecordId),

    #[error("record {0} has no resolved source location")]
    Unresolved(RecordId),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;

//! Transfer error types

use thiserror::Error;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid transfer configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    #[error("Document store error: {0}")]
    Source(String),

    #[error("Object store error: {0}")]
    Destination(String),

    #[error("Object s3://{bucket}/{key} already exists")]
    ObjectExists { bucket: String, key: String },

    #[error("Failed to serialize documents: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transform failed: {0}")]
    Transform(#[source] anyhow::Error),
}

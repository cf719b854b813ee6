//! Error types for task execution

use thiserror::Error;

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),
}

// Convert from IPC errors
impl From<tributary_ipc::IpcError> for ExecutionError {
    fn from(err: tributary_ipc::IpcError) -> Self {
        if err.is_fatal() {
            Self::ProtocolError(err.to_string())
        } else {
            Self::IpcError(err.to_string())
        }
    }
}

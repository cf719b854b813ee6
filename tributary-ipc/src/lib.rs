//! Inter-process communication for Tributary
//!
//! This crate provides the wire protocol and transport abstractions used
//! between the supervising controller and the worker process running a task.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{
    AssetResult, ErrorType, GetAssetByName, MessageEnvelope, StartTask, ToSupervisor, ToTask,
    WorkerError, IPC_PROTOCOL_VERSION,
};
pub use transport::{
    duplex_pair, ChildProcessTransport, DuplexTransport, IpcTransport, StdioTransport,
    StreamTransport,
};

//! IPC transport implementations
//!
//! Every transport speaks newline-delimited JSON envelopes.

use async_trait::async_trait;
use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
    ReadHalf, WriteHalf,
};

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, IPC_PROTOCOL_VERSION};

/// IPC transport trait for different communication mechanisms
#[async_trait]
pub trait IpcTransport: Send + Sync {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError>;

    /// Receive a message from the other end
    async fn receive<T: DeserializeOwned + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

async fn write_envelope<W, T>(writer: &mut W, message: &MessageEnvelope<T>) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize + Send + Sync,
{
    let json = serde_json::to_string(message)
        .map_err(|e| IpcError::SerializationError(e.to_string()))?;
    trace!("ipc send: {}", json);

    // Send with newline delimiter
    let message_with_newline = format!("{}\n", json);
    writer
        .write_all(message_with_newline.as_bytes())
        .await
        .map_err(|e| IpcError::IoError(e.to_string()))?;

    writer
        .flush()
        .await
        .map_err(|e| IpcError::IoError(e.to_string()))?;

    Ok(())
}

async fn read_envelope<R, T>(reader: &mut R) -> Result<MessageEnvelope<T>, IpcError>
where
    R: AsyncBufRead + Unpin + Send,
    T: DeserializeOwned + Send,
{
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| IpcError::IoError(e.to_string()))?;

    if line.is_empty() {
        return Err(IpcError::ConnectionClosed);
    }

    // Remove newline
    line.truncate(line.trim_end().len());
    trace!("ipc receive: {}", line);

    let envelope: MessageEnvelope<T> = serde_json::from_str(&line)
        .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

    // Check protocol version compatibility
    if !envelope.is_compatible() {
        return Err(IpcError::ProtocolVersionMismatch {
            expected: IPC_PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }

    Ok(envelope)
}

/// Stdin/Stdout IPC transport, used by the worker side of a process pair
pub struct StdioTransport {
    stdin: BufReader<tokio::io::Stdin>,
    stdout: tokio::io::Stdout,
}

impl StdioTransport {
    /// Create a new stdio transport
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IpcTransport for StdioTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        write_envelope(&mut self.stdout, message).await
    }

    async fn receive<T: DeserializeOwned + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        read_envelope(&mut self.stdin).await
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        // Stdin/stdout are closed at process exit
        Ok(())
    }
}

/// Child process transport for parent-child communication
pub struct ChildProcessTransport {
    stdin: Option<tokio::process::ChildStdin>,
    stdout: Option<BufReader<tokio::process::ChildStdout>>,
}

impl ChildProcessTransport {
    /// Create a new child process transport
    pub fn new(stdin: tokio::process::ChildStdin, stdout: tokio::process::ChildStdout) -> Self {
        Self {
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
        }
    }
}

#[async_trait]
impl IpcTransport for ChildProcessTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| IpcError::IoError("stdin already closed".to_string()))?;
        write_envelope(stdin, message).await
    }

    async fn receive<T: DeserializeOwned + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| IpcError::IoError("stdout already closed".to_string()))?;
        read_envelope(stdout).await
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        // Take ownership and drop to close
        let _ = self.stdin.take();
        let _ = self.stdout.take();
        Ok(())
    }
}

/// Transport over any async byte stream pair
pub struct StreamTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

#[async_trait]
impl<R, W> IpcTransport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        write_envelope(&mut self.writer, message).await
    }

    async fn receive<T: DeserializeOwned + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        read_envelope(&mut self.reader).await
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))
    }
}

/// In-memory stream transport, one end of a [`duplex_pair`]
pub type DuplexTransport = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Two connected in-memory transports
pub fn duplex_pair(max_buf_size: usize) -> (DuplexTransport, DuplexTransport) {
    let (left, right) = tokio::io::duplex(max_buf_size);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);
    (
        StreamTransport::new(left_read, left_write),
        StreamTransport::new(right_read, right_write),
    )
}

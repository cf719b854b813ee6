//! Worker-side communication channel to the supervisor

use async_trait::async_trait;
use tracing::{debug, warn};
use tributary_core::{Asset, AssetResolver, ResolveError};
use tributary_ipc::{
    ErrorType, GetAssetByName, IpcError, IpcTransport, MessageEnvelope, ToSupervisor, ToTask,
};

/// Synchronous request/response channel between a running task and its supervisor.
///
/// One handle is created per worker process and passed explicitly to
/// whatever needs to talk to the supervisor. Every request is followed by
/// exactly one receive; requests never overlap.
pub struct SupervisorComms<T> {
    transport: T,
    caller: String,
}

impl<T: IpcTransport> SupervisorComms<T> {
    pub fn new(transport: T, caller: impl Into<String>) -> Self {
        Self {
            transport,
            caller: caller.into(),
        }
    }

    /// Identity attached to requests issued through [`AssetResolver::resolve`]
    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn set_caller(&mut self, caller: impl Into<String>) {
        self.caller = caller.into();
    }

    /// Send one request to the supervisor
    pub async fn send_request(&mut self, caller: &str, message: ToSupervisor) -> Result<(), IpcError> {
        debug!("Sending {} request for {}", message.kind(), caller);
        self.transport
            .send(&MessageEnvelope::from_sender(caller, message))
            .await
    }

    /// Block until the supervisor's next message arrives
    pub async fn get_message(&mut self) -> Result<ToTask, IpcError> {
        let envelope: MessageEnvelope<ToTask> = self.transport.receive().await?;
        Ok(envelope.message)
    }

    pub async fn close(&mut self) -> Result<(), IpcError> {
        self.transport.close().await
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// Malformed traffic is a protocol failure; everything else is the channel's
fn channel_failure(err: IpcError) -> ResolveError {
    match err {
        IpcError::DeserializationError(_)
        | IpcError::InvalidMessage(_)
        | IpcError::ProtocolVersionMismatch { .. }
        | IpcError::UnexpectedMessage { .. } => ResolveError::Protocol(err.to_string()),
        other => ResolveError::Channel(other.to_string()),
    }
}

#[async_trait]
impl<T: IpcTransport> AssetResolver for SupervisorComms<T> {
    async fn resolve(&mut self, name: &str) -> Result<Asset, ResolveError> {
        let caller = self.caller.clone();
        self.send_request(&caller, ToSupervisor::GetAssetByName(GetAssetByName::new(name)))
            .await
            .map_err(channel_failure)?;

        match self.get_message().await.map_err(channel_failure)? {
            ToTask::AssetResult(result) if result.name == name => Ok(result.into_asset()),
            ToTask::AssetResult(result) => Err(ResolveError::Protocol(format!(
                "requested asset '{}' but received '{}'",
                name, result.name
            ))),
            ToTask::ErrorResponse {
                error: ErrorType::AssetNotFound,
                ..
            } => Err(ResolveError::NotFound(name.to_string())),
            ToTask::ErrorResponse { error, detail } => {
                warn!("Supervisor refused to resolve {}: {}", name, error);
                Err(ResolveError::Protocol(match detail {
                    Some(detail) => format!("supervisor returned {}: {}", error, detail),
                    None => format!("supervisor returned {}", error),
                }))
            }
            other => Err(ResolveError::Protocol(
                IpcError::UnexpectedMessage {
                    expected: "asset_result".to_string(),
                    actual: other.kind().to_string(),
                }
                .to_string(),
            )),
        }
    }
}

//! Test doubles shared by the unit tests

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use tributary_ipc::{IpcError, IpcTransport, MessageEnvelope};

/// One interaction with a [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// A message was sent; holds the envelope's `message` and `sender`
    Send {
        sender: Option<String>,
        message: JsonValue,
    },
    Receive,
}

/// Records everything sent and replays canned messages in order
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub calls: Vec<Call>,
    responses: VecDeque<JsonValue>,
}

impl ScriptedTransport {
    pub fn new<I, M>(responses: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Serialize,
    {
        Self {
            calls: Vec::new(),
            responses: responses
                .into_iter()
                .map(|m| serde_json::to_value(m).expect("canned message serializes"))
                .collect(),
        }
    }

    /// Only the messages that were sent, in order
    pub fn sent_messages(&self) -> Vec<JsonValue> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Send { message, .. } => Some(message.clone()),
                Call::Receive => None,
            })
            .collect()
    }
}

#[async_trait]
impl IpcTransport for ScriptedTransport {
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        self.calls.push(Call::Send {
            sender: message.sender.clone(),
            message: serde_json::to_value(&message.message)?,
        });
        Ok(())
    }

    async fn receive<T: DeserializeOwned + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        self.calls.push(Call::Receive);
        let message = self.responses.pop_front().ok_or(IpcError::ConnectionClosed)?;
        let envelope = serde_json::to_value(MessageEnvelope::new(message))?;
        Ok(serde_json::from_value(envelope)?)
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        Ok(())
    }
}

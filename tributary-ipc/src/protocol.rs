//! IPC protocol definitions and message types
//!
//! Requests and responses are correlated by order: the worker never has more
//! than one request outstanding, so the next message it receives answers the
//! last request it sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use tributary_core::{Asset, Context, Extra};
use uuid::Uuid;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Ask the supervisor for the asset registered under `name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAssetByName {
    pub name: String,
}

impl GetAssetByName {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A resolved asset, as sent by the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetResult {
    pub name: String,
    pub uri: String,
    pub group: String,
    #[serde(default)]
    pub extra: Option<Extra>,
}

impl AssetResult {
    /// Take the supervisor's fields as sent; only a missing `extra` defaults
    pub fn into_asset(self) -> Asset {
        Asset::new(self.name)
            .with_uri(self.uri)
            .with_group(self.group)
            .with_extra(self.extra.unwrap_or_default())
    }
}

impl From<&Asset> for AssetResult {
    fn from(asset: &Asset) -> Self {
        Self {
            name: asset.name().to_string(),
            uri: asset.uri().to_string(),
            group: asset.group().to_string(),
            extra: if asset.extra().is_empty() {
                None
            } else {
                Some(asset.extra().clone())
            },
        }
    }
}

impl From<AssetResult> for Asset {
    fn from(result: AssetResult) -> Self {
        result.into_asset()
    }
}

/// Tell a worker which task to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTask {
    pub dag_id: String,
    pub task_id: String,
    pub run_id: String,
    #[serde(default)]
    pub context: Context,
}

impl StartTask {
    /// Create a manually triggered run with a fresh run id
    pub fn new(dag_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            task_id: task_id.into(),
            run_id: format!("manual__{}", Uuid::new_v4()),
            context: Context::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Context handed to the task: the supplied context plus run identifiers
    pub fn task_context(&self) -> Context {
        let mut context = self.context.clone();
        context
            .entry("dag_id")
            .or_insert_with(|| JsonValue::String(self.dag_id.clone()));
        context
            .entry("task_id")
            .or_insert_with(|| JsonValue::String(self.task_id.clone()));
        context
            .entry("run_id")
            .or_insert_with(|| JsonValue::String(self.run_id.clone()));
        context
    }
}

/// Messages sent from the worker to the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToSupervisor {
    /// Resolve an asset by name
    GetAssetByName(GetAssetByName),

    /// The task finished and materialized its outlets
    SucceedTask {
        task_id: String,
        output: JsonValue,
        outlets: Vec<Asset>,
        end_date: DateTime<Utc>,
    },

    /// The task failed
    TaskFailed { task_id: String, error: WorkerError },
}

impl ToSupervisor {
    pub fn kind(&self) -> &'static str {
        match self {
            ToSupervisor::GetAssetByName(_) => "get_asset_by_name",
            ToSupervisor::SucceedTask { .. } => "succeed_task",
            ToSupervisor::TaskFailed { .. } => "task_failed",
        }
    }
}

/// Messages sent from the supervisor to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToTask {
    /// Run a task
    StartTask(StartTask),

    /// Answer to [`GetAssetByName`]
    AssetResult(AssetResult),

    /// The supervisor could not serve the last request
    ErrorResponse {
        error: ErrorType,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl ToTask {
    pub fn kind(&self) -> &'static str {
        match self {
            ToTask::StartTask(_) => "start_task",
            ToTask::AssetResult(_) => "asset_result",
            ToTask::ErrorResponse { .. } => "error_response",
        }
    }
}

/// Why the supervisor refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    AssetNotFound,
    UnexpectedRequest,
    InternalError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorType::AssetNotFound => "asset not found",
            ErrorType::UnexpectedRequest => "unexpected request",
            ErrorType::InternalError => "internal error",
        };
        f.write_str(text)
    }
}

/// Worker error types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum WorkerError {
    /// An argument could not be bound before the task ran
    BindingFailed { error: String },

    /// The asset function itself failed
    TaskExecutionFailed { task_id: String, error: String },

    /// The requested task is not registered in the worker
    TaskNotFound { dag_id: String, task_id: String },

    /// Communication error
    CommunicationError { error: String },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::BindingFailed { error } => {
                write!(f, "Argument binding failed: {}", error)
            }
            WorkerError::TaskExecutionFailed { task_id, error } => {
                write!(f, "Task execution failed (task_id: {}): {}", task_id, error)
            }
            WorkerError::TaskNotFound { dag_id, task_id } => {
                write!(f, "Task {} not found in pipeline {}", task_id, dag_id)
            }
            WorkerError::CommunicationError { error } => {
                write!(f, "Communication error: {}", error)
            }
        }
    }
}

impl std::error::Error for WorkerError {}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    /// Identity of the caller, set on worker requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            sender: None,
            message,
        }
    }

    /// Create an envelope carrying the caller's identity
    pub fn from_sender(sender: impl Into<String>, message: T) -> Self {
        Self {
            sender: Some(sender.into()),
            ..Self::new(message)
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}

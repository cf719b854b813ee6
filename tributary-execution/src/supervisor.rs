//! Controller side of a task run

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};
use tributary_config::ExecutionConfig;
use tributary_core::Asset;
use tributary_ipc::{
    AssetResult, ChildProcessTransport, ErrorType, GetAssetByName, IpcTransport, MessageEnvelope,
    StartTask, ToSupervisor, ToTask, WorkerError,
};

use crate::catalog::AssetCatalog;
use crate::error::ExecutionError;

/// Final state of a supervised task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success {
        task_id: String,
        output: JsonValue,
        outlets: Vec<Asset>,
        end_date: DateTime<Utc>,
    },
    Failed {
        task_id: String,
        error: WorkerError,
    },
}

impl TaskOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            TaskOutcome::Success { task_id, .. } | TaskOutcome::Failed { task_id, .. } => task_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// Starts a task on a worker and serves its asset lookups until it finishes
pub struct Supervisor<C> {
    catalog: Arc<C>,
    config: ExecutionConfig,
}

impl<C: AssetCatalog> Supervisor<C> {
    pub fn new(catalog: Arc<C>, config: ExecutionConfig) -> Self {
        Self { catalog, config }
    }

    pub fn with_defaults(catalog: Arc<C>) -> Self {
        Self::new(catalog, ExecutionConfig::default())
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Answer a single lookup from the catalog
    pub fn answer(&self, request: &GetAssetByName) -> ToTask {
        match self.catalog.get_asset_by_name(&request.name) {
            Some(asset) => ToTask::AssetResult(AssetResult::from(&asset)),
            None => ToTask::ErrorResponse {
                error: ErrorType::AssetNotFound,
                detail: Some(format!("no asset named '{}'", request.name)),
            },
        }
    }

    /// Drive one task over `transport` until the worker reports an outcome
    pub async fn supervise<T: IpcTransport>(
        &self,
        transport: &mut T,
        start: StartTask,
    ) -> Result<TaskOutcome, ExecutionError> {
        let task_id = start.task_id.clone();
        let limit = self.config.task_timeout;

        match tokio::time::timeout(limit, self.drive(transport, start)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Task {} timed out after {:?}", task_id, limit);
                Err(ExecutionError::TimeoutError(format!(
                    "task {} did not finish within {:?}",
                    task_id, limit
                )))
            }
        }
    }

    async fn drive<T: IpcTransport>(
        &self,
        transport: &mut T,
        start: StartTask,
    ) -> Result<TaskOutcome, ExecutionError> {
        info!(
            "Starting task {} of pipeline {} (run {})",
            start.task_id, start.dag_id, start.run_id
        );
        let expected_task = start.task_id.clone();
        transport
            .send(&MessageEnvelope::new(ToTask::StartTask(start)))
            .await?;

        loop {
            let envelope = self.receive(transport).await?;
            match envelope.message {
                ToSupervisor::GetAssetByName(request) => {
                    debug!(
                        "Worker {} requested asset {}",
                        envelope.sender.as_deref().unwrap_or("<anonymous>"),
                        request.name
                    );
                    let response = self.answer(&request);
                    transport.send(&MessageEnvelope::new(response)).await?;
                }
                ToSupervisor::SucceedTask {
                    task_id,
                    output,
                    outlets,
                    end_date,
                } => {
                    check_task_id(&expected_task, &task_id)?;
                    info!("Task {} succeeded with {} outlet(s)", task_id, outlets.len());
                    return Ok(TaskOutcome::Success {
                        task_id,
                        output,
                        outlets,
                        end_date,
                    });
                }
                ToSupervisor::TaskFailed { task_id, error } => {
                    check_task_id(&expected_task, &task_id)?;
                    warn!("Task {} failed: {}", task_id, error);
                    return Ok(TaskOutcome::Failed { task_id, error });
                }
            }
        }
    }

    async fn receive<T: IpcTransport>(
        &self,
        transport: &mut T,
    ) -> Result<MessageEnvelope<ToSupervisor>, ExecutionError> {
        match self.config.message_timeout {
            Some(limit) => match tokio::time::timeout(limit, transport.receive::<ToSupervisor>()).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(ExecutionError::TimeoutError(format!(
                    "no message from worker within {:?}",
                    limit
                ))),
            },
            None => Ok(transport.receive::<ToSupervisor>().await?),
        }
    }

    /// Spawn `command` as a worker process and supervise one task on it.
    ///
    /// The worker speaks the protocol on its stdin/stdout; its stderr is
    /// inherited.
    pub async fn run_process(
        &self,
        mut command: Command,
        start: StartTask,
    ) -> Result<TaskOutcome, ExecutionError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(self.config.kill_on_timeout);

        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::ProcessError(format!("Failed to spawn worker: {}", e)))?;
        debug!("Spawned worker process {:?}", child.id());

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::ProcessError("Worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::ProcessError("Worker stdout unavailable".to_string()))?;
        let mut transport = ChildProcessTransport::new(stdin, stdout);

        let result = self.supervise(&mut transport, start).await;
        transport.close().await?;

        match &result {
            Ok(_) => {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| ExecutionError::ProcessError(e.to_string()))?;
                debug!("Worker process exited with {}", status);
            }
            Err(e) if self.config.kill_on_timeout => {
                warn!("Killing worker process: {}", e);
                if let Err(kill_err) = child.kill().await {
                    warn!("Failed to kill worker process: {}", kill_err);
                }
            }
            Err(e) => warn!("Leaving worker process running: {}", e),
        }

        result
    }
}

fn check_task_id(expected: &str, actual: &str) -> Result<(), ExecutionError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ExecutionError::ProtocolError(format!(
            "worker reported on task {} while running {}",
            actual, expected
        )))
    }
}

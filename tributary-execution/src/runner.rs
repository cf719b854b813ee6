//! Worker-side task runner
//!
//! A worker process runs exactly one task: it waits for [`ToTask::StartTask`],
//! looks the task up in its pipeline registry, binds the task's arguments
//! through the supervisor and reports the outcome.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tributary_core::{InMemoryDagRegistry, Materialization, OperatorError, ResolveError};
use tributary_ipc::{IpcTransport, StartTask, StdioTransport, ToSupervisor, ToTask, WorkerError};

use crate::comms::SupervisorComms;
use crate::error::ExecutionError;

/// Caller identity used before a task has been assigned
const UNASSIGNED_CALLER: &str = "worker";

/// How a task run ended, from the worker's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRunOutcome {
    Succeeded(Materialization),
    /// The failure was reported to the supervisor
    Failed(WorkerError),
}

pub struct TaskRunner<T> {
    comms: SupervisorComms<T>,
    registry: Arc<InMemoryDagRegistry>,
}

impl<T: IpcTransport> TaskRunner<T> {
    pub fn new(transport: T, registry: Arc<InMemoryDagRegistry>) -> Self {
        Self {
            comms: SupervisorComms::new(transport, UNASSIGNED_CALLER),
            registry,
        }
    }

    pub fn comms(&self) -> &SupervisorComms<T> {
        &self.comms
    }

    pub fn into_comms(self) -> SupervisorComms<T> {
        self.comms
    }

    /// Run the next task the supervisor assigns.
    ///
    /// Task failures are reported to the supervisor and returned as
    /// [`TaskRunOutcome::Failed`]; an `Err` means the channel itself broke.
    pub async fn run(&mut self) -> Result<TaskRunOutcome, ExecutionError> {
        let start = match self.comms.get_message().await? {
            ToTask::StartTask(start) => start,
            other => {
                return Err(ExecutionError::ProtocolError(format!(
                    "expected start_task, got {}",
                    other.kind()
                )))
            }
        };

        info!(
            "Starting task {} of pipeline {} (run {})",
            start.task_id, start.dag_id, start.run_id
        );
        self.comms.set_caller(start.task_id.clone());

        let operator = match self.registry.operator(&start.dag_id, &start.task_id) {
            Ok(operator) => operator,
            Err(e) => {
                warn!("Cannot run task: {}", e);
                let error = WorkerError::TaskNotFound {
                    dag_id: start.dag_id.clone(),
                    task_id: start.task_id.clone(),
                };
                return self.report_failure(&start, error).await;
            }
        };

        match operator.execute(&start.task_context(), &mut self.comms).await {
            Ok(materialization) => {
                debug!(
                    "Task {} materialized {} outlet(s)",
                    start.task_id,
                    materialization.outlets.len()
                );
                let message = ToSupervisor::SucceedTask {
                    task_id: start.task_id.clone(),
                    output: materialization.value.clone(),
                    outlets: materialization.outlets.clone(),
                    end_date: Utc::now(),
                };
                self.comms.send_request(&start.task_id, message).await?;
                info!("Task {} succeeded", start.task_id);
                Ok(TaskRunOutcome::Succeeded(materialization))
            }
            Err(OperatorError::Resolve(ResolveError::Channel(e))) => {
                error!("Lost connection to supervisor while running {}: {}", start.task_id, e);
                Err(ExecutionError::IpcError(e))
            }
            Err(e) => {
                let error = if e.is_binding_failure() {
                    WorkerError::BindingFailed {
                        error: e.to_string(),
                    }
                } else {
                    WorkerError::TaskExecutionFailed {
                        task_id: start.task_id.clone(),
                        error: e.to_string(),
                    }
                };
                self.report_failure(&start, error).await
            }
        }
    }

    async fn report_failure(
        &mut self,
        start: &StartTask,
        error: WorkerError,
    ) -> Result<TaskRunOutcome, ExecutionError> {
        error!("Task {} failed: {}", start.task_id, error);
        let message = ToSupervisor::TaskFailed {
            task_id: start.task_id.clone(),
            error: error.clone(),
        };
        self.comms.send_request(&start.task_id, message).await?;
        Ok(TaskRunOutcome::Failed(error))
    }
}

/// Worker process entry point: run one task over stdin/stdout.
///
/// Logging must not go to stdout here, it carries the protocol.
pub async fn run_stdio_worker(
    registry: Arc<InMemoryDagRegistry>,
) -> Result<TaskRunOutcome, ExecutionError> {
    let mut runner = TaskRunner::new(StdioTransport::new(), registry);
    let outcome = runner.run().await;
    runner.comms.close().await?;
    outcome
}

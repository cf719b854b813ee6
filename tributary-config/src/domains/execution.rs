//! Task execution configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied while a supervisor drives a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on a whole task run, lookups included
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_task_timeout")]
    pub task_timeout: Duration,

    /// Upper bound on the wait for any single worker message
    #[serde(with = "crate::domains::utils::serde_duration_option", default)]
    pub message_timeout: Option<Duration>,

    /// Kill the worker process when supervision fails
    #[serde(default = "crate::domains::utils::default_true")]
    pub kill_on_timeout: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            task_timeout: default_task_timeout(),
            message_timeout: None,
            kill_on_timeout: true,
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.task_timeout.as_secs(), "task_timeout", self.domain_name())?;

        if let Some(message_timeout) = self.message_timeout {
            validate_positive(message_timeout.as_secs(), "message_timeout", self.domain_name())?;

            if message_timeout > self.task_timeout {
                return Err(self.validation_error(format!(
                    "message_timeout ({}s) cannot exceed task_timeout ({}s)",
                    message_timeout.as_secs(),
                    self.task_timeout.as_secs()
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

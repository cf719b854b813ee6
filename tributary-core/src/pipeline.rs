//! Backing pipeline objects and their registry

use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::asset::AssetRef;
use crate::error::RegistryError;
use crate::function::Context;
use crate::operator::MainOperator;

/// When a pipeline runs
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Schedule {
    /// Only triggered manually
    #[default]
    None,
    /// Cron expression, passed through to the scheduler untouched
    Cron(String),
    /// Triggered when any of these assets is updated
    Assets(Vec<AssetRef>),
}

type CallbackFn = dyn Fn(&Context) + Send + Sync;

/// Pipeline-level success/failure hook
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn invoke(&self, context: &Context) {
        (self.0)(context)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Pipeline options accepted by the definition builders
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub dag_display_name: Option<String>,
    pub description: Option<String>,
    pub catchup: bool,
    pub is_paused_upon_creation: Option<bool>,
    pub on_failure_callback: Option<Callback>,
    pub on_success_callback: Option<Callback>,
    pub params: Option<serde_json::Map<String, JsonValue>>,
    pub access_control: Option<JsonValue>,
    pub owner_links: HashMap<String, String>,
    pub tags: BTreeSet<String>,
    pub auto_register: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dag_display_name: None,
            description: None,
            catchup: false,
            is_paused_upon_creation: None,
            on_failure_callback: None,
            on_success_callback: None,
            params: None,
            access_control: None,
            owner_links: HashMap::new(),
            tags: BTreeSet::new(),
            auto_register: true,
        }
    }
}

impl PipelineOptions {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_catchup(mut self, catchup: bool) -> Self {
        self.catchup = catchup;
        self
    }

    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }
}

/// Constructor arguments of a backing pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct DagArgs {
    pub dag_id: String,
    pub dag_display_name: String,
    pub description: Option<String>,
    pub schedule: Schedule,
    pub catchup: bool,
    pub is_paused_upon_creation: Option<bool>,
    pub on_failure_callback: Option<Callback>,
    pub on_success_callback: Option<Callback>,
    pub params: Option<serde_json::Map<String, JsonValue>>,
    pub access_control: Option<JsonValue>,
    pub owner_links: HashMap<String, String>,
    pub tags: BTreeSet<String>,
    pub auto_register: bool,
}

impl DagArgs {
    /// Build pipeline arguments; the display name falls back to the dag id
    pub fn new(dag_id: impl Into<String>, schedule: Schedule, options: &PipelineOptions) -> Self {
        let dag_id = dag_id.into();
        Self {
            dag_display_name: options
                .dag_display_name
                .clone()
                .unwrap_or_else(|| dag_id.clone()),
            dag_id,
            description: options.description.clone(),
            schedule,
            catchup: options.catchup,
            is_paused_upon_creation: options.is_paused_upon_creation,
            on_failure_callback: options.on_failure_callback.clone(),
            on_success_callback: options.on_success_callback.clone(),
            params: options.params.clone(),
            access_control: options.access_control.clone(),
            owner_links: options.owner_links.clone(),
            tags: options.tags.clone(),
            auto_register: options.auto_register,
        }
    }
}

/// A backing pipeline holding the tasks that materialize an asset definition
#[derive(Debug, Clone)]
pub struct Dag {
    args: DagArgs,
    tasks: Vec<MainOperator>,
}

impl Dag {
    pub fn new(args: DagArgs) -> Self {
        Self {
            args,
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: MainOperator) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn args(&self) -> &DagArgs {
        &self.args
    }

    pub fn dag_id(&self) -> &str {
        &self.args.dag_id
    }

    pub fn tasks(&self) -> &[MainOperator] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&MainOperator> {
        self.tasks.iter().find(|t| t.task_id() == task_id)
    }
}

/// Receives pipelines as definitions are built
#[cfg_attr(test, mockall::automock)]
pub trait DagRegistry: Send + Sync {
    fn register(&self, dag: Dag) -> Result<(), RegistryError>;
}

/// Process-local pipeline registry
#[derive(Debug, Default)]
pub struct InMemoryDagRegistry {
    dags: RwLock<HashMap<String, Arc<Dag>>>,
}

impl InMemoryDagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dag_id: &str) -> Option<Arc<Dag>> {
        self.dags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dag_id)
            .cloned()
    }

    /// Look up a task of a registered pipeline
    pub fn operator(&self, dag_id: &str, task_id: &str) -> Result<MainOperator, RegistryError> {
        let dag = self
            .get(dag_id)
            .ok_or_else(|| RegistryError::DagNotFound(dag_id.to_string()))?;

        dag.task(task_id)
            .cloned()
            .ok_or_else(|| RegistryError::TaskNotFound {
                dag_id: dag_id.to_string(),
                task_id: task_id.to_string(),
            })
    }

    pub fn dag_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .dags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.dags.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DagRegistry for InMemoryDagRegistry {
    fn register(&self, dag: Dag) -> Result<(), RegistryError> {
        let mut dags = self.dags.write().unwrap_or_else(PoisonError::into_inner);
        if dags.contains_key(dag.dag_id()) {
            return Err(RegistryError::DuplicateDag(dag.dag_id().to_string()));
        }

        debug!("Registering pipeline {} with {} task(s)", dag.dag_id(), dag.tasks().len());
        dags.insert(dag.dag_id().to_string(), Arc::new(dag));
        Ok(())
    }
}

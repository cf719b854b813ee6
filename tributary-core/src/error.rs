//! Core error types for Tributary

use thiserror::Error;

/// Core error type for all Tributary errors
#[derive(Debug, Error)]
pub enum TributaryError {
    /// Definition-time errors
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Execution-time binding or invocation errors
    #[error("Operator error: {0}")]
    Operator(#[from] OperatorError),

    /// Asset resolution errors
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Pipeline registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type alias for Tributary
pub type Result<T> = std::result::Result<T, TributaryError>;

/// Invalid-definition errors, raised while building a definition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("nested function not supported")]
    NestedFunction,

    #[error("prohibited name for asset: {0}")]
    ProhibitedName(String),

    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),

    #[error("failed to register pipeline: {0}")]
    Registration(#[from] RegistryError),
}

/// Pipeline registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Pipeline already registered: {0}")]
    DuplicateDag(String),

    #[error("Pipeline not found: {0}")]
    DagNotFound(String),

    #[error("Task {task_id} not found in pipeline {dag_id}")]
    TaskNotFound { dag_id: String, task_id: String },
}

/// Errors surfaced while resolving an asset reference
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The supervisor answered, but knows no asset by that name
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// The supervisor answered with something other than the expected result
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The channel itself failed (closed, timed out, undecodable)
    #[error("Channel error: {0}")]
    Channel(String),
}

/// Errors raised by the main operator while binding or invoking
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Unresolved dependency: argument '{0}' is not an asset and has no default")]
    UnresolvedDependency(String),

    #[error("Asset function '{name}' failed: {source}")]
    Callable {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl OperatorError {
    /// Whether the failure happened before user code was invoked
    pub fn is_binding_failure(&self) -> bool {
        !matches!(self, OperatorError::Callable { .. })
    }
}

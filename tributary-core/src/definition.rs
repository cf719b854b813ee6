//! Asset definitions and the builders that produce them
//!
//! A definition is built from a plain [`AssetFunction`] plus declared
//! metadata. Building validates the function, computes defaults, classifies
//! every parameter once, and registers exactly one backing [`Dag`] holding
//! one [`MainOperator`].

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::asset::{Asset, Extra};
use crate::error::DefinitionError;
use crate::function::{AssetFunction, ParameterKind, CONTEXT_PARAMETER, SELF_PARAMETER};
use crate::operator::MainOperator;
use crate::pipeline::{Dag, DagArgs, DagRegistry, PipelineOptions, Schedule};

/// Names an asset definition may not take
pub const PROHIBITED_NAMES: [&str; 2] = [SELF_PARAMETER, CONTEXT_PARAMETER];

/// Specification of the pipeline backing a definition
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionSource {
    pub schedule: Schedule,
    pub dag_id: String,
    /// Explicit outlets, set for multi-asset definitions only
    pub outlets: Option<Vec<Asset>>,
    pub options: PipelineOptions,
}

/// Behaviour shared by single- and multi-asset definitions
pub trait Definition {
    /// Name of the definition; also the task id
    fn name(&self) -> &str;

    /// The wrapped function
    fn function(&self) -> &Arc<AssetFunction>;

    fn source(&self) -> &DefinitionSource;

    /// Parameter classification computed at build time, in declaration order
    fn parameter_kinds(&self) -> &[(String, ParameterKind)];

    /// Assets produced by running the definition
    fn outlets(&self) -> Vec<Asset>;

    /// The backing pipeline built for this definition
    fn dag(&self) -> &Dag;
}

/// A function registered as the producer of one asset
#[derive(Debug, Clone)]
pub struct AssetDefinition {
    asset: Asset,
    function: Arc<AssetFunction>,
    source: DefinitionSource,
    parameter_kinds: Vec<(String, ParameterKind)>,
    dag: Arc<Dag>,
}

impl AssetDefinition {
    pub fn name(&self) -> &str {
        self.asset.name()
    }

    pub fn uri(&self) -> &str {
        self.asset.uri()
    }

    pub fn group(&self) -> &str {
        self.asset.group()
    }

    pub fn extra(&self) -> &Extra {
        self.asset.extra()
    }

    /// The asset this definition produces
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn function(&self) -> &Arc<AssetFunction> {
        &self.function
    }

    pub fn source(&self) -> &DefinitionSource {
        &self.source
    }

    /// The backing pipeline, built whether or not it was registered
    pub fn dag(&self) -> &Dag {
        &self.dag
    }
}

impl Definition for AssetDefinition {
    fn name(&self) -> &str {
        AssetDefinition::name(self)
    }

    fn function(&self) -> &Arc<AssetFunction> {
        &self.function
    }

    fn source(&self) -> &DefinitionSource {
        &self.source
    }

    fn parameter_kinds(&self) -> &[(String, ParameterKind)] {
        &self.parameter_kinds
    }

    fn outlets(&self) -> Vec<Asset> {
        vec![self.asset.clone()]
    }

    fn dag(&self) -> &Dag {
        &self.dag
    }
}

/// A function registered as the producer of several assets
#[derive(Debug, Clone)]
pub struct MultiAssetDefinition {
    name: String,
    function: Arc<AssetFunction>,
    source: DefinitionSource,
    parameter_kinds: Vec<(String, ParameterKind)>,
    dag: Arc<Dag>,
}

impl MultiAssetDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &Arc<AssetFunction> {
        &self.function
    }

    pub fn source(&self) -> &DefinitionSource {
        &self.source
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }
}

impl Definition for MultiAssetDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn function(&self) -> &Arc<AssetFunction> {
        &self.function
    }

    fn source(&self) -> &DefinitionSource {
        &self.source
    }

    fn parameter_kinds(&self) -> &[(String, ParameterKind)] {
        &self.parameter_kinds
    }

    fn outlets(&self) -> Vec<Asset> {
        self.source.outlets.clone().unwrap_or_default()
    }

    fn dag(&self) -> &Dag {
        &self.dag
    }
}

/// Start declaring a single-asset definition
pub fn asset(schedule: Schedule) -> AssetDecorator {
    AssetDecorator::new(schedule)
}

/// Builder for [`AssetDefinition`]
#[derive(Debug, Clone, Default)]
pub struct AssetDecorator {
    schedule: Schedule,
    uri: Option<String>,
    name: Option<String>,
    group: Option<String>,
    extra: Option<Extra>,
    dag_id: Option<String>,
    options: PipelineOptions,
}

impl AssetDecorator {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            ..Default::default()
        }
    }

    /// Start declaring a multi-asset definition with explicit outlets
    pub fn multi(schedule: Schedule, outlets: Vec<Asset>) -> MultiAssetDecorator {
        MultiAssetDecorator::new(schedule, outlets)
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn extra(mut self, extra: Extra) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn dag_id(mut self, dag_id: impl Into<String>) -> Self {
        self.dag_id = Some(dag_id.into());
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate `function` and build the definition, registering its pipeline
    pub fn define(
        self,
        function: AssetFunction,
        registry: &dyn DagRegistry,
    ) -> Result<AssetDefinition, DefinitionError> {
        let name = validated_name(&function, self.name)?;
        let parameter_kinds = classify_parameters(&function)?;

        let asset = Asset::from_parts(name.clone(), self.uri, self.group, self.extra);
        let source = DefinitionSource {
            schedule: self.schedule,
            dag_id: self.dag_id.unwrap_or(name),
            outlets: None,
            options: self.options,
        };

        let mut definition = AssetDefinition {
            asset,
            function: Arc::new(function),
            dag: empty_pipeline(&source),
            source,
            parameter_kinds,
        };
        definition.dag = attach_pipeline(&definition, registry)?;
        Ok(definition)
    }
}

/// Builder for [`MultiAssetDefinition`]
#[derive(Debug, Clone)]
pub struct MultiAssetDecorator {
    schedule: Schedule,
    outlets: Vec<Asset>,
    name: Option<String>,
    dag_id: Option<String>,
    options: PipelineOptions,
}

impl MultiAssetDecorator {
    pub fn new(schedule: Schedule, outlets: Vec<Asset>) -> Self {
        Self {
            schedule,
            outlets,
            name: None,
            dag_id: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dag_id(mut self, dag_id: impl Into<String>) -> Self {
        self.dag_id = Some(dag_id.into());
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate `function` and build the definition, registering its pipeline
    pub fn define(
        self,
        function: AssetFunction,
        registry: &dyn DagRegistry,
    ) -> Result<MultiAssetDefinition, DefinitionError> {
        let name = validated_name(&function, self.name)?;
        let parameter_kinds = classify_parameters(&function)?;

        let source = DefinitionSource {
            schedule: self.schedule,
            dag_id: self.dag_id.unwrap_or_else(|| name.clone()),
            outlets: Some(self.outlets),
            options: self.options,
        };

        let mut definition = MultiAssetDefinition {
            name,
            function: Arc::new(function),
            dag: empty_pipeline(&source),
            source,
            parameter_kinds,
        };
        definition.dag = attach_pipeline(&definition, registry)?;
        Ok(definition)
    }
}

/// Reject nested functions, then resolve and check the definition name
fn validated_name(
    function: &AssetFunction,
    explicit: Option<String>,
) -> Result<String, DefinitionError> {
    if function.is_nested() {
        return Err(DefinitionError::NestedFunction);
    }

    let name = explicit.unwrap_or_else(|| function.name().to_string());
    if PROHIBITED_NAMES.contains(&name.as_str()) {
        return Err(DefinitionError::ProhibitedName(name));
    }
    Ok(name)
}

fn classify_parameters(
    function: &AssetFunction,
) -> Result<Vec<(String, ParameterKind)>, DefinitionError> {
    let mut seen = HashSet::new();
    for parameter in function.parameters() {
        if !seen.insert(parameter.name()) {
            return Err(DefinitionError::DuplicateParameter(parameter.name().to_string()));
        }
    }
    Ok(function.parameter_kinds())
}

fn empty_pipeline(source: &DefinitionSource) -> Arc<Dag> {
    Arc::new(Dag::new(DagArgs::new(
        source.dag_id.clone(),
        source.schedule.clone(),
        &source.options,
    )))
}

/// Add the definition's single task to its pipeline, then register it
/// unless the options opt out
fn attach_pipeline<D: Definition>(
    definition: &D,
    registry: &dyn DagRegistry,
) -> Result<Arc<Dag>, DefinitionError> {
    let operator = MainOperator::from_definition(definition);
    let dag = definition.dag().clone().with_task(operator);

    if !definition.source().options.auto_register {
        debug!("Pipeline {} built without registration", dag.dag_id());
        return Ok(Arc::new(dag));
    }

    registry.register(dag.clone())?;
    debug!("Registered asset definition {}", definition.name());
    Ok(Arc::new(dag))
}

//! Main operator: binds resolved assets to an asset function and runs it

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info};

use crate::asset::{Asset, AssetRef};
use crate::definition::Definition;
use crate::error::OperatorError;
use crate::function::{Argument, AssetFunction, Context, Kwargs, ParameterKind};
use crate::resolver::AssetResolver;

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    /// Value returned by the asset function
    pub value: JsonValue,
    /// Assets materialized by the run
    pub outlets: Vec<Asset>,
}

/// Execution-time adapter around an asset function
#[derive(Debug, Clone)]
pub struct MainOperator {
    task_id: String,
    inlets: Vec<AssetRef>,
    outlets: Vec<Asset>,
    python_callable: Arc<AssetFunction>,
    definition_name: String,
    parameter_kinds: Vec<(String, ParameterKind)>,
}

impl MainOperator {
    /// Create an operator with explicit inlets and outlets
    pub fn new(
        task_id: impl Into<String>,
        inlets: Vec<AssetRef>,
        outlets: Vec<Asset>,
        python_callable: Arc<AssetFunction>,
        definition_name: impl Into<String>,
    ) -> Self {
        let parameter_kinds = python_callable.parameter_kinds();
        Self {
            task_id: task_id.into(),
            inlets,
            outlets,
            python_callable,
            definition_name: definition_name.into(),
            parameter_kinds,
        }
    }

    /// Build the operator for a definition.
    ///
    /// Parameters without a default (other than `self` and `context`) become
    /// inlet references, in declaration order.
    pub fn from_definition<D: Definition + ?Sized>(definition: &D) -> Self {
        let inlets = definition
            .parameter_kinds()
            .iter()
            .filter(|(_, kind)| *kind == ParameterKind::Inlet)
            .map(|(name, _)| AssetRef::new(name.clone()))
            .collect();

        Self {
            task_id: definition.name().to_string(),
            inlets,
            outlets: definition.outlets(),
            python_callable: Arc::clone(definition.function()),
            definition_name: definition.name().to_string(),
            parameter_kinds: definition.parameter_kinds().to_vec(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn inlets(&self) -> &[AssetRef] {
        &self.inlets
    }

    pub fn outlets(&self) -> &[Asset] {
        &self.outlets
    }

    pub fn python_callable(&self) -> &Arc<AssetFunction> {
        &self.python_callable
    }

    pub fn definition_name(&self) -> &str {
        &self.definition_name
    }

    fn is_inlet(&self, name: &str) -> bool {
        self.inlets.iter().any(|inlet| inlet.name() == name)
    }

    /// Assemble keyword arguments for the asset function.
    ///
    /// Resolution requests are issued one at a time in parameter order:
    /// `self` resolves the definition's own asset, every inlet parameter
    /// resolves by its name. An inlet wins over a declared default.
    pub async fn determine_kwargs<R>(
        &self,
        context: &Context,
        resolver: &mut R,
    ) -> Result<Kwargs, OperatorError>
    where
        R: AssetResolver + ?Sized,
    {
        let mut kwargs = Kwargs::with_capacity(self.parameter_kinds.len());

        for (name, kind) in &self.parameter_kinds {
            let argument = match kind {
                ParameterKind::SelfAsset => {
                    debug!("Resolving own asset {} for task {}", self.definition_name, self.task_id);
                    Argument::Asset(resolver.resolve(&self.definition_name).await?)
                }
                ParameterKind::Context => Argument::Context(context.clone()),
                _ if self.is_inlet(name) => {
                    debug!("Resolving inlet asset {} for task {}", name, self.task_id);
                    Argument::Asset(resolver.resolve(name).await?)
                }
                ParameterKind::Plain { default } => Argument::Value(default.clone()),
                ParameterKind::Inlet => {
                    return Err(OperatorError::UnresolvedDependency(name.clone()));
                }
            };
            kwargs.insert(name.clone(), argument);
        }

        Ok(kwargs)
    }

    /// Resolve every argument, then invoke the asset function
    pub async fn execute<R>(
        &self,
        context: &Context,
        resolver: &mut R,
    ) -> Result<Materialization, OperatorError>
    where
        R: AssetResolver + ?Sized,
    {
        let kwargs = self.determine_kwargs(context, resolver).await?;

        info!(
            "Invoking asset function {} for task {} with {} argument(s)",
            self.python_callable.name(),
            self.task_id,
            kwargs.len()
        );
        let value = self
            .python_callable
            .call(&kwargs)
            .map_err(|source| OperatorError::Callable {
                name: self.python_callable.name().to_string(),
                source,
            })?;

        Ok(Materialization {
            value,
            outlets: self.outlets.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Extra;
    use crate::definition::{asset, AssetDecorator};
    use crate::error::ResolveError;
    use crate::pipeline::{InMemoryDagRegistry, Schedule};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Answers resolution requests from a canned queue, in call order
    #[derive(Default)]
    struct ScriptedResolver {
        responses: VecDeque<Result<Asset, ResolveError>>,
        requests: Vec<String>,
    }

    impl ScriptedResolver {
        fn new(responses: Vec<Asset>) -> Self {
            Self {
                responses: responses.into_iter().map(Ok).collect(),
                requests: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl AssetResolver for ScriptedResolver {
        async fn resolve(&mut self, name: &str) -> Result<Asset, ResolveError> {
            self.requests.push(name.to_string());
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(ResolveError::Channel("no response queued".to_string())))
        }
    }

    fn extra_kv() -> Extra {
        let mut extra = Extra::new();
        extra.insert("k".to_string(), json!("v"));
        extra
    }

    fn example_asset_func_with_valid_arg_as_inlet_asset() -> AssetFunction {
        AssetFunction::new("example_asset_func", |_| Ok(json!("This is example_asset")))
            .param("self")
            .param("context")
            .param("inlet_asset_1")
            .param("inlet_asset_2")
    }

    fn example_asset_func_with_valid_arg_as_inlet_asset_and_default() -> AssetFunction {
        AssetFunction::new("example_asset_func", |_| Ok(json!("This is example_asset")))
            .param("inlet_asset_1")
            .param_with_default("inlet_asset_2", "default overwrites valid asset name")
            .param_with_default("unknown_name", "default supplied for non-asset argument")
    }

    fn example_definition(function: AssetFunction) -> crate::definition::AssetDefinition {
        asset(Schedule::None)
            .uri("s3://bucket/object")
            .group("MLModel")
            .extra(extra_kv())
            .define(function, &InMemoryDagRegistry::new())
            .unwrap()
    }

    #[test]
    fn test_from_definition() {
        let definition = example_definition(example_asset_func_with_valid_arg_as_inlet_asset());
        let op = MainOperator::from_definition(&definition);

        assert_eq!(op.task_id(), "example_asset_func");
        assert_eq!(
            op.inlets(),
            [Asset::reference("inlet_asset_1"), Asset::reference("inlet_asset_2")]
        );
        assert_eq!(op.outlets(), [definition.asset().clone()]);
        assert!(Arc::ptr_eq(op.python_callable(), definition.function()));
        assert_eq!(op.definition_name(), "example_asset_func");
    }

    #[test]
    fn test_from_definition_default() {
        let definition =
            example_definition(example_asset_func_with_valid_arg_as_inlet_asset_and_default());
        let op = MainOperator::from_definition(&definition);

        assert_eq!(op.task_id(), "example_asset_func");
        assert_eq!(op.inlets(), [Asset::reference("inlet_asset_1")]);
        assert_eq!(op.outlets(), [definition.asset().clone()]);
        assert_eq!(op.definition_name(), "example_asset_func");
    }

    #[test]
    fn test_from_definition_multi() {
        let definition = AssetDecorator::multi(Schedule::None, vec![Asset::new("a"), Asset::new("b")])
            .define(
                example_asset_func_with_valid_arg_as_inlet_asset(),
                &InMemoryDagRegistry::new(),
            )
            .unwrap();
        let op = MainOperator::from_definition(&definition);

        assert_eq!(op.task_id(), "example_asset_func");
        assert_eq!(
            op.inlets(),
            [Asset::reference("inlet_asset_1"), Asset::reference("inlet_asset_2")]
        );
        assert_eq!(op.outlets(), [Asset::new("a"), Asset::new("b")]);
        assert!(Arc::ptr_eq(op.python_callable(), definition.function()));
        assert_eq!(op.definition_name(), "example_asset_func");
    }

    #[tokio::test]
    async fn test_determine_kwargs() {
        let definition = example_definition(example_asset_func_with_valid_arg_as_inlet_asset());
        let mut resolver = ScriptedResolver::new(vec![
            Asset::from_parts(
                "example_asset_func",
                Some("s3://bucket/object".to_string()),
                Some("MLModel".to_string()),
                Some(extra_kv()),
            ),
            Asset::from_parts("inlet_asset_1", Some("s3://bucket/object1".to_string()), Some("asset".to_string()), None),
            Asset::from_parts("inlet_asset_2", Some("inlet_asset_2".to_string()), Some("asset".to_string()), None),
        ]);

        let op = MainOperator::new(
            "example_asset_func",
            vec![Asset::reference("inlet_asset_1"), Asset::reference("inlet_asset_2")],
            vec![definition.asset().clone()],
            Arc::clone(definition.function()),
            "example_asset_func",
        );

        let mut context = Context::new();
        context.insert("k".to_string(), json!("v"));
        let kwargs = op.determine_kwargs(&context, &mut resolver).await.unwrap();

        let mut expected = Kwargs::new();
        expected.insert(
            "self".to_string(),
            Argument::Asset(
                Asset::new("example_asset_func")
                    .with_uri("s3://bucket/object")
                    .with_group("MLModel")
                    .with_extra(extra_kv()),
            ),
        );
        expected.insert("context".to_string(), Argument::Context(context.clone()));
        expected.insert(
            "inlet_asset_1".to_string(),
            Argument::Asset(Asset::new("inlet_asset_1").with_uri("s3://bucket/object1")),
        );
        expected.insert("inlet_asset_2".to_string(), Argument::Asset(Asset::new("inlet_asset_2")));
        assert_eq!(kwargs, expected);

        assert_eq!(
            resolver.requests,
            vec!["example_asset_func", "inlet_asset_1", "inlet_asset_2"]
        );
    }

    #[tokio::test]
    async fn test_determine_kwargs_defaults() {
        let definition = asset(Schedule::None)
            .define(
                example_asset_func_with_valid_arg_as_inlet_asset_and_default(),
                &InMemoryDagRegistry::new(),
            )
            .unwrap();
        let mut resolver = ScriptedResolver::new(vec![Asset::new("inlet_asset_1").with_uri("s3://bucket/object1")]);

        let op = MainOperator::new(
            "__main__",
            vec![Asset::reference("inlet_asset_1")],
            vec![definition.asset().clone()],
            Arc::clone(definition.function()),
            "example_asset_func",
        );

        let kwargs = op.determine_kwargs(&Context::new(), &mut resolver).await.unwrap();

        assert_eq!(kwargs.len(), 3);
        assert_eq!(
            kwargs["inlet_asset_1"],
            Argument::Asset(Asset::new("inlet_asset_1").with_uri("s3://bucket/object1"))
        );
        assert_eq!(
            kwargs["inlet_asset_2"],
            Argument::Value(json!("default overwrites valid asset name"))
        );
        assert_eq!(
            kwargs["unknown_name"],
            Argument::Value(json!("default supplied for non-asset argument"))
        );
        assert_eq!(resolver.requests, vec!["inlet_asset_1"]);
    }

    #[tokio::test]
    async fn test_declared_inlet_overrides_default() {
        let function = Arc::new(example_asset_func_with_valid_arg_as_inlet_asset_and_default());
        let op = MainOperator::new(
            "example_asset_func",
            vec![Asset::reference("inlet_asset_1"), Asset::reference("inlet_asset_2")],
            vec![Asset::new("example_asset_func")],
            function,
            "example_asset_func",
        );
        let mut resolver = ScriptedResolver::new(vec![
            Asset::new("inlet_asset_1"),
            Asset::new("inlet_asset_2").with_uri("s3://bucket/two"),
        ]);

        let kwargs = op.determine_kwargs(&Context::new(), &mut resolver).await.unwrap();
        assert_eq!(
            kwargs["inlet_asset_2"],
            Argument::Asset(Asset::new("inlet_asset_2").with_uri("s3://bucket/two"))
        );
        assert_eq!(
            kwargs["unknown_name"],
            Argument::Value(json!("default supplied for non-asset argument"))
        );
        assert_eq!(resolver.requests, vec!["inlet_asset_1", "inlet_asset_2"]);
    }

    #[tokio::test]
    async fn test_context_bound_without_resolution() {
        let function = Arc::new(AssetFunction::new("f", |_| Ok(JsonValue::Null)).param("context"));
        let op = MainOperator::new("f", vec![], vec![Asset::new("f")], function, "f");
        let mut resolver = ScriptedResolver::default();

        let mut context = Context::new();
        context.insert("run_id".to_string(), json!("manual__1"));
        let kwargs = op.determine_kwargs(&context, &mut resolver).await.unwrap();

        assert_eq!(kwargs["context"].as_context(), Some(&context));
        assert!(resolver.requests.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_dependency() {
        let function = Arc::new(AssetFunction::new("f", |_| Ok(JsonValue::Null)).param("orphan"));
        let op = MainOperator::new("f", vec![], vec![Asset::new("f")], function, "f");
        let mut resolver = ScriptedResolver::default();

        let err = op.determine_kwargs(&Context::new(), &mut resolver).await.unwrap_err();
        assert!(matches!(err, OperatorError::UnresolvedDependency(ref name) if name == "orphan"));
        assert!(resolver.requests.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_failure_prevents_invocation() {
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let function = AssetFunction::new("f", move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(JsonValue::Null)
        })
        .param("first")
        .param("second");
        let definition = asset(Schedule::None)
            .define(function, &InMemoryDagRegistry::new())
            .unwrap();
        let op = MainOperator::from_definition(&definition);

        let mut resolver = ScriptedResolver {
            responses: VecDeque::from(vec![
                Ok(Asset::new("first")),
                Err(ResolveError::NotFound("second".to_string())),
            ]),
            requests: Vec::new(),
        };

        let err = op.execute(&Context::new(), &mut resolver).await.unwrap_err();
        assert!(matches!(err, OperatorError::Resolve(ResolveError::NotFound(_))));
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_execute_materializes_outlets() {
        let function = AssetFunction::new("report", |kwargs| {
            let upstream = kwargs["upstream"].as_asset().map(|a| a.uri().to_string());
            Ok(json!({ "read": upstream }))
        })
        .param("upstream");
        let definition = asset(Schedule::None)
            .uri("s3://reports/daily")
            .define(function, &InMemoryDagRegistry::new())
            .unwrap();
        let op = MainOperator::from_definition(&definition);
        let mut resolver = ScriptedResolver::new(vec![Asset::new("upstream").with_uri("s3://raw/events")]);

        let result = op.execute(&Context::new(), &mut resolver).await.unwrap();
        assert_eq!(result.value, json!({ "read": "s3://raw/events" }));
        assert_eq!(result.outlets, vec![definition.asset().clone()]);
    }

    #[tokio::test]
    async fn test_execute_wraps_callable_error() {
        let function = AssetFunction::new("broken", |_| Err(anyhow::anyhow!("disk full")));
        let definition = asset(Schedule::None)
            .define(function, &InMemoryDagRegistry::new())
            .unwrap();
        let op = MainOperator::from_definition(&definition);

        let err = op
            .execute(&Context::new(), &mut ScriptedResolver::default())
            .await
            .unwrap_err();
        assert!(!err.is_binding_failure());
        assert_eq!(err.to_string(), "Asset function 'broken' failed: disk full");
    }
}

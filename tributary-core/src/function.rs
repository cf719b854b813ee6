//! User callables and their parameter lists

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::asset::Asset;

/// Parameter bound to the asset the function defines
pub const SELF_PARAMETER: &str = "self";

/// Parameter bound to the execution context
pub const CONTEXT_PARAMETER: &str = "context";

/// Execution context handed to a running task
pub type Context = serde_json::Map<String, JsonValue>;

/// Keyword arguments assembled for a call
pub type Kwargs = HashMap<String, Argument>;

/// A value bound to one parameter of an asset function
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A resolved asset
    Asset(Asset),
    /// The execution context
    Context(Context),
    /// A plain value, typically the parameter's declared default
    Value(JsonValue),
}

impl Argument {
    pub fn as_asset(&self) -> Option<&Asset> {
        match self {
            Argument::Asset(asset) => Some(asset),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&Context> {
        match self {
            Argument::Context(context) => Some(context),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&JsonValue> {
        match self {
            Argument::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    default: Option<JsonValue>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<JsonValue>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&JsonValue> {
        self.default.as_ref()
    }
}

/// Where a function was declared
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FunctionScope {
    /// Declared at module level
    #[default]
    Module,
    /// Declared inside another function's body
    Local { enclosing: String },
}

/// How a parameter gets its value at run time
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    /// `self`: the definition's own asset, resolved through the channel
    SelfAsset,
    /// `context`: bound directly to the execution context
    Context,
    /// No default: an inlet asset resolved by name
    Inlet,
    /// Has a default: bound to it unless the operator lists it as an inlet
    Plain { default: JsonValue },
}

impl ParameterKind {
    pub fn classify(parameter: &Parameter) -> Self {
        match parameter.name() {
            SELF_PARAMETER => ParameterKind::SelfAsset,
            CONTEXT_PARAMETER => ParameterKind::Context,
            _ => match parameter.default() {
                Some(default) => ParameterKind::Plain {
                    default: default.clone(),
                },
                None => ParameterKind::Inlet,
            },
        }
    }
}

type Body = dyn Fn(&Kwargs) -> anyhow::Result<JsonValue> + Send + Sync;

/// A user function together with its declared signature.
///
/// Cloning is cheap; the body is shared.
#[derive(Clone)]
pub struct AssetFunction {
    name: String,
    scope: FunctionScope,
    parameters: Vec<Parameter>,
    body: Arc<Body>,
}

impl AssetFunction {
    /// Wrap a module-level function taking no parameters
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Kwargs) -> anyhow::Result<JsonValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: FunctionScope::Module,
            parameters: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Append a parameter without a default
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(Parameter::new(name));
        self
    }

    /// Append a parameter with a default value
    pub fn param_with_default(mut self, name: impl Into<String>, default: impl Into<JsonValue>) -> Self {
        self.parameters.push(Parameter::with_default(name, default));
        self
    }

    /// Mark the function as declared inside `enclosing`
    pub fn nested_in(mut self, enclosing: impl Into<String>) -> Self {
        self.scope = FunctionScope::Local {
            enclosing: enclosing.into(),
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &FunctionScope {
        &self.scope
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.scope, FunctionScope::Local { .. })
    }

    /// Classify every parameter, in declaration order
    pub fn parameter_kinds(&self) -> Vec<(String, ParameterKind)> {
        self.parameters
            .iter()
            .map(|p| (p.name().to_string(), ParameterKind::classify(p)))
            .collect()
    }

    /// Invoke the function body
    pub fn call(&self, kwargs: &Kwargs) -> anyhow::Result<JsonValue> {
        (self.body)(kwargs)
    }

    /// Whether both handles share the same body
    pub fn ptr_eq(&self, other: &AssetFunction) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for AssetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetFunction")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

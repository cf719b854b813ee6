//! Core domain models and types for Tributary
//!
//! This crate defines the asset model, the definition builder that turns a
//! plain function into a registered asset definition, and the main operator
//! that binds resolved assets to the function's parameters at run time.
//! It has no knowledge of the wire protocol; resolution goes through the
//! [`AssetResolver`] seam.

pub mod asset;
pub mod definition;
pub mod error;
pub mod function;
pub mod operator;
pub mod pipeline;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use asset::{Asset, AssetRef, Extra, DEFAULT_ASSET_GROUP};
pub use definition::{
    asset, AssetDecorator, AssetDefinition, Definition, DefinitionSource, MultiAssetDecorator,
    MultiAssetDefinition, PROHIBITED_NAMES,
};
pub use error::{
    DefinitionError, OperatorError, RegistryError, ResolveError, Result, TributaryError,
};
pub use function::{Argument, AssetFunction, Context, FunctionScope, Kwargs, Parameter, ParameterKind};
pub use operator::{MainOperator, Materialization};
pub use pipeline::{Callback, Dag, DagArgs, DagRegistry, InMemoryDagRegistry, PipelineOptions, Schedule};
pub use resolver::AssetResolver;

//! Asset resolution seam

use async_trait::async_trait;

use crate::asset::Asset;
use crate::error::ResolveError;

/// Turns an asset name into a fully-populated [`Asset`].
///
/// Taking `&mut self` keeps at most one request in flight per resolver.
#[async_trait]
pub trait AssetResolver: Send {
    async fn resolve(&mut self, name: &str) -> Result<Asset, ResolveError>;
}

//! Supervisor-side asset lookup

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tributary_core::{Asset, Definition};

/// Source of truth the supervisor consults when a worker asks for an asset
pub trait AssetCatalog: Send + Sync {
    fn get_asset_by_name(&self, name: &str) -> Option<Asset>;
}

/// Thread-safe in-memory catalog keyed by asset name
#[derive(Debug, Default)]
pub struct InMemoryAssetCatalog {
    assets: RwLock<HashMap<String, Asset>>,
}

impl InMemoryAssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        let catalog = Self::new();
        for asset in assets {
            catalog.insert(asset);
        }
        catalog
    }

    /// Insert or replace an asset, returning the previous entry
    pub fn insert(&self, asset: Asset) -> Option<Asset> {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset.name().to_string(), asset)
    }

    /// Register every asset a definition produces
    pub fn insert_outlets<D: Definition + ?Sized>(&self, definition: &D) {
        for asset in definition.outlets() {
            self.insert(asset);
        }
    }

    pub fn len(&self) -> usize {
        self.assets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetCatalog for InMemoryAssetCatalog {
    fn get_asset_by_name(&self, name: &str) -> Option<Asset> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

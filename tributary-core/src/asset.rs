//! Asset domain model

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Group assigned to assets that don't declare one
pub const DEFAULT_ASSET_GROUP: &str = "asset";

/// Free-form asset metadata
pub type Extra = serde_json::Map<String, JsonValue>;

/// A named, URI-addressed unit of data.
///
/// Assets are immutable once built; the `with_*` methods consume the value
/// and return a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    name: String,
    uri: String,
    group: String,
    #[serde(default)]
    extra: Extra,
}

impl Asset {
    /// Create an asset whose uri is its name, in the default group
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uri: name.clone(),
            name,
            group: DEFAULT_ASSET_GROUP.to_string(),
            extra: Extra::new(),
        }
    }

    /// Build an asset from optional parts, applying the same defaults as [`Asset::new`]
    pub fn from_parts(
        name: impl Into<String>,
        uri: Option<String>,
        group: Option<String>,
        extra: Option<Extra>,
    ) -> Self {
        let name = name.into();
        Self {
            uri: uri.filter(|u| !u.is_empty()).unwrap_or_else(|| name.clone()),
            group: group
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| DEFAULT_ASSET_GROUP.to_string()),
            extra: extra.unwrap_or_default(),
            name,
        }
    }

    /// Reference an asset by name only, to be resolved later
    pub fn reference(name: impl Into<String>) -> AssetRef {
        AssetRef::new(name)
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    /// The reference form of this asset
    pub fn to_ref(&self) -> AssetRef {
        AssetRef::new(self.name.clone())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset(name={}, uri={}, group={})", self.name, self.uri, self.group)
    }
}

/// Unresolved, name-only reference to an asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    name: String,
}

impl AssetRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetRef(name={})", self.name)
    }
}

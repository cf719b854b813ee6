//! Document and object store collaborators

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::error::{TransferError, TransferResult};

/// Query run against a document collection
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentQuery {
    Find {
        filter: JsonValue,
        projection: Option<JsonValue>,
    },
    Aggregate {
        pipeline: Vec<JsonValue>,
        /// Let the store spill to temporary files on large pipelines
        allow_disk_use: bool,
    },
}

impl DocumentQuery {
    pub fn find(filter: JsonValue) -> Self {
        DocumentQuery::Find {
            filter,
            projection: None,
        }
    }

    pub fn aggregate(pipeline: Vec<JsonValue>) -> Self {
        DocumentQuery::Aggregate {
            pipeline,
            allow_disk_use: false,
        }
    }

    /// A JSON array is an aggregation pipeline, an object is a find filter
    pub fn from_value(query: JsonValue) -> TransferResult<Self> {
        match query {
            JsonValue::Array(pipeline) => Ok(Self::aggregate(pipeline)),
            filter @ JsonValue::Object(_) => Ok(Self::find(filter)),
            other => Err(TransferError::InvalidQuery(format!(
                "expected an object or an array, got {}",
                other
            ))),
        }
    }

    /// Only takes effect on find queries
    pub fn with_projection(self, projection: JsonValue) -> Self {
        match self {
            DocumentQuery::Find { filter, .. } => DocumentQuery::Find {
                filter,
                projection: Some(projection),
            },
            aggregate => aggregate,
        }
    }

    /// Only takes effect on aggregation pipelines
    pub fn with_allow_disk_use(self, allow: bool) -> Self {
        match self {
            DocumentQuery::Aggregate { pipeline, .. } => DocumentQuery::Aggregate {
                pipeline,
                allow_disk_use: allow,
            },
            find => find,
        }
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self, DocumentQuery::Aggregate { .. })
    }
}

/// Collection a query runs against; `db` falls back to the store's default
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentSource {
    pub db: Option<String>,
    pub collection: String,
}

impl DocumentSource {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            db: None,
            collection: collection.into(),
        }
    }

    pub fn in_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.db {
            Some(db) => write!(f, "{}.{}", db, self.collection),
            None => f.write_str(&self.collection),
        }
    }
}

/// Output compression for stored objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Gzip => f.write_str("gzip"),
        }
    }
}

impl FromStr for Compression {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            _ => Err(TransferError::UnsupportedCompression(s.to_string())),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        source: &DocumentSource,
        filter: &JsonValue,
        projection: &Option<JsonValue>,
    ) -> TransferResult<Vec<JsonValue>>;

    async fn aggregate(
        &self,
        source: &DocumentSource,
        pipeline: &[JsonValue],
        allow_disk_use: bool,
    ) -> TransferResult<Vec<JsonValue>>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `bucket`/`key`. Fails with
    /// [`TransferError::ObjectExists`] when the key is taken and `replace`
    /// is false.
    async fn load_string(
        &self,
        data: &str,
        key: &str,
        bucket: &str,
        replace: bool,
        compression: Option<Compression>,
    ) -> TransferResult<()>;
}

/// Collections held in memory. Supports equality filters, projections and
/// the `$match`, `$project` and `$limit` pipeline stages.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<DocumentSource, Vec<JsonValue>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_many(&self, source: DocumentSource, documents: impl IntoIterator<Item = JsonValue>) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source)
            .or_default()
            .extend(documents);
    }

    fn documents(&self, source: &DocumentSource) -> Vec<JsonValue> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(
        &self,
        source: &DocumentSource,
        filter: &JsonValue,
        projection: &Option<JsonValue>,
    ) -> TransferResult<Vec<JsonValue>> {
        let filter = as_object(filter, "filter")?;
        let mut found: Vec<JsonValue> = self
            .documents(source)
            .into_iter()
            .filter(|doc| matches_filter(doc, filter))
            .collect();

        if let Some(projection) = projection {
            let projection = as_object(projection, "projection")?;
            found = found.iter().map(|doc| project(doc, projection)).collect();
        }

        debug!("find on {} returned {} document(s)", source, found.len());
        Ok(found)
    }

    async fn aggregate(
        &self,
        source: &DocumentSource,
        pipeline: &[JsonValue],
        _allow_disk_use: bool,
    ) -> TransferResult<Vec<JsonValue>> {
        let mut docs = self.documents(source);

        for stage in pipeline {
            let stage = as_object(stage, "pipeline stage")?;
            let (operator, argument) = match stage.iter().next() {
                Some(entry) if stage.len() == 1 => entry,
                _ => {
                    return Err(TransferError::InvalidQuery(
                        "pipeline stage must have exactly one operator".to_string(),
                    ))
                }
            };

            docs = match operator.as_str() {
                "$match" => {
                    let filter = as_object(argument, "$match")?;
                    docs.into_iter().filter(|doc| matches_filter(doc, filter)).collect()
                }
                "$project" => {
                    let projection = as_object(argument, "$project")?;
                    docs.iter().map(|doc| project(doc, projection)).collect()
                }
                "$limit" => {
                    let limit = argument.as_u64().ok_or_else(|| {
                        TransferError::InvalidQuery("$limit expects a positive integer".to_string())
                    })?;
                    docs.into_iter().take(limit as usize).collect()
                }
                other => {
                    return Err(TransferError::InvalidQuery(format!(
                        "unsupported pipeline stage: {}",
                        other
                    )))
                }
            };
        }

        debug!("aggregate on {} returned {} document(s)", source, docs.len());
        Ok(docs)
    }
}

fn as_object<'a>(value: &'a JsonValue, what: &str) -> TransferResult<&'a Map<String, JsonValue>> {
    value
        .as_object()
        .ok_or_else(|| TransferError::InvalidQuery(format!("{} must be an object", what)))
}

fn matches_filter(doc: &JsonValue, filter: &Map<String, JsonValue>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| doc.get(field) == Some(expected))
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64() != Some(0.0),
        JsonValue::Null => false,
        _ => true,
    }
}

/// Inclusion projection when any non-`_id` field is truthy, exclusion otherwise
fn project(doc: &JsonValue, projection: &Map<String, JsonValue>) -> JsonValue {
    let Some(fields) = doc.as_object() else {
        return doc.clone();
    };

    let inclusive = projection
        .iter()
        .any(|(field, flag)| field != "_id" && is_truthy(flag));
    let keep_id = projection.get("_id").map_or(true, is_truthy);

    let projected = fields
        .iter()
        .filter(|(field, _)| {
            if field.as_str() == "_id" {
                keep_id
            } else if inclusive {
                projection.get(*field).is_some_and(is_truthy)
            } else {
                projection.get(*field).map_or(true, is_truthy)
            }
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    JsonValue::Object(projected)
}

/// An object held by [`InMemoryObjectStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: String,
    pub compression: Option<Compression>,
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn load_string(
        &self,
        data: &str,
        key: &str,
        bucket: &str,
        replace: bool,
        compression: Option<Compression>,
    ) -> TransferResult<()> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let slot = (bucket.to_string(), key.to_string());

        if !replace && objects.contains_key(&slot) {
            return Err(TransferError::ObjectExists {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        objects.insert(
            slot,
            StoredObject {
                data: data.to_string(),
                compression,
            },
        );
        Ok(())
    }
}

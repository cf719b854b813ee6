//! Query documents, serialise them and store the result as one object

use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{TransferError, TransferResult};
use crate::store::{Compression, DocumentQuery, DocumentSource, DocumentStore, ObjectStore};

/// Hook applied to the queried documents before they are serialised
pub type Transform = Arc<dyn Fn(Vec<JsonValue>) -> anyhow::Result<Vec<JsonValue>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTransferConfig {
    pub source: DocumentSource,
    pub query: DocumentQuery,
    pub bucket: String,
    pub key: String,
    /// Overwrite an existing object at `bucket`/`key`
    pub replace: bool,
    pub compression: Option<Compression>,
}

impl DocumentTransferConfig {
    pub fn new(
        source: DocumentSource,
        query: DocumentQuery,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source,
            query,
            bucket: bucket.into(),
            key: key.into(),
            replace: false,
            compression: None,
        }
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn validate(&self) -> TransferResult<()> {
        for (field, value) in [
            ("collection", &self.source.collection),
            ("bucket", &self.bucket),
            ("key", &self.key),
        ] {
            if value.trim().is_empty() {
                return Err(TransferError::InvalidConfig(format!("{} cannot be empty", field)));
            }
        }
        Ok(())
    }
}

/// Summary of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub documents: usize,
    pub bytes: usize,
    pub bucket: String,
    pub key: String,
}

/// Moves the result of a document query into an object store
pub struct DocumentTransferOperator<D, O> {
    config: DocumentTransferConfig,
    documents: Arc<D>,
    objects: Arc<O>,
    transform: Option<Transform>,
}

impl<D, O> fmt::Debug for DocumentTransferOperator<D, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentTransferOperator")
            .field("config", &self.config)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl<D: DocumentStore, O: ObjectStore> DocumentTransferOperator<D, O> {
    pub fn new(config: DocumentTransferConfig, documents: Arc<D>, objects: Arc<O>) -> Self {
        Self {
            config,
            documents,
            objects,
            transform: None,
        }
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<JsonValue>) -> anyhow::Result<Vec<JsonValue>> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn config(&self) -> &DocumentTransferConfig {
        &self.config
    }

    pub async fn execute(&self) -> TransferResult<TransferReport> {
        self.config.validate()?;
        let config = &self.config;

        let docs = match &config.query {
            DocumentQuery::Find { filter, projection } => {
                self.documents.find(&config.source, filter, projection).await?
            }
            DocumentQuery::Aggregate {
                pipeline,
                allow_disk_use,
            } => {
                self.documents
                    .aggregate(&config.source, pipeline, *allow_disk_use)
                    .await?
            }
        };
        debug!("Queried {} document(s) from {}", docs.len(), config.source);

        let docs = match &self.transform {
            Some(transform) => transform(docs).map_err(TransferError::Transform)?,
            None => docs,
        };

        let data = stringify(&docs, "\n")?;
        self.objects
            .load_string(
                &data,
                &config.key,
                &config.bucket,
                config.replace,
                config.compression,
            )
            .await?;

        info!(
            "Transferred {} document(s) from {} to {}/{}",
            docs.len(),
            config.source,
            config.bucket,
            config.key
        );
        Ok(TransferReport {
            documents: docs.len(),
            bytes: data.len(),
            bucket: config.bucket.clone(),
            key: config.key.clone(),
        })
    }
}

/// Serialise each document as JSON and join them with `separator`
pub fn stringify(docs: &[JsonValue], separator: &str) -> TransferResult<String> {
    let lines = docs
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDocumentStore, InMemoryObjectStore, StoredObject};
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;
    use serde_json::json;

    mock! {
        pub Documents {}

        #[async_trait]
        impl DocumentStore for Documents {
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
    }

    mock! {
        pub Objects {}

        #[async_trait]
        impl ObjectStore for Objects {
            async fn load_string(
                &self,
                data: &str,
                key: &str,
                bucket: &str,
                replace: bool,
                compression: Option<Compression>,
            ) -> TransferResult<()>;
        }
    }

    fn source() -> DocumentSource {
        DocumentSource::new("events").in_db("analytics")
    }

    #[test]
    fn test_stringify() {
        let docs = vec![json!({"a": 1}), json!({"b": "two"})];
        assert_eq!(stringify(&docs, "\n").unwrap(), "{\"a\":1}\n{\"b\":\"two\"}");
        assert_eq!(stringify(&docs, ",").unwrap(), "{\"a\":1},{\"b\":\"two\"}");
        assert_eq!(stringify(&[], "\n").unwrap(), "");
    }

    #[tokio::test]
    async fn test_find_query_is_forwarded() {
        let mut documents = MockDocuments::new();
        documents
            .expect_find()
            .withf(|source, filter, projection| {
                source.collection == "events"
                    && *filter == json!({"kind": "click"})
                    && *projection == Some(json!({"_id": 0}))
            })
            .times(1)
            .returning(|_, _, _| Ok(vec![json!({"kind": "click"})]));
        documents.expect_aggregate().never();

        let mut objects = MockObjects::new();
        objects
            .expect_load_string()
            .with(
                eq("{\"kind\":\"click\"}"),
                eq("clicks.json"),
                eq("bucket"),
                eq(false),
                eq(None::<Compression>),
            )
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let query = DocumentQuery::find(json!({"kind": "click"})).with_projection(json!({"_id": 0}));
        let config = DocumentTransferConfig::new(source(), query, "bucket", "clicks.json");
        let operator = DocumentTransferOperator::new(config, Arc::new(documents), Arc::new(objects));

        let report = operator.execute().await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.bytes, "{\"kind\":\"click\"}".len());
    }

    #[tokio::test]
    async fn test_pipeline_query_is_forwarded() {
        let mut documents = MockDocuments::new();
        documents.expect_find().never();
        documents
            .expect_aggregate()
            .withf(|_, pipeline, allow_disk_use| pipeline.len() == 1 && *allow_disk_use)
            .times(1)
            .returning(|_, _, _| Ok(vec![json!({"n": 1}), json!({"n": 2})]));

        let mut objects = MockObjects::new();
        objects
            .expect_load_string()
            .withf(|data, _, _, replace, compression| {
                data == "{\"n\":1}\n{\"n\":2}" && *replace && *compression == Some(Compression::Gzip)
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let query = DocumentQuery::aggregate(vec![json!({"$match": {}})]).with_allow_disk_use(true);
        let config = DocumentTransferConfig::new(source(), query, "bucket", "all.json.gz")
            .with_replace(true)
            .with_compression(Compression::Gzip);
        let operator = DocumentTransferOperator::new(config, Arc::new(documents), Arc::new(objects));

        assert_eq!(operator.execute().await.unwrap().documents, 2);
    }

    #[tokio::test]
    async fn test_source_failure_skips_upload() {
        let mut documents = MockDocuments::new();
        documents
            .expect_find()
            .returning(|_, _, _| Err(TransferError::Source("connection refused".to_string())));
        let mut objects = MockObjects::new();
        objects.expect_load_string().never();

        let config = DocumentTransferConfig::new(source(), DocumentQuery::find(json!({})), "bucket", "k");
        let operator = DocumentTransferOperator::new(config, Arc::new(documents), Arc::new(objects));

        assert!(matches!(
            operator.execute().await,
            Err(TransferError::Source(_))
        ));
    }

    #[tokio::test]
    async fn test_transform_hook_with_in_memory_stores() {
        let documents = Arc::new(InMemoryDocumentStore::new());
        documents.insert_many(
            source(),
            [json!({"_id": 1, "v": 1}), json!({"_id": 2, "v": 2})],
        );
        let objects = Arc::new(InMemoryObjectStore::new());

        let config = DocumentTransferConfig::new(
            source(),
            DocumentQuery::find(json!({})).with_projection(json!({"_id": 0})),
            "bucket",
            "doubled.json",
        );
        let operator = DocumentTransferOperator::new(config, documents, Arc::clone(&objects))
            .with_transform(|docs| {
                Ok(docs
                    .into_iter()
                    .map(|doc| json!({"v": doc["v"].as_i64().unwrap_or_default() * 2}))
                    .collect())
            });

        operator.execute().await.unwrap();
        assert_eq!(
            objects.get("bucket", "doubled.json"),
            Some(StoredObject {
                data: "{\"v\":2}\n{\"v\":4}".to_string(),
                compression: None,
            })
        );

        // Second run without replace must not overwrite
        assert!(matches!(
            operator.execute().await,
            Err(TransferError::ObjectExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_transform() {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let config = DocumentTransferConfig::new(source(), DocumentQuery::find(json!({})), "bucket", "k");
        let operator = DocumentTransferOperator::new(config, documents, Arc::clone(&objects))
            .with_transform(|_| Err(anyhow::anyhow!("schema drift")));

        let err = operator.execute().await.unwrap_err();
        assert_eq!(err.to_string(), "Transform failed: schema drift");
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_empty_bucket_is_rejected() {
        let config = DocumentTransferConfig::new(source(), DocumentQuery::find(json!({})), " ", "k");
        let operator = DocumentTransferOperator::new(
            config,
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryObjectStore::new()),
        );

        assert!(matches!(
            operator.execute().await,
            Err(TransferError::InvalidConfig(_))
        ));
    }
}

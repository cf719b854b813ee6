//! Shared fixtures: a two-asset pipeline and a supervisor/worker pair
//! connected over an in-memory pipe

#![allow(dead_code)]

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tributary_config::ExecutionConfig;
use tributary_core::{asset, AssetFunction, AssetRef, InMemoryDagRegistry, Schedule};
use tributary_execution::{InMemoryAssetCatalog, Supervisor, TaskOutcome, TaskRunOutcome, TaskRunner};
use tributary_ipc::{duplex_pair, StartTask};

pub struct Pipeline {
    pub registry: Arc<InMemoryDagRegistry>,
    pub catalog: Arc<InMemoryAssetCatalog>,
}

/// `raw_events` feeds `cleaned_events`. When `publish_raw` is false the
/// upstream asset is defined but missing from the catalog.
pub fn events_pipeline(publish_raw: bool) -> Result<Pipeline> {
    tributary_logging::init_simple_tracing("debug")?;

    let registry = Arc::new(InMemoryDagRegistry::new());
    let catalog = Arc::new(InMemoryAssetCatalog::new());

    let raw = asset(Schedule::Cron("@daily".to_string()))
        .uri("s3://lake/raw/events")
        .define(
            AssetFunction::new("raw_events", |_| Ok(json!({"rows": 3}))),
            registry.as_ref(),
        )?;

    let cleaned = asset(Schedule::Assets(vec![AssetRef::new("raw_events")]))
        .uri("s3://lake/curated/events")
        .group("curated")
        .define(
            AssetFunction::new("cleaned_events", |kwargs| {
                let own = kwargs["self"].as_asset().map(|a| a.uri().to_string());
                let upstream = kwargs["raw_events"].as_asset().map(|a| a.uri().to_string());
                let run_id = kwargs["context"]
                    .as_context()
                    .and_then(|c| c.get("run_id").cloned());
                Ok(json!({
                    "writes_to": own,
                    "reads_from": upstream,
                    "run_id": run_id,
                    "dedupe": kwargs["dedupe"].as_value(),
                }))
            })
            .param("self")
            .param("context")
            .param("raw_events")
            .param_with_default("dedupe", true),
            registry.as_ref(),
        )?;

    if publish_raw {
        catalog.insert_outlets(&raw);
    }
    catalog.insert_outlets(&cleaned);

    Ok(Pipeline { registry, catalog })
}

/// Run one task with the worker on a background task and the supervisor here
pub async fn run_task(
    pipeline: &Pipeline,
    start: StartTask,
    config: ExecutionConfig,
) -> Result<(TaskOutcome, TaskRunOutcome)> {
    let (worker_end, mut supervisor_end) = duplex_pair(64 * 1024);

    let registry = Arc::clone(&pipeline.registry);
    let worker = tokio::spawn(async move {
        let mut runner = TaskRunner::new(worker_end, registry);
        runner.run().await
    });

    let supervisor = Supervisor::new(Arc::clone(&pipeline.catalog), config);
    let outcome = supervisor.supervise(&mut supervisor_end, start).await?;
    let worker_outcome = worker.await??;

    Ok((outcome, worker_outcome))
}

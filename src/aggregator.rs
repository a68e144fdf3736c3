//! Snapshot aggregation
//!
//! Fans out one crawl per (partition, entity) pair, at most
//! `max_concurrent_crawls` at a time, and fans the results back in to a
//! single collector that owns the [`Snapshot`]. Distinct pairs never share a
//! key, so the collector is the only writer and no lock is involved.
//!
//! The first failed crawl cancels the scrape token; remaining crawls stop at
//! their next page boundary and their results are discarded along with the
//! partial snapshot.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::clients::{DataSource, PageRequest};
use crate::config::{DataSourceConfig, ScrapeConfig};
use crate::crawler::crawl;
use crate::error::{Error, Result};
use crate::store::{TaskStore, TaskUpdate};
use crate::types::{Event, PartitionId, Snapshot, TaskId, TaskState};

/// One unit of fan-out work
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlJob {
    /// Partition (study) the crawl belongs to
    pub partition: PartitionId,
    /// Entity name, the snapshot key under the partition
    pub entity: String,
    /// First page to request
    pub request: PageRequest,
}

/// Task-scoped handles the aggregator reports through
pub struct ScrapeContext<'a> {
    /// Task being scraped
    pub task_id: &'a TaskId,
    /// Where progress is written
    pub store: &'a dyn TaskStore,
    /// Lifecycle event channel
    pub events: &'a broadcast::Sender<Event>,
    /// Cancelled when the task is cancelled or the service shuts down
    pub cancel: &'a CancellationToken,
}

/// Builds and runs the crawl plan for a release
pub struct Aggregator {
    source: Arc<dyn DataSource>,
    data_source: DataSourceConfig,
    max_concurrent: usize,
    timeout: Duration,
}

impl Aggregator {
    /// Create an aggregator over `source`
    pub fn new(
        source: Arc<dyn DataSource>,
        data_source: DataSourceConfig,
        scrape: &ScrapeConfig,
    ) -> Self {
        Self {
            source,
            data_source,
            max_concurrent: scrape.max_concurrent_crawls.max(1),
            timeout: scrape.request_timeout,
        }
    }

    /// Crawl jobs for `partitions`, partition-major in registry order
    ///
    /// The primary entity is fetched by id; every other entity is listed
    /// with the partition filter. Duplicate partitions are crawled once.
    pub fn plan(&self, partitions: &[PartitionId]) -> Vec<CrawlJob> {
        let ds = &self.data_source;
        let mut seen = HashSet::new();

        partitions
            .iter()
            .filter(|partition| seen.insert(partition.as_str()))
            .flat_map(|partition| {
                ds.entities.iter().map(move |endpoint| {
                    let request = if ds.primary_entity.as_deref() == Some(endpoint.name.as_str()) {
                        PageRequest::new(format!(
                            "{}/{}",
                            endpoint.path.trim_end_matches('/'),
                            urlencoding::encode(partition)
                        ))
                    } else {
                        PageRequest::new(endpoint.path.clone())
                            .with_param("limit", ds.page_size)
                            .with_param(ds.partition_param.clone(), partition)
                    };
                    CrawlJob {
                        partition: partition.clone(),
                        entity: endpoint.name.clone(),
                        request,
                    }
                })
            })
            .collect()
    }

    /// Crawl every entity of every partition into a snapshot
    pub async fn scrape(
        &self,
        ctx: ScrapeContext<'_>,
        partitions: &[PartitionId],
    ) -> Result<Snapshot> {
        let jobs = self.plan(partitions);
        let total = jobs.len();
        let mut snapshot = Snapshot::new();

        if total == 0 {
            tracing::info!(task_id = %ctx.task_id, "release has no partitions, snapshot is empty");
            ctx.events
                .send(Event::ScrapeComplete {
                    task_id: ctx.task_id.clone(),
                    entries: 0,
                    records: 0,
                })
                .ok();
            return Ok(snapshot);
        }

        let mut remaining: HashMap<PartitionId, usize> = HashMap::new();
        for job in &jobs {
            *remaining.entry(job.partition.clone()).or_default() += 1;
        }

        let scrape_token = ctx.cancel.child_token();
        let mut results = stream::iter(jobs)
            .map(|job| {
                let source = Arc::clone(&self.source);
                let token = scrape_token.clone();
                let timeout = self.timeout;
                async move {
                    let outcome = crawl(source.as_ref(), job.request.clone(), timeout, &token).await;
                    (job, outcome)
                }
            })
            .buffer_unordered(self.max_concurrent);

        let mut completed = 0usize;
        let mut reported_progress = 0u8;

        while let Some((job, outcome)) = results.next().await {
            let records = match outcome {
                Ok(records) => records,
                Err(e) => {
                    scrape_token.cancel();
                    if !matches!(e, Error::Cancelled(_)) {
                        tracing::warn!(
                            task_id = %ctx.task_id,
                            partition = %job.partition,
                            entity = %job.entity,
                            error = %e,
                            "crawl failed, aborting scrape"
                        );
                    }
                    return Err(e);
                }
            };

            tracing::debug!(
                task_id = %ctx.task_id,
                partition = %job.partition,
                entity = %job.entity,
                records = records.len(),
                "crawl complete"
            );
            ctx.events
                .send(Event::CrawlComplete {
                    task_id: ctx.task_id.clone(),
                    partition: job.partition.clone(),
                    entity: job.entity.clone(),
                    records: records.len(),
                })
                .ok();

            snapshot.insert(&job.partition, &job.entity, records);
            completed += 1;

            if let Some(left) = remaining.get_mut(&job.partition) {
                *left -= 1;
                if *left == 0 {
                    tracing::info!(
                        task_id = %ctx.task_id,
                        partition = %job.partition,
                        "partition complete"
                    );
                    ctx.events
                        .send(Event::PartitionComplete {
                            task_id: ctx.task_id.clone(),
                            partition: job.partition.clone(),
                        })
                        .ok();
                }
            }

            let progress = (completed * 100 / total) as u8;
            if progress > reported_progress {
                reported_progress = progress;
                let still_running = ctx
                    .store
                    .update_if(
                        ctx.task_id,
                        &[TaskState::Running],
                        TaskUpdate::progress(progress),
                    )
                    .await?;
                if still_running.is_none() {
                    scrape_token.cancel();
                    return Err(Error::Cancelled(format!(
                        "task {} left running during scrape",
                        ctx.task_id
                    )));
                }
            }
        }

        tracing::info!(
            task_id = %ctx.task_id,
            entries = snapshot.len(),
            records = snapshot.record_count(),
            "scrape complete"
        );
        ctx.events
            .send(Event::ScrapeComplete {
                task_id: ctx.task_id.clone(),
                entries: snapshot.len(),
                records: snapshot.record_count(),
            })
            .ok();

        Ok(snapshot)
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// WAL consumer.
//
// Once per `CONSUME_INTERVAL` the consumer walks every registered shard WAL
// and replays its unconsumed window into storage on a bounded set of
// workers. A tick waits for all of its workers, so ticks never overlap; a
// per-shard replay permit additionally keeps concurrent `tick()` callers off
// a shard that is already being replayed.
//
// Replaying one window:
//
//   1. from = max(first_index, wal_index + 1)
//   2. to   = min(last_index, from + limit - 1); nothing to do if from > to
//   3. read and decode every record in [from, to]
//   4. resolve mappings for the whole batch (first error aborts it)
//   5. write the batch to the active segment, rotating when it is mature
//   6. advance segment and shard stats, wal_index = to
//   7. persist the index definition
//   8. truncate the WAL through `to`
//
// A failure in 3-7 leaves the window in place for the next tick. There is
// no retry limit: a shard whose window can never be stored stalls, which is
// reported through `health()`, the logs and, when a registry is attached,
// the `tidemark_wal_*` Prometheus series.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};
use serde::Serialize;
use tidemark_wal::WalLog;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::catalog::IndexCatalog;
use crate::config::{CONSUMPTION_LIMIT, CONSUME_INTERVAL, STALL_WARN_THRESHOLD};
use crate::document::{doc_id, doc_timestamp, normalize_replayed, Document};
use crate::error::{IndexError, IndexResult};
use crate::index::Index;
use crate::shard::{parse_shard_name, Shard};
use crate::wal::WalRegistry;

/// Replay bookkeeping for one shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShardHealth {
    /// Failed attempts since the last successful or empty one.
    pub consecutive_failures: u64,
    /// Failed attempts since the consumer started.
    pub total_failures: u64,
    /// Message of the most recent failure, cleared by a successful replay.
    pub last_error: Option<String>,
    /// End of the last window stored successfully.
    pub last_wal_index: u64,
    /// WAL records stored by this consumer.
    pub records_replayed: u64,
    /// A replay of this shard is running right now.
    pub in_flight: bool,
}

impl ShardHealth {
    /// Whether the shard has failed at least `STALL_WARN_THRESHOLD` times
    /// in a row.
    pub fn is_stalled(&self) -> bool {
        self.consecutive_failures >= STALL_WARN_THRESHOLD
    }
}

/// Result of one consumption attempt on one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Records `[from, to]` were stored and truncated.
    Replayed { from: u64, to: u64 },
    /// Nothing pending.
    UpToDate,
    /// Another replay of the shard holds its permit.
    Busy,
    /// The WAL belongs to no known index or is not registered.
    Orphaned,
}

/// Totals of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Shards handed to a worker.
    pub dispatched: usize,
    /// WAL records stored across all shards.
    pub records: u64,
    /// Shards whose attempt returned an error or panicked.
    pub failed: usize,
    /// Shards skipped because another replay held their permit.
    pub busy: usize,
}

/// The replay window for a log holding `[first, last]` whose records up to
/// `wal_index` are already stored, or `None` when nothing is pending.
pub fn replay_window(first: u64, last: u64, wal_index: u64, limit: u64) -> Option<(u64, u64)> {
    let from = first.max(wal_index + 1);
    let to = last.min(from.saturating_add(limit.max(1) - 1));
    (from <= to).then_some((from, to))
}

/// Per-shard replay series, labelled by shard name.
#[derive(Clone)]
struct ConsumerMetrics {
    replay_failures: IntCounterVec,
    records_replayed: IntCounterVec,
    consecutive_failures: IntGaugeVec,
}

impl ConsumerMetrics {
    fn register(registry: &Registry) -> IndexResult<Self> {
        let replay_failures = IntCounterVec::new(
            Opts::new(
                "tidemark_wal_replay_failures_total",
                "Failed WAL replay attempts per shard",
            ),
            &["shard"],
        )?;
        let records_replayed = IntCounterVec::new(
            Opts::new(
                "tidemark_wal_records_replayed_total",
                "WAL records stored in segments per shard",
            ),
            &["shard"],
        )?;
        let consecutive_failures = IntGaugeVec::new(
            Opts::new(
                "tidemark_wal_consecutive_failures",
                "Failed WAL replay attempts in a row per shard",
            ),
            &["shard"],
        )?;
        registry.register(Box::new(replay_failures.clone()))?;
        registry.register(Box::new(records_replayed.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        Ok(Self {
            replay_failures,
            records_replayed,
            consecutive_failures,
        })
    }

    fn observe(&self, shard_name: &str, outcome: &IndexResult<ReplayOutcome>, health: &ShardHealth) {
        let labels = [shard_name];
        match outcome {
            Ok(ReplayOutcome::Replayed { from, to }) => self
                .records_replayed
                .with_label_values(&labels)
                .inc_by(to - from + 1),
            Ok(_) => {}
            Err(_) => self.replay_failures.with_label_values(&labels).inc(),
        }
        self.consecutive_failures
            .with_label_values(&labels)
            .set(i64::try_from(health.consecutive_failures).unwrap_or(i64::MAX));
    }

    /// Drop the series of a shard whose WAL was closed.
    fn forget(&self, shard_name: &str) {
        let labels = [shard_name];
        let _ = self.replay_failures.remove_label_values(&labels);
        let _ = self.records_replayed.remove_label_values(&labels);
        let _ = self.consecutive_failures.remove_label_values(&labels);
    }
}

#[derive(Clone)]
pub struct WalConsumer {
    catalog: Arc<IndexCatalog>,
    registry: Arc<WalRegistry>,
    parallel: usize,
    limit: u64,
    health: Arc<Mutex<BTreeMap<String, ShardHealth>>>,
    metrics: Option<ConsumerMetrics>,
}

impl WalConsumer {
    /// A consumer replaying at most `parallel` shards at once.
    pub fn new(catalog: Arc<IndexCatalog>, parallel: usize) -> Self {
        let registry = Arc::clone(catalog.registry());
        Self {
            catalog,
            registry,
            parallel: parallel.max(1),
            limit: CONSUMPTION_LIMIT,
            health: Arc::new(Mutex::new(BTreeMap::new())),
            metrics: None,
        }
    }

    /// Register per-shard replay counters and the consecutive-failure gauge
    /// with `registry`.
    pub fn with_prometheus(mut self, registry: Registry) -> IndexResult<Self> {
        self.metrics = Some(ConsumerMetrics::register(&registry)?);
        Ok(self)
    }

    /// Override the per-window record limit.
    pub fn with_consumption_limit(mut self, limit: u64) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Tick every `CONSUME_INTERVAL` until `shutdown` flips to `true` or its
    /// sender is dropped. A running tick always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            parallel = self.parallel,
            interval_ms = CONSUME_INTERVAL.as_millis() as u64,
            "WAL consumer started"
        );
        let mut interval = tokio::time::interval(CONSUME_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("WAL consumer stopped");
    }

    /// Consume every registered shard once and wait for all of them.
    pub async fn tick(&self) -> TickReport {
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut workers = JoinSet::new();
        let mut report = TickReport::default();

        let entries = self.registry.entries();
        self.health.lock().retain(|name, _| {
            let open = entries.iter().any(|(open, _)| open == name);
            if !open {
                if let Some(metrics) = &self.metrics {
                    metrics.forget(name);
                }
            }
            open
        });

        for (name, _) in entries {
            // Waits here while every worker is busy.
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let consumer = self.clone();
            report.dispatched += 1;
            workers.spawn(async move {
                let _permit = permit;
                consumer.consume_shard(&name).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(ReplayOutcome::Replayed { from, to })) => report.records += to - from + 1,
                Ok(Ok(ReplayOutcome::Busy)) => report.busy += 1,
                Ok(Ok(_)) => {}
                Ok(Err(_)) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "WAL replay worker panicked");
                }
            }
        }

        if report.records > 0 || report.failed > 0 {
            debug!(
                shards = report.dispatched,
                records = report.records,
                failed = report.failed,
                "consumer tick finished"
            );
        }
        report
    }

    /// Run one consumption attempt on `shard_name`, updating its health.
    pub async fn consume_shard(&self, shard_name: &str) -> IndexResult<ReplayOutcome> {
        let Some(log) = self.registry.get(shard_name) else {
            return Ok(ReplayOutcome::Orphaned);
        };
        let Some((index, shard)) = self.lookup(shard_name)? else {
            debug!(shard = %shard_name, "skipping WAL of unknown index");
            return Ok(ReplayOutcome::Orphaned);
        };
        let Some(_permit) = shard.try_begin_replay() else {
            return Ok(ReplayOutcome::Busy);
        };

        self.update_health(shard_name, |h| h.in_flight = true);
        let result = self.replay(shard_name, &index, &shard, log).await;

        let health = self.update_health(shard_name, |h| {
            h.in_flight = false;
            match &result {
                Ok(ReplayOutcome::Replayed { from, to }) => {
                    h.consecutive_failures = 0;
                    h.last_error = None;
                    h.last_wal_index = *to;
                    h.records_replayed += to - from + 1;
                }
                Ok(_) => h.consecutive_failures = 0,
                Err(e) => {
                    h.consecutive_failures += 1;
                    h.total_failures += 1;
                    h.last_error = Some(e.to_string());
                }
            }
        });
        if let Some(metrics) = &self.metrics {
            metrics.observe(shard_name, &result, &health);
        }

        if result.is_err() && health.is_stalled() {
            error!(
                shard = %shard_name,
                consecutive_failures = health.consecutive_failures,
                wal_index = shard.stat().wal_index,
                "shard replay stalled; pending WAL entries are not becoming searchable"
            );
        }
        result
    }

    /// Health of every shard the consumer has attempted.
    pub fn health(&self) -> BTreeMap<String, ShardHealth> {
        self.health.lock().clone()
    }

    /// Health of one shard, if the consumer has attempted it.
    pub fn shard_health(&self, shard_name: &str) -> Option<ShardHealth> {
        self.health.lock().get(shard_name).cloned()
    }

    fn update_health(&self, shard_name: &str, f: impl FnOnce(&mut ShardHealth)) -> ShardHealth {
        let mut health = self.health.lock();
        let entry = health.entry(shard_name.to_string()).or_default();
        f(entry);
        entry.clone()
    }

    fn lookup(&self, shard_name: &str) -> IndexResult<Option<(Arc<Index>, Arc<Shard>)>> {
        let (index_name, shard_id) = parse_shard_name(shard_name).ok_or_else(|| {
            IndexError::InvalidSettings(format!("malformed shard name '{shard_name}'"))
        })?;
        let index = match self.catalog.get_index(index_name) {
            Ok(index) => index,
            Err(IndexError::IndexNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let shard = index.get_shard(shard_id)?;
        Ok(Some((index, shard)))
    }

    async fn replay(
        &self,
        shard_name: &str,
        index: &Index,
        shard: &Shard,
        log: Arc<dyn WalLog>,
    ) -> IndexResult<ReplayOutcome> {
        let first = log.first_index()?;
        let last = log.last_index()?;
        let wal_index = shard.stat().wal_index;

        let Some((from, to)) = replay_window(first, last, wal_index, self.limit) else {
            // Stored by an earlier tick whose metadata write or truncation
            // failed: finish those steps now.
            if first <= wal_index && wal_index <= last {
                self.catalog.persist(index).await?;
                truncate(shard_name, log, wal_index).await;
            }
            return Ok(ReplayOutcome::UpToDate);
        };

        let docs = match self.store_window(shard_name, index, shard, &log, from, to).await {
            Ok(docs) => docs,
            Err(e) => {
                error!(shard = %shard_name, from, to, error = %e, "WAL replay failed");
                return Err(e);
            }
        };

        truncate(shard_name, log, to).await;
        debug!(shard = %shard_name, from, to, docs, "replayed WAL window");
        Ok(ReplayOutcome::Replayed { from, to })
    }

    /// Steps 3-7 for the window `[from, to]`. Returns the number of
    /// distinct documents written.
    async fn store_window(
        &self,
        shard_name: &str,
        index: &Index,
        shard: &Shard,
        log: &Arc<dyn WalLog>,
        from: u64,
        to: u64,
    ) -> IndexResult<u64> {
        let reader = Arc::clone(log);
        let records = tokio::task::spawn_blocking(move || reader.read_range(from, to)).await??;

        let now_ms = Utc::now().timestamp_millis();
        let mut docs = Vec::with_capacity(records.len());
        for (wal_index, raw) in (from..=to).zip(&records) {
            let doc: Document = serde_json::from_slice(raw).map_err(|e| {
                IndexError::InvalidDocument(format!(
                    "WAL record {wal_index} of {shard_name} is not a JSON object: {e}"
                ))
            })?;
            let fallback_id = || format!("{}-{}-{}", index.name(), shard.id(), wal_index);
            docs.push(normalize_replayed(doc, fallback_id, now_ms)?);
        }

        index.resolve_batch(&docs)?;

        let (mut min_time, mut max_time) = (i64::MAX, i64::MIN);
        let mut batch = BTreeMap::new();
        for doc in docs {
            let ts = doc_timestamp(&doc).unwrap_or(now_ms);
            min_time = min_time.min(ts);
            max_time = max_time.max(ts);
            let id = doc_id(&doc).unwrap_or_default().to_string();
            batch.insert(id, doc);
        }
        let count = batch.len() as u64;

        let segment = shard.check_segments();
        let writer = segment.writer(self.catalog.writers().as_ref()).await?;
        writer.batch(batch).await?;

        shard.record_persist(&segment, count, min_time, max_time, to);
        shard.check_segments();
        self.catalog.persist(index).await?;
        Ok(count)
    }
}

/// Discard records through `to`. A failure only delays reclaiming space:
/// the cursor already excludes them.
async fn truncate(shard_name: &str, log: Arc<dyn WalLog>, to: u64) {
    match tokio::task::spawn_blocking(move || log.truncate_front(to)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(shard = %shard_name, to, error = %e, "WAL truncation failed"),
        Err(e) => warn!(shard = %shard_name, to, error = %e, "WAL truncation task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexSettings;
    use crate::ingest::Ingestor;
    use crate::writer::MemoryWriterFactory;
    use prometheus::TextEncoder;
    use proptest::prelude::*;
    use serde_json::json;
    use tidemark_mapping::Mappings;
    use tidemark_storage::InMemoryBackend;

    #[test]
    fn test_window_from_empty_cursor() {
        assert_eq!(replay_window(1, 10, 0, 5000), Some((1, 10)));
    }

    #[test]
    fn test_window_is_bounded_by_limit() {
        assert_eq!(replay_window(1, 12_000, 0, 5000), Some((1, 5000)));
        assert_eq!(replay_window(1, 12_000, 5000, 5000), Some((5001, 10_000)));
    }

    #[test]
    fn test_single_pending_record_is_consumed() {
        assert_eq!(replay_window(11, 11, 10, 5000), Some((11, 11)));
        assert_eq!(replay_window(1, 1, 0, 5000), Some((1, 1)));
    }

    #[test]
    fn test_nothing_pending() {
        assert_eq!(replay_window(11, 10, 10, 5000), None);
        assert_eq!(replay_window(1, 0, 0, 5000), None);
        // Persisted but not yet truncated.
        assert_eq!(replay_window(1, 10, 10, 5000), None);
    }

    #[test]
    fn test_cursor_behind_truncation_point() {
        // Metadata older than the log head: start at the head.
        assert_eq!(replay_window(21, 30, 10, 5000), Some((21, 30)));
    }

    #[test]
    fn test_stall_threshold() {
        let health = ShardHealth {
            consecutive_failures: STALL_WARN_THRESHOLD,
            ..Default::default()
        };
        assert!(health.is_stalled());
        assert!(!ShardHealth::default().is_stalled());
    }

    proptest! {
        #[test]
        fn window_stays_inside_log(
            first in 1u64..1000,
            len in 0u64..1000,
            wal_index in 0u64..2000,
            limit in 1u64..100,
        ) {
            let last = first + len - 1;
            match replay_window(first, last, wal_index, limit) {
                Some((from, to)) => {
                    prop_assert!(first <= from && from <= to && to <= last);
                    prop_assert!(from > wal_index);
                    prop_assert!(to - from < limit);
                }
                None => prop_assert!(last <= wal_index || last < first),
            }
        }
    }

    #[tokio::test]
    async fn test_run_consumes_until_shutdown() {
        let writers = MemoryWriterFactory::new();
        let catalog = Arc::new(IndexCatalog::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(WalRegistry::memory()),
            Arc::new(writers.clone()),
            500,
        ));
        catalog
            .create_index("logs", IndexSettings::new(1, 0), Mappings::default())
            .await
            .unwrap();
        Ingestor::new(Arc::clone(&catalog))
            .ingest("logs", vec![json!({"a": 1}), json!({"a": 2})])
            .await
            .unwrap();

        let consumer = WalConsumer::new(catalog, 2);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run(rx).await }
        });

        for _ in 0..100 {
            if writers.index_documents("logs").len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(writers.index_documents("logs").len(), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(consumer.shard_health("logs/0").unwrap().last_wal_index, 2);
    }

    /// Value of `name{shard="..."}` in the text exposition of `registry`.
    fn sample(registry: &Registry, name: &str, shard: &str) -> Option<f64> {
        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        let prefix = format!("{name}{{shard=\"{shard}\"}} ");
        text.lines()
            .find_map(|line| line.strip_prefix(&prefix))
            .map(|value| value.trim().parse().unwrap())
    }

    #[tokio::test]
    async fn test_prometheus_tracks_failures_and_replays() {
        let writers = MemoryWriterFactory::new();
        let catalog = Arc::new(IndexCatalog::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(WalRegistry::memory()),
            Arc::new(writers.clone()),
            500,
        ));
        catalog
            .create_index("logs", IndexSettings::new(1, 0), Mappings::default())
            .await
            .unwrap();
        Ingestor::new(Arc::clone(&catalog))
            .ingest("logs", vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})])
            .await
            .unwrap();

        let registry = Registry::new();
        let consumer = WalConsumer::new(Arc::clone(&catalog), 1)
            .with_prometheus(registry.clone())
            .unwrap();

        writers.set_failing(true);
        consumer.tick().await;
        consumer.tick().await;
        assert_eq!(
            sample(&registry, "tidemark_wal_replay_failures_total", "logs/0"),
            Some(2.0)
        );
        assert_eq!(
            sample(&registry, "tidemark_wal_consecutive_failures", "logs/0"),
            Some(2.0)
        );

        writers.set_failing(false);
        consumer.tick().await;
        assert_eq!(
            sample(&registry, "tidemark_wal_records_replayed_total", "logs/0"),
            Some(3.0)
        );
        assert_eq!(
            sample(&registry, "tidemark_wal_consecutive_failures", "logs/0"),
            Some(0.0)
        );
        assert_eq!(
            sample(&registry, "tidemark_wal_replay_failures_total", "logs/0"),
            Some(2.0)
        );
    }

    #[test]
    fn test_prometheus_rejects_double_registration() {
        let registry = Registry::new();
        assert!(ConsumerMetrics::register(&registry).is_ok());
        assert!(matches!(
            ConsumerMetrics::register(&registry),
            Err(IndexError::Metrics(_))
        ));
    }
}

//! One collection and scoring cycle.
//!
//! Sources are fetched concurrently, each under its own timeout, and a
//! failing source only loses its own records. Fetched records are
//! canonicalized and written to the store one source at a time. Scoring then
//! runs over the unscored backlog and the results are written back in one
//! batch. Store calls and scoring run on the blocking pool. Only an
//! unreachable store fails the cycle.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use vipwatch_ai::{ScoreError, ThreatScorer};
use vipwatch_core::{CanonicalItem, PipelineConfig, RawRecord, canonicalize_batch};
use vipwatch_sources::{CollectionError, SourceCollector};
use vipwatch_store::{DuckStore, ScoreUpdate, StoreError};

use crate::report::{CycleReport, CycleState, ScoringReport, SourceReport};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("store task failed: {0}")]
    StoreTask(#[from] JoinError),
}

/// A collector and its optional item cap override.
struct RegisteredSource {
    collector: Box<dyn SourceCollector>,
    item_cap: Option<usize>,
}

/// Runs cycles against a fixed set of sources.
pub struct Orchestrator {
    store: Arc<DuckStore>,
    scorer: Arc<ThreatScorer>,
    sources: Vec<RegisteredSource>,
    config: PipelineConfig,
    state: watch::Sender<CycleState>,
}

impl Orchestrator {
    pub fn new(store: Arc<DuckStore>, scorer: Arc<ThreatScorer>, config: PipelineConfig) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            store,
            scorer,
            sources: Vec::new(),
            config,
            state,
        }
    }

    pub fn register(&mut self, source: Box<dyn SourceCollector>) {
        self.register_with_cap(source, None);
    }

    /// Register a source with its own per-cycle item cap instead of the
    /// configured default.
    pub fn register_with_cap(&mut self, source: Box<dyn SourceCollector>, item_cap: Option<usize>) {
        info!(
            source = source.name(),
            platform = %source.platform(),
            item_cap = item_cap.unwrap_or(self.config.source_item_cap),
            "source registered"
        );
        self.sources.push(RegisteredSource {
            collector: source,
            item_cap,
        });
    }

    pub fn with_source(mut self, source: impl SourceCollector + 'static) -> Self {
        self.register(Box::new(source));
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DuckStore> {
        &self.store
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Watch cycle phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        self.with_store(|store| store.ping()).await??;

        self.state.send_replace(CycleState::Collecting);
        let fetched = join_all(self.sources.iter().map(|s| self.fetch_one(s))).await;
        let mut sources = Vec::with_capacity(self.sources.len());
        for (source, result) in self.sources.iter().zip(fetched) {
            sources.push(self.ingest(source.collector.as_ref(), result).await);
        }

        self.state.send_replace(CycleState::Scoring);
        let scoring = self.score_pending().await;
        self.state.send_replace(CycleState::Idle);

        let report = CycleReport::new(started_at, sources, scoring);
        info!(
            collected = report.total_collected,
            stored = report.total_stored,
            duplicates = report.total_duplicates,
            dropped = report.total_dropped,
            scored = report.total_scored(),
            failed_sources = report.failed_sources().count(),
            "cycle complete"
        );
        Ok(report)
    }

    /// Run a synchronous store call on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<Result<T, StoreError>, JoinError>
    where
        F: FnOnce(&DuckStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store)).await
    }

    async fn fetch_one(&self, entry: &RegisteredSource) -> Result<Vec<RawRecord>, String> {
        let source = entry.collector.as_ref();
        let cap = entry.item_cap.unwrap_or(self.config.source_item_cap);
        match tokio::time::timeout(self.config.source_timeout, source.fetch(cap)).await {
            Ok(Ok(mut records)) => {
                records.truncate(cap);
                Ok(records)
            }
            Ok(Err(e)) => {
                if matches!(e, CollectionError::RateLimited) {
                    warn!(source = source.name(), "source rate limited");
                } else {
                    warn!(source = source.name(), error = %e, "source failed");
                }
                Err(e.to_string())
            }
            Err(_) => {
                warn!(
                    source = source.name(),
                    timeout_secs = self.config.source_timeout.as_secs_f64(),
                    "source timed out"
                );
                Err(format!("timed out after {:?}", self.config.source_timeout))
            }
        }
    }

    async fn ingest(
        &self,
        source: &dyn SourceCollector,
        fetched: Result<Vec<RawRecord>, String>,
    ) -> SourceReport {
        let mut report = SourceReport::empty(source.name(), source.platform());
        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                report.error = Some(e);
                return report;
            }
        };

        report.collected = records.len();
        let (items, dropped) = canonicalize_batch(source.platform(), &records);
        report.dropped = dropped;

        let attempted = items.len();
        match flatten(self.with_store(move |store| store.insert_batch(&items)).await) {
            Ok(outcome) => {
                report.stored = outcome.stored;
                report.duplicates = outcome.duplicates;
                report.failed = outcome.failed;
            }
            Err(e) => {
                error!(source = source.name(), error = %e, "failed to store items");
                report.failed = attempted;
                report.error = Some(e);
            }
        }
        debug!(
            source = source.name(),
            collected = report.collected,
            stored = report.stored,
            duplicates = report.duplicates,
            dropped = report.dropped,
            "source ingested"
        );
        report
    }

    /// Score up to `scoring_batch_limit` unscored items and write the results.
    pub async fn score_pending(&self) -> ScoringReport {
        let mut report = ScoringReport::default();
        let limit = self.config.scoring_batch_limit;
        let items = match flatten(self.with_store(move |store| store.select_unscored(limit)).await) {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "failed to select unscored items");
                report.error = Some(e);
                return report;
            }
        };
        report.selected = items.len();
        if items.is_empty() {
            return report;
        }

        let scorer = Arc::clone(&self.scorer);
        let scored = tokio::task::spawn_blocking(move || score_items(&scorer, &items)).await;
        let (updates, rejected) = match scored {
            Ok(Ok(scored)) => scored,
            Ok(Err(e)) => {
                warn!(pending = report.selected, error = %e, "scoring skipped");
                report.error = Some(e.to_string());
                return report;
            }
            Err(e) => {
                error!(error = %e, "scoring task failed");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.rejected = rejected;

        let attempted = updates.len();
        match flatten(self.with_store(move |store| store.update_scores(&updates)).await) {
            Ok(outcome) => {
                report.updated = outcome.updated;
                report.failed = outcome.failed + outcome.missing;
            }
            Err(e) => {
                error!(error = %e, "failed to write scores");
                report.failed = attempted;
                report.error = Some(e);
            }
        }
        report
    }
}

fn flatten<T>(result: Result<Result<T, StoreError>, JoinError>) -> Result<T, String> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Assess each item. Blank content is counted and skipped; a missing model
/// aborts the whole batch.
fn score_items(
    scorer: &ThreatScorer,
    items: &[CanonicalItem],
) -> Result<(Vec<ScoreUpdate>, usize), ScoreError> {
    scorer.classifier()?;
    let mut updates = Vec::with_capacity(items.len());
    let mut rejected = 0;
    for item in items {
        match scorer.assess(&item.content) {
            Ok(assessment) => updates.push(ScoreUpdate {
                id: item.id.clone(),
                threat_score: assessment.threat_score,
                threat_category: assessment.category,
            }),
            Err(ScoreError::EmptyContent) => {
                debug!(id = %item.id, "skipping item with empty content");
                rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((updates, rejected))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use vipwatch_ai::{Corpus, ThreatClassifier, TrainParams};
    use vipwatch_core::{Platform, ScoringConfig, ThreatCategory};
    use vipwatch_sources::StaticCollector;

    use super::*;

    struct FailingCollector;

    #[async_trait]
    impl SourceCollector for FailingCollector {
        fn platform(&self) -> Platform {
            Platform::Twitter
        }

        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<RawRecord>, CollectionError> {
            Err(CollectionError::RateLimited)
        }
    }

    struct SlowCollector;

    #[async_trait]
    impl SourceCollector for SlowCollector {
        fn platform(&self) -> Platform {
            Platform::Telegram
        }

        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<RawRecord>, CollectionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![RawRecord::text("late", "never arrives")])
        }
    }

    fn trained_scorer() -> Arc<ThreatScorer> {
        let (model, _) = ThreatClassifier::train(&Corpus::seed(), &TrainParams::default()).unwrap();
        Arc::new(ThreatScorer::new(model, &ScoringConfig::default()))
    }

    fn orchestrator(scorer: Arc<ThreatScorer>) -> Orchestrator {
        let store = Arc::new(DuckStore::open().unwrap());
        let mut config = PipelineConfig::default();
        config.source_timeout = Duration::from_millis(200);
        Orchestrator::new(store, scorer, config)
    }

    fn reddit_records() -> StaticCollector {
        StaticCollector::new(
            Platform::Reddit,
            vec![
                RawRecord::text("r1", "I disagree with this politician's policy"),
                RawRecord::text("r2", "Time to bomb the senator's office"),
            ],
        )
    }

    #[tokio::test]
    async fn failing_source_does_not_block_others() {
        let orch = orchestrator(trained_scorer())
            .with_source(FailingCollector)
            .with_source(reddit_records());

        let report = orch.run_cycle().await.unwrap();
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].error.as_deref(), Some("rate limited by source"));
        assert_eq!(report.sources[0].collected, 0);
        assert_eq!(report.sources[1].stored, 2);
        assert_eq!(report.total_collected, 2);
        assert_eq!(report.total_stored, 2);
        assert_eq!(report.total_scored(), 2);
        assert_eq!(report.failed_sources().count(), 1);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let orch = orchestrator(trained_scorer())
            .with_source(SlowCollector)
            .with_source(reddit_records());

        let report = orch.run_cycle().await.unwrap();
        assert!(report.sources[0].error.as_deref().unwrap().starts_with("timed out"));
        assert_eq!(report.sources[1].stored, 2);
    }

    #[tokio::test]
    async fn scores_written_back() {
        let orch = orchestrator(trained_scorer()).with_source(reddit_records());
        orch.run_cycle().await.unwrap();

        let store = orch.store();
        let safe = store.get("reddit_r1").unwrap();
        assert_eq!(safe.threat_category, ThreatCategory::Safe);
        assert!(safe.threat_score < 0.4);
        let threat = store.get("reddit_r2").unwrap();
        assert_eq!(threat.threat_category, ThreatCategory::Threat);
        assert!(store.select_unscored(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_cycle_sees_duplicates() {
        let orch = orchestrator(trained_scorer()).with_source(reddit_records());
        orch.run_cycle().await.unwrap();
        let before = orch.store().get("reddit_r2").unwrap();

        let report = orch.run_cycle().await.unwrap();
        assert_eq!(report.total_stored, 0);
        assert_eq!(report.total_duplicates, 2);
        assert_eq!(report.scoring.selected, 0);
        assert_eq!(orch.store().get("reddit_r2").unwrap().threat_score, before.threat_score);
    }

    #[tokio::test]
    async fn bad_records_dropped_and_counted() {
        let source = StaticCollector::new(
            Platform::Github,
            vec![
                RawRecord::text("blank", "   "),
                RawRecord::default(),
                RawRecord::text("ok", "Interesting interview with the senator"),
            ],
        );
        let orch = orchestrator(trained_scorer()).with_source(source);
        let report = orch.run_cycle().await.unwrap();
        assert_eq!(report.sources[0].collected, 3);
        assert_eq!(report.sources[0].dropped, 2);
        assert_eq!(report.total_stored, 1);
    }

    #[tokio::test]
    async fn item_cap_bounds_each_source() {
        let records = (0..10)
            .map(|i| RawRecord::text(i.to_string(), format!("post number {i}")))
            .collect();
        let store = Arc::new(DuckStore::open().unwrap());
        let mut config = PipelineConfig::default();
        config.source_item_cap = 4;
        let orch = Orchestrator::new(store, trained_scorer(), config)
            .with_source(StaticCollector::new(Platform::Twitter, records));
        let report = orch.run_cycle().await.unwrap();
        assert_eq!(report.total_collected, 4);
    }

    #[tokio::test]
    async fn per_source_cap_overrides_default() {
        let records = |n: usize| -> Vec<RawRecord> {
            (0..n)
                .map(|i| RawRecord::text(i.to_string(), format!("post number {i}")))
                .collect()
        };
        let mut orch = orchestrator(trained_scorer());
        orch.register_with_cap(Box::new(StaticCollector::new(Platform::Telegram, records(10))), Some(3));
        orch.register(Box::new(StaticCollector::new(Platform::Github, records(10))));

        let report = orch.run_cycle().await.unwrap();
        assert_eq!(report.sources[0].collected, 3);
        assert_eq!(report.sources[1].collected, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cycles_share_one_store() {
        let overlapping = || {
            let records = (0..20)
                .map(|i| {
                    let text = if i % 2 == 0 {
                        "I disagree with this politician's policy"
                    } else {
                        "Time to bomb the senator's office"
                    };
                    RawRecord::text(format!("p{i}"), text)
                })
                .collect();
            StaticCollector::new(Platform::Reddit, records)
        };
        let store = Arc::new(DuckStore::open().unwrap());
        let scorer = trained_scorer();
        let a = Arc::new(
            Orchestrator::new(Arc::clone(&store), Arc::clone(&scorer), PipelineConfig::default())
                .with_source(overlapping()),
        );
        let b = Arc::new(
            Orchestrator::new(Arc::clone(&store), scorer, PipelineConfig::default())
                .with_source(overlapping())
                .with_source(reddit_records()),
        );

        let (ra, rb) = tokio::join!(
            tokio::spawn({
                let a = Arc::clone(&a);
                async move { a.run_cycle().await }
            }),
            tokio::spawn({
                let b = Arc::clone(&b);
                async move { b.run_cycle().await }
            }),
        );
        let (ra, rb) = (ra.unwrap().unwrap(), rb.unwrap().unwrap());

        assert_eq!(ra.total_stored + rb.total_stored, 22);
        assert_eq!(ra.total_duplicates + rb.total_duplicates, 20);
        assert_eq!(store.count().unwrap(), 22);
        assert!(store.select_unscored(100).unwrap().is_empty());
        assert_eq!(store.get("reddit_p0").unwrap().threat_category, ThreatCategory::Safe);
        assert_eq!(store.get("reddit_p1").unwrap().threat_category, ThreatCategory::Threat);
        assert_eq!(store.get("reddit_r2").unwrap().threat_category, ThreatCategory::Threat);
    }

    #[tokio::test]
    async fn scorer_failure_leaves_posts_unscored() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = Arc::new(ThreatScorer::lazy_with_corpus(
            dir.path().join("model.json"),
            Corpus::default(),
            &ScoringConfig::default(),
        ));
        let orch = orchestrator(scorer).with_source(reddit_records());

        let report = orch.run_cycle().await.unwrap();
        assert_eq!(report.total_stored, 2);
        assert_eq!(report.scoring.selected, 2);
        assert_eq!(report.total_scored(), 0);
        assert!(report.scoring.error.is_some());
        assert_eq!(orch.store().select_unscored(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn state_returns_to_idle() {
        let orch = orchestrator(trained_scorer()).with_source(reddit_records());
        let mut rx = orch.subscribe();
        assert_eq!(orch.state(), CycleState::Idle);
        orch.run_cycle().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CycleState::Idle);
    }

    #[tokio::test]
    async fn report_serializes() {
        let orch = orchestrator(trained_scorer()).with_source(reddit_records());
        let report = orch.run_cycle().await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sources"][0]["platform"], "reddit");
        assert_eq!(json["total_stored"], 2);
    }
}
